//! Named signer catalog for registration into a higher-level crypto
//! factory: each entry binds a hash algorithm and modulus size and works
//! entirely over DER/PEM key blobs.

use std::time::Duration;

use rand_core::CryptoRngCore;

use crate::errors::Result;
use crate::hash::HashAlg;
use crate::key::{Rsa, DEFAULT_GENERATE_TIMEOUT};
use crate::PrimeCoverage;

/// A catalog entry: PKCS#1 v1.5 signatures with a fixed hash and key size.
#[derive(Clone, Copy, Debug)]
pub struct SignerEntry {
    pub name: &'static str,
    pub hash: HashAlg,
    pub bits: usize,
}

/// The registered signers, JOSE names first.
pub const SIGNERS: [SignerEntry; 4] = [
    SignerEntry {
        name: "RS256",
        hash: HashAlg::Sha256,
        bits: 2048,
    },
    SignerEntry {
        name: "RS384",
        hash: HashAlg::Sha384,
        bits: 2048,
    },
    SignerEntry {
        name: "RS512",
        hash: HashAlg::Sha512,
        bits: 2048,
    },
    SignerEntry {
        name: "RSA2048SHA256",
        hash: HashAlg::Sha256,
        bits: 2048,
    },
];

pub fn find(name: &str) -> Option<&'static SignerEntry> {
    SIGNERS.iter().find(|entry| entry.name == name)
}

impl SignerEntry {
    /// Generate a key pair for this entry, returning `(public, private)`
    /// DER blobs.
    pub fn generate_der<R: CryptoRngCore + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        self.generate_der_with_timeout(rng, DEFAULT_GENERATE_TIMEOUT)
    }

    pub fn generate_der_with_timeout<R: CryptoRngCore + ?Sized>(
        &self,
        rng: &mut R,
        timeout: Duration,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut rsa = Rsa::new();
        rsa.generate(rng, self.bits, PrimeCoverage::Fast, 0, timeout)?;
        Ok((rsa.save_public_der()?, rsa.save_private_der()?))
    }

    /// Hash `msg` with this entry's algorithm and sign it with the PEM
    /// private key.
    pub fn sign(&self, msg: &[u8], private_pem: &str) -> Result<Vec<u8>> {
        let mut rsa = Rsa::new();
        rsa.load_private_pem(private_pem)?;
        let digest = self.hash.digest(msg);
        rsa.sign(self.hash, &digest)
    }

    /// Check `signature` over `msg` against the PEM public key.
    pub fn verify(&self, msg: &[u8], signature: &[u8], public_pem: &str) -> bool {
        let mut rsa = Rsa::new();
        if rsa.load_public_pem(public_pem).is_err() {
            return false;
        }
        match rsa.verify(signature) {
            Ok((alg, digest)) => alg == self.hash && digest == self.hash.digest(msg),
            Err(_) => false,
        }
    }
}
