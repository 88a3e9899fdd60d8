//! The RSA key object: key material management, key generation, and the
//! four cryptographic operations.
//!
//! All big integers belong to the instance's own [`Arena`]; the key
//! components are promoted to permanent values there. `sign`, `verify`,
//! `encrypt` and `decrypt` take `&self` and serialize on an internal
//! mutex; key-material operations take `&mut self`, so the borrow checker
//! rules out interleaving them with in-flight crypto calls.

use core::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand_core::{CryptoRngCore, OsRng};
use zeroize::Zeroizing;

use crate::asn1::{self, RsaPrivateKeyRecord, RsaPublicKeyRecord};
use crate::bigint::limb::LIMB_BITS;
use crate::bigint::{Arena, ModSlot, Num, PrimeCoverage};
use crate::errors::{Error, Result};
use crate::hash::HashAlg;
use crate::pkcs1v15;

/// Modulus sizes `generate` accepts.
pub const SUPPORTED_KEY_BITS: [usize; 6] = [512, 1024, 2048, 3072, 4096, 7680];

/// Fixed public exponent for generated keys.
const PUBLIC_EXPONENT: u64 = 65_537;

pub const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

const MIN_MODULUS_BYTES: usize = 10;
const MIN_EXPONENT_BYTES: usize = 2;

const PUBLIC_PEM_TAG: &str = "RSA PUBLIC KEY";
const PRIVATE_PEM_TAG: &str = "RSA PRIVATE KEY";

#[derive(Clone, Copy, Default)]
struct KeyHandles {
    m: Option<Num>,
    e: Option<Num>,
    d: Option<Num>,
    p: Option<Num>,
    q: Option<Num>,
    dp: Option<Num>,
    dq: Option<Num>,
    qinv: Option<Num>,
}

struct PrivateHandles {
    p: Num,
    q: Num,
    dp: Num,
    dq: Num,
    qinv: Num,
}

impl KeyHandles {
    fn private(&self) -> Option<PrivateHandles> {
        Some(PrivateHandles {
            p: self.p?,
            q: self.q?,
            dp: self.dp?,
            dq: self.dq?,
            qinv: self.qinv?,
        })
    }
}

/// An RSA key pair (or public half) with its arena of big integers.
pub struct Rsa {
    arena: Mutex<Arena>,
    key: KeyHandles,
    modulus_len: usize,
    modulus_bits: usize,
}

impl Rsa {
    pub fn new() -> Self {
        Rsa {
            arena: Mutex::new(Arena::new()),
            key: KeyHandles::default(),
            modulus_len: 0,
            modulus_bits: 0,
        }
    }

    pub fn has_public_key(&self) -> bool {
        self.key.m.is_some() && self.key.e.is_some()
    }

    pub fn has_private_key(&self) -> bool {
        self.key.d.is_some() && self.key.private().is_some()
    }

    /// Modulus length in bytes; raw signatures and ciphertexts have this
    /// exact size.
    pub fn size(&self) -> usize {
        self.modulus_len
    }

    pub fn bits(&self) -> usize {
        self.modulus_bits
    }

    fn arena_mut(&mut self) -> &mut Arena {
        self.arena.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_arena(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Demote and release all key material, leaving the instance empty.
    pub fn clear(&mut self) {
        let key = core::mem::take(&mut self.key);
        let arena = self.arena.get_mut().unwrap_or_else(PoisonError::into_inner);
        if key.m.is_some() {
            let _ = arena.reset_modulo(ModSlot::Modulus);
        }
        if key.p.is_some() {
            let _ = arena.reset_modulo(ModSlot::PrimeP);
        }
        if key.q.is_some() {
            let _ = arena.reset_modulo(ModSlot::PrimeQ);
        }
        for part in [key.e, key.d, key.dp, key.dq, key.qinv].into_iter().flatten() {
            let _ = arena.reset_permanent(part);
            arena.release(part);
        }
        arena.wipe_released();
        self.modulus_len = 0;
        self.modulus_bits = 0;
    }

    // --- key material loading ---------------------------------------

    fn check_public_bounds(modulus: &[u8], exponent: &[u8]) -> Result<()> {
        if modulus.len() < MIN_MODULUS_BYTES {
            return Err(Error::InvalidModulus);
        }
        if exponent.len() < MIN_EXPONENT_BYTES {
            return Err(Error::InvalidExponent);
        }
        Ok(())
    }

    pub fn load_public_record(&mut self, record: &RsaPublicKeyRecord) -> Result<()> {
        self.load_public_binary(&record.modulus, &record.exponent)
    }

    pub fn load_public_binary(&mut self, modulus: &[u8], exponent: &[u8]) -> Result<()> {
        if self.has_public_key() {
            return Err(Error::KeyAlreadyLoaded);
        }
        Self::check_public_bounds(modulus, exponent)?;
        let arena = self.arena_mut();
        let m = arena.load(modulus);
        let e = arena.load(exponent);
        arena.set_modulo(m, ModSlot::Modulus)?;
        arena.set_permanent(e)?;
        self.key.m = Some(m);
        self.key.e = Some(e);
        self.modulus_bits = self.arena_mut().bit_count(m);
        self.modulus_len = (self.modulus_bits + 7) / 8;
        Ok(())
    }

    pub fn load_public_hex(&mut self, modulus: &str, exponent: &str) -> Result<()> {
        let (m_bytes, e_bytes) = {
            let arena = self.arena_mut();
            let m = arena.from_hex(modulus);
            let e = arena.from_hex(exponent);
            match (m, e) {
                (Ok(m), Ok(e)) => {
                    let pair = (arena.to_bytes(m), arena.to_bytes(e));
                    arena.release(m);
                    arena.release(e);
                    pair
                }
                (Ok(m), Err(err)) => {
                    arena.release(m);
                    return Err(err);
                }
                (Err(err), Ok(e)) => {
                    arena.release(e);
                    return Err(err);
                }
                (Err(err), Err(_)) => return Err(err),
            }
        };
        self.load_public_binary(&m_bytes, &e_bytes)
    }

    pub fn load_public_der(&mut self, der: &[u8]) -> Result<()> {
        let record = asn1::public_key_from_der(der)?;
        self.load_public_record(&record)
    }

    pub fn load_public_pem(&mut self, pem_text: &str) -> Result<()> {
        let der = pem_to_der(pem_text)?;
        self.load_public_der(&der)
    }

    pub fn load_private_record(&mut self, record: &RsaPrivateKeyRecord) -> Result<()> {
        if self.has_public_key() {
            return Err(Error::KeyAlreadyLoaded);
        }
        Self::check_public_bounds(&record.modulus, &record.public_exponent)?;
        if record.prime1.is_empty() || record.prime2.is_empty() {
            return Err(Error::InvalidPrime);
        }
        for exponent in [
            &record.private_exponent,
            &record.exponent1,
            &record.exponent2,
        ] {
            if exponent.is_empty() {
                return Err(Error::InvalidExponent);
            }
        }
        if record.coefficient.is_empty() {
            return Err(Error::ParseError {
                reason: "missing CRT coefficient".into(),
            });
        }
        let arena = self.arena_mut();
        let m = arena.load(&record.modulus);
        let e = arena.load(&record.public_exponent);
        let d = arena.load(&record.private_exponent);
        let p = arena.load(&record.prime1);
        let q = arena.load(&record.prime2);
        let dp = arena.load(&record.exponent1);
        let dq = arena.load(&record.exponent2);
        let qinv = arena.load(&record.coefficient);
        arena.set_modulo(m, ModSlot::Modulus)?;
        arena.set_modulo(p, ModSlot::PrimeP)?;
        arena.set_modulo(q, ModSlot::PrimeQ)?;
        for part in [e, d, dp, dq, qinv] {
            arena.set_permanent(part)?;
        }
        self.key = KeyHandles {
            m: Some(m),
            e: Some(e),
            d: Some(d),
            p: Some(p),
            q: Some(q),
            dp: Some(dp),
            dq: Some(dq),
            qinv: Some(qinv),
        };
        self.modulus_bits = self.arena_mut().bit_count(m);
        self.modulus_len = (self.modulus_bits + 7) / 8;
        Ok(())
    }

    pub fn load_private_der(&mut self, der: &[u8]) -> Result<()> {
        let record = asn1::private_key_from_der(der)?;
        self.load_private_record(&record)
    }

    pub fn load_private_pem(&mut self, pem_text: &str) -> Result<()> {
        let der = Zeroizing::new(pem_to_der(pem_text)?);
        self.load_private_der(&der)
    }

    // --- key material saving ----------------------------------------

    pub fn save_public_record(&self) -> Result<RsaPublicKeyRecord> {
        let (m, e) = match (self.key.m, self.key.e) {
            (Some(m), Some(e)) => (m, e),
            _ => return Err(Error::KeyNotLoaded),
        };
        let arena = self.lock_arena();
        Ok(RsaPublicKeyRecord {
            modulus: arena.to_bytes(m),
            exponent: arena.to_bytes(e),
        })
    }

    pub fn save_public_der(&self) -> Result<Vec<u8>> {
        asn1::public_key_to_der(&self.save_public_record()?)
    }

    pub fn save_public_pem(&self) -> Result<String> {
        Ok(der_to_pem(&self.save_public_der()?, PUBLIC_PEM_TAG))
    }

    pub fn save_private_record(&self) -> Result<RsaPrivateKeyRecord> {
        let key = self.key;
        let (m, e, d) = match (key.m, key.e, key.d) {
            (Some(m), Some(e), Some(d)) => (m, e, d),
            _ => return Err(Error::KeyNotLoaded),
        };
        let private = key.private().ok_or(Error::KeyNotLoaded)?;
        let arena = self.lock_arena();
        Ok(RsaPrivateKeyRecord {
            version: 0,
            modulus: arena.to_bytes(m),
            public_exponent: arena.to_bytes(e),
            private_exponent: arena.to_bytes(d),
            prime1: arena.to_bytes(private.p),
            prime2: arena.to_bytes(private.q),
            exponent1: arena.to_bytes(private.dp),
            exponent2: arena.to_bytes(private.dq),
            coefficient: arena.to_bytes(private.qinv),
        })
    }

    pub fn save_private_der(&self) -> Result<Vec<u8>> {
        let record = self.save_private_record()?;
        asn1::private_key_to_der(&record)
    }

    pub fn save_private_pem(&self) -> Result<String> {
        let der = Zeroizing::new(self.save_private_der()?);
        Ok(der_to_pem(&der, PRIVATE_PEM_TAG))
    }

    // --- key generation ---------------------------------------------

    /// Generate a fresh key pair following the FIPS 186-4 acceptance
    /// rules, using `rng` as the CSPRNG whitening source on top of the
    /// operating system generator.
    pub fn generate<R: CryptoRngCore + ?Sized>(
        &mut self,
        rng: &mut R,
        bits: usize,
        coverage: PrimeCoverage,
        iterations: usize,
        timeout: Duration,
    ) -> Result<()> {
        if self.has_public_key() {
            return Err(Error::KeyAlreadyLoaded);
        }
        if !SUPPORTED_KEY_BITS.contains(&bits) {
            return Err(Error::UnsupportedKeySize);
        }
        let deadline = Instant::now() + timeout;
        let arena = self.arena.get_mut().unwrap_or_else(PoisonError::into_inner);
        let parts = generate_parts(arena, rng, bits, coverage, iterations, deadline);
        let parts = match parts {
            Ok(parts) => parts,
            Err(e) => {
                arena.wipe_released();
                return Err(e);
            }
        };

        let pc = arena.copy(parts.p);
        let qc = arena.copy(parts.q);
        let m = arena.mul(pc, qc);
        let m_bits = arena.bit_count(m);
        if m_bits != bits && m_bits != bits - 1 {
            for v in [m, parts.e, parts.d, parts.p, parts.q, parts.dp, parts.dq, parts.qinv] {
                arena.release(v);
            }
            arena.wipe_released();
            return Err(Error::Internal);
        }
        arena.set_modulo(m, ModSlot::Modulus)?;
        arena.set_modulo(parts.p, ModSlot::PrimeP)?;
        arena.set_modulo(parts.q, ModSlot::PrimeQ)?;
        for v in [parts.e, parts.d, parts.dp, parts.dq, parts.qinv] {
            arena.set_permanent(v)?;
        }
        self.key = KeyHandles {
            m: Some(m),
            e: Some(parts.e),
            d: Some(parts.d),
            p: Some(parts.p),
            q: Some(parts.q),
            dp: Some(parts.dp),
            dq: Some(parts.dq),
            qinv: Some(parts.qinv),
        };
        self.modulus_bits = m_bits;
        self.modulus_len = (m_bits + 7) / 8;
        arena.wipe_released();
        Ok(())
    }

    // --- key validation ----------------------------------------------

    /// Full consistency check of the loaded private key; any mismatch or
    /// missing component reports `false`.
    pub fn check_private_key(&mut self) -> bool {
        self.check_private_key_inner().unwrap_or(false)
    }

    fn check_private_key_inner(&mut self) -> Result<bool> {
        let key = self.key;
        let (m, e, d) = match (key.m, key.e, key.d) {
            (Some(m), Some(e), Some(d)) => (m, e, d),
            _ => return Ok(false),
        };
        let private = match key.private() {
            Some(private) => private,
            None => return Ok(false),
        };
        let PrivateHandles { p, q, dp, dq, qinv } = private;
        let arena = self.arena_mut();

        // p * q == m
        let pc = arena.copy(p);
        let qc = arena.copy(q);
        let product = arena.mul(pc, qc);
        let ok = arena.compare(product, m) == Ordering::Equal;
        arena.release(product);
        if !ok {
            arena.wipe_released();
            return Ok(false);
        }

        // e prime
        if !arena.is_prime(e, PrimeCoverage::Fast, 20, &mut OsRng)? {
            arena.wipe_released();
            return Ok(false);
        }

        // q^-1 mod p == qinv
        let qc = arena.copy(q);
        let inv = arena.mod_inverse(qc, p)?;
        let ok = arena.compare(inv, qinv) == Ordering::Equal;
        arena.release(inv);
        if !ok {
            arena.wipe_released();
            return Ok(false);
        }

        // d mod (p-1) == dp and d mod (q-1) == dq
        let pc = arena.copy(p);
        let p1 = arena.int_sub(pc, 1);
        let qc = arena.copy(q);
        let q1 = arena.int_sub(qc, 1);
        let dc = arena.copy(d);
        let dp_check = arena.reduce(dc, Some(p1))?;
        let dc = arena.copy(d);
        let dq_check = arena.reduce(dc, Some(q1))?;
        let ok = arena.compare(dp_check, dp) == Ordering::Equal
            && arena.compare(dq_check, dq) == Ordering::Equal;
        arena.release(dp_check);
        arena.release(dq_check);
        if !ok {
            arena.release(p1);
            arena.release(q1);
            arena.wipe_released();
            return Ok(false);
        }

        // gcd(e, (p-1)(q-1)) == 1 and e * d == 1 mod lambda
        let p1c = arena.copy(p1);
        let q1c = arena.copy(q1);
        let totient = arena.mul(p1c, q1c);
        let ec = arena.copy(e);
        let tc = arena.copy(totient);
        let g = arena.gcd(ec, tc)?;
        let coprime = arena.compare_limb(g, 1) == Ordering::Equal;
        arena.release(g);
        if !coprime {
            arena.release(p1);
            arena.release(q1);
            arena.release(totient);
            arena.wipe_released();
            return Ok(false);
        }
        let shared = arena.gcd(p1, q1)?;
        let (lambda, rest) = arena.div_rem(totient, shared)?;
        arena.release(rest);
        arena.release(shared);
        let ec = arena.copy(e);
        let dc = arena.copy(d);
        let ed = arena.mul(ec, dc);
        let unity = arena.reduce(ed, Some(lambda))?;
        let ok = arena.compare_limb(unity, 1) == Ordering::Equal;
        arena.release(unity);
        arena.release(lambda);
        arena.wipe_released();
        Ok(ok)
    }

    // --- cryptographic operations ------------------------------------

    /// Raw-buffer padding plus modular exponentiation: block type 1 with
    /// the private key when `sign`, block type 2 with the public key
    /// otherwise.
    pub fn buffer_encrypt_sign<R: CryptoRngCore + ?Sized>(
        &self,
        rng: Option<&mut R>,
        input: &[u8],
        sign: bool,
    ) -> Result<Vec<u8>> {
        let key = self.key;
        let e = key.e.ok_or(Error::KeyNotLoaded)?;
        let private = if sign {
            Some(key.private().ok_or(Error::KeyNotLoaded)?)
        } else {
            None
        };
        let len = self.modulus_len;
        let mut arena = self.lock_arena();
        let em = if sign {
            Zeroizing::new(pkcs1v15::sign_pad(input, len)?)
        } else {
            let rng = rng.ok_or(Error::Internal)?;
            pkcs1v15::encrypt_pad(rng, input, len)?
        };
        let c = arena.load(&em);
        let out = match &private {
            Some(private) => crt_power(&mut arena, private, c)?,
            None => {
                arena.use_modulo(ModSlot::Modulus);
                let ec = arena.copy(e);
                arena.mod_power(c, ec, None)?
            }
        };
        let bytes = arena.save(out, len)?;
        arena.release(out);
        if sign {
            arena.wipe_released();
        }
        Ok(bytes)
    }

    /// Modular exponentiation plus unpadding: the public operation when
    /// `verify`, the CRT private operation otherwise. The input must be
    /// exactly one modulus in length.
    pub fn buffer_decrypt_verify(&self, input: &[u8], verify: bool) -> Result<Vec<u8>> {
        let key = self.key;
        let fail = if verify {
            Error::Verification
        } else {
            Error::Decryption
        };
        let (m, e) = match (key.m, key.e) {
            (Some(m), Some(e)) => (m, e),
            _ => return Err(Error::KeyNotLoaded),
        };
        if input.len() != self.modulus_len {
            return Err(fail);
        }
        let mut arena = self.lock_arena();
        let c = arena.load(input);
        if arena.compare(c, m) != Ordering::Less {
            arena.release(c);
            return Err(fail);
        }
        let out = if verify {
            arena.use_modulo(ModSlot::Modulus);
            let ec = arena.copy(e);
            arena.mod_power(c, ec, None)?
        } else {
            match key.private() {
                Some(private) => crt_power(&mut arena, &private, c)?,
                None => {
                    arena.release(c);
                    return Err(Error::KeyNotLoaded);
                }
            }
        };
        let em = Zeroizing::new(arena.save(out, self.modulus_len)?);
        arena.release(out);
        if !verify {
            arena.wipe_released();
        }
        drop(arena);
        if verify {
            pkcs1v15::sign_unpad(&em)
        } else {
            pkcs1v15::encrypt_unpad(&em)
        }
    }

    /// Wrap `digest` in a `DigestInfo` and sign it with the private key.
    pub fn sign(&self, alg: HashAlg, digest: &[u8]) -> Result<Vec<u8>> {
        let info = asn1::digest_info_to_der(alg, digest)?;
        self.buffer_encrypt_sign::<OsRng>(None, &info, true)
    }

    /// Open a signature with the public key and parse the embedded
    /// `DigestInfo`, returning the hash algorithm and digest bytes.
    pub fn verify(&self, signature: &[u8]) -> Result<(HashAlg, Vec<u8>)> {
        let info = self.buffer_decrypt_verify(signature, true)?;
        asn1::digest_info_from_der(&info)
    }

    /// PKCS#1 v1.5 block type 2 encryption with the public key.
    pub fn encrypt<R: CryptoRngCore + ?Sized>(&self, rng: &mut R, msg: &[u8]) -> Result<Vec<u8>> {
        self.buffer_encrypt_sign(Some(rng), msg, false)
    }

    /// CRT decryption of a PKCS#1 v1.5 block type 2 ciphertext.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.buffer_decrypt_verify(ciphertext, false)
    }
}

impl Default for Rsa {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Rsa {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Chinese-remainder private-key exponentiation.
///
/// `m1 + p - m2` keeps the difference non-negative before the reduction;
/// a bare `m1 - m2` would go negative whenever `m2 > m1`.
fn crt_power(arena: &mut Arena, key: &PrivateHandles, c: Num) -> Result<Num> {
    arena.use_modulo(ModSlot::PrimeP);
    let cc = arena.copy(c);
    let dpc = arena.copy(key.dp);
    let m1 = arena.mod_power(cc, dpc, None)?;

    arena.use_modulo(ModSlot::PrimeQ);
    let cc = arena.copy(c);
    let dqc = arena.copy(key.dq);
    let m2 = arena.mod_power(cc, dqc, None)?;
    arena.release(c);

    // h = qInv * (m1 + p - m2) mod p
    let pc = arena.copy(key.p);
    let t = arena.add(m1, pc);
    let m2c = arena.copy(m2);
    let (t, _) = arena.sub(t, m2c);
    let qinvc = arena.copy(key.qinv);
    let t = arena.mul(t, qinvc);
    arena.use_modulo(ModSlot::PrimeP);
    let h = arena.reduce(t, None)?;

    // plain = m2 + q * h
    let qc = arena.copy(key.q);
    let qh = arena.mul(h, qc);
    Ok(arena.add(m2, qh))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MODULUS: [u8; 16] = [
        0xc0, 0x95, 0x08, 0xe1, 0x45, 0x1f, 0xba, 0x88, 0x03, 0x6f, 0x65, 0x9c, 0x14, 0x92,
        0xff, 0x11,
    ];

    #[test]
    fn public_load_enforces_sanity_bounds() {
        let mut rsa = Rsa::new();
        assert_eq!(
            rsa.load_public_binary(&[1u8; 9], &[1, 0, 1]).unwrap_err(),
            Error::InvalidModulus
        );
        assert_eq!(
            rsa.load_public_binary(&TEST_MODULUS, &[3]).unwrap_err(),
            Error::InvalidExponent
        );
        rsa.load_public_binary(&TEST_MODULUS, &[1, 0, 1]).unwrap();
        assert_eq!(rsa.bits(), 128);
        assert_eq!(rsa.size(), 16);
    }

    #[test]
    fn private_load_rejects_missing_components() {
        let record = RsaPrivateKeyRecord {
            version: 0,
            modulus: TEST_MODULUS.to_vec(),
            public_exponent: vec![1, 0, 1],
            private_exponent: vec![0x11; 16],
            prime1: vec![0x0d; 8],
            prime2: vec![0x0b; 8],
            exponent1: vec![0x07; 8],
            exponent2: vec![0x05; 8],
            coefficient: vec![0x03; 8],
        };

        let mut broken = record.clone();
        broken.prime1.clear();
        let mut rsa = Rsa::new();
        assert_eq!(
            rsa.load_private_record(&broken).unwrap_err(),
            Error::InvalidPrime
        );

        let mut broken = record.clone();
        broken.exponent2.clear();
        assert_eq!(
            rsa.load_private_record(&broken).unwrap_err(),
            Error::InvalidExponent
        );

        let mut broken = record;
        broken.coefficient.clear();
        assert!(matches!(
            rsa.load_private_record(&broken),
            Err(Error::ParseError { .. })
        ));
    }

    #[test]
    fn double_load_is_rejected_until_cleared() {
        let mut rsa = Rsa::new();
        rsa.load_public_binary(&TEST_MODULUS, &[1, 0, 1]).unwrap();
        assert_eq!(
            rsa.load_public_binary(&TEST_MODULUS, &[1, 0, 1]).unwrap_err(),
            Error::KeyAlreadyLoaded
        );
        rsa.clear();
        assert!(!rsa.has_public_key());
        rsa.load_public_binary(&TEST_MODULUS, &[1, 0, 1]).unwrap();
    }

    #[test]
    fn hex_load_matches_binary_load() {
        let mut from_hex = Rsa::new();
        from_hex
            .load_public_hex("c09508e1451fba88036f659c1492ff11", "10001")
            .unwrap();
        let mut from_binary = Rsa::new();
        from_binary
            .load_public_binary(&TEST_MODULUS, &[1, 0, 1])
            .unwrap();
        assert_eq!(
            from_hex.save_public_record().unwrap(),
            from_binary.save_public_record().unwrap()
        );
    }

    #[test]
    fn operations_without_key_material_fail() {
        let rsa = Rsa::new();
        assert_eq!(
            rsa.sign(HashAlg::Sha256, &[0u8; 32]).unwrap_err(),
            Error::KeyNotLoaded
        );
        assert_eq!(rsa.verify(&[0u8; 64]).unwrap_err(), Error::KeyNotLoaded);
        assert_eq!(rsa.save_public_der().unwrap_err(), Error::KeyNotLoaded);

        let mut public_only = Rsa::new();
        public_only
            .load_public_binary(&TEST_MODULUS, &[1, 0, 1])
            .unwrap();
        assert!(!public_only.check_private_key());
        assert_eq!(
            public_only.sign(HashAlg::Sha256, &[0u8; 32]).unwrap_err(),
            Error::KeyNotLoaded
        );
        assert_eq!(
            public_only.save_private_record().unwrap_err(),
            Error::KeyNotLoaded
        );
    }
}

fn pem_to_der(text: &str) -> Result<Vec<u8>> {
    let parsed = pem::parse(text).map_err(|e| Error::ParseError {
        reason: e.to_string(),
    })?;
    Ok(parsed.contents)
}

fn der_to_pem(der: &[u8], tag: &str) -> String {
    pem::encode(&pem::Pem {
        tag: tag.to_string(),
        contents: der.to_vec(),
    })
}

struct KeyParts {
    e: Num,
    d: Num,
    p: Num,
    q: Num,
    dp: Num,
    dq: Num,
    qinv: Num,
}

fn generate_parts<R: CryptoRngCore + ?Sized>(
    arena: &mut Arena,
    rng: &mut R,
    bits: usize,
    coverage: PrimeCoverage,
    iterations: usize,
    deadline: Instant,
) -> Result<KeyParts> {
    let e = arena.from_u64(PUBLIC_EXPONENT);
    let half_limbs = (bits / 2) / LIMB_BITS;
    let p = arena.allocate(half_limbs);
    let q = arena.allocate(half_limbs);
    let parts = search_parts(arena, rng, e, p, q, bits, coverage, iterations, deadline);
    if parts.is_err() {
        arena.release(e);
        arena.release(p);
        arena.release(q);
    }
    parts
}

/// One acceptable prime: probable prime with `prime mod e != 1`
/// (FIPS 186-4 B.3.1 needs `e` invertible mod `p - 1`).
fn fill_acceptable_prime<R: CryptoRngCore + ?Sized>(
    arena: &mut Arena,
    v: Num,
    e: Num,
    coverage: PrimeCoverage,
    iterations: usize,
    deadline: Instant,
    rng: &mut R,
) -> Result<()> {
    loop {
        arena.fill_prime(v, coverage, iterations, deadline, rng)?;
        let vc = arena.copy(v);
        let r = arena.reduce(vc, Some(e))?;
        let acceptable = arena.compare_limb(r, 1) != Ordering::Equal;
        arena.release(r);
        if acceptable {
            return Ok(());
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn search_parts<R: CryptoRngCore + ?Sized>(
    arena: &mut Arena,
    rng: &mut R,
    e: Num,
    mut p: Num,
    mut q: Num,
    bits: usize,
    coverage: PrimeCoverage,
    iterations: usize,
    deadline: Instant,
) -> Result<KeyParts> {
    loop {
        fill_acceptable_prime(arena, p, e, coverage, iterations, deadline, rng)?;
        fill_acceptable_prime(arena, q, e, coverage, iterations, deadline, rng)?;

        match arena.compare(p, q) {
            // Two identical primes mean the randomness collapsed.
            Ordering::Equal => return Err(Error::WeakRandomness),
            Ordering::Less => core::mem::swap(&mut p, &mut q),
            Ordering::Greater => {}
        }

        // FIPS 186-4 B.3.3 step 5.4: |p - q| > 2^(bits/2 - 100).
        let pc = arena.copy(p);
        let qc = arena.copy(q);
        let (distance, _) = arena.sub(pc, qc);
        let far_enough = arena.bit_count(distance) > bits / 2 - 100;
        arena.release(distance);
        if !far_enough {
            continue;
        }

        let pc = arena.copy(p);
        let p1 = arena.int_sub(pc, 1);
        let qc = arena.copy(q);
        let q1 = arena.int_sub(qc, 1);
        let p1c = arena.copy(p1);
        let q1c = arena.copy(q1);
        let totient = arena.mul(p1c, q1c);

        let ec = arena.copy(e);
        let tc = arena.copy(totient);
        let g = arena.gcd(ec, tc)?;
        let coprime = arena.compare_limb(g, 1) == Ordering::Equal;
        arena.release(g);
        if !coprime {
            arena.release(p1);
            arena.release(q1);
            arena.release(totient);
            continue;
        }

        // d = e^-1 mod lambda(n), the smallest valid private exponent.
        let p1c = arena.copy(p1);
        let q1c = arena.copy(q1);
        let shared = arena.gcd(p1c, q1c)?;
        let (lambda, rest) = arena.div_rem(totient, shared)?;
        arena.release(rest);
        arena.release(shared);
        let ec = arena.copy(e);
        let d = arena.mod_inverse(ec, lambda)?;
        let acceptable = !arena.is_zero(d) && arena.bit_count(d) > (bits + 1) / 2;
        if !acceptable {
            arena.release(d);
            arena.release(lambda);
            arena.release(p1);
            arena.release(q1);
            continue;
        }
        arena.release(lambda);

        let dc = arena.copy(d);
        let dp = arena.reduce(dc, Some(p1))?;
        let dc = arena.copy(d);
        let dq = arena.reduce(dc, Some(q1))?;
        arena.release(p1);
        arena.release(q1);
        let qc = arena.copy(q);
        let qinv = arena.mod_inverse(qc, p)?;

        return Ok(KeyParts {
            e,
            d,
            p,
            q,
            dp,
            dq,
            qinv,
        });
    }
}
