//! Hash algorithms recognized inside signature `DigestInfo` payloads.

use digest::Digest;
use simple_asn1::{oid, OID};

/// The hash functions this crate can name in a signature, with their
/// digest sizes and ASN.1 object identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlg {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Sha512_256,
    Sha3_256,
    Sha3_512,
}

impl HashAlg {
    /// Digest length in bytes.
    pub fn size(self) -> usize {
        match self {
            HashAlg::Md5 => 16,
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 | HashAlg::Sha512_256 | HashAlg::Sha3_256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 | HashAlg::Sha3_512 => 64,
        }
    }

    pub fn oid(self) -> OID {
        match self {
            HashAlg::Md5 => oid!(1, 2, 840, 113_549, 2, 5),
            HashAlg::Sha1 => oid!(1, 3, 14, 3, 2, 26),
            HashAlg::Sha256 => oid!(2, 16, 840, 1, 101, 3, 4, 2, 1),
            HashAlg::Sha384 => oid!(2, 16, 840, 1, 101, 3, 4, 2, 2),
            HashAlg::Sha512 => oid!(2, 16, 840, 1, 101, 3, 4, 2, 3),
            HashAlg::Sha512_256 => oid!(2, 16, 840, 1, 101, 3, 4, 2, 6),
            HashAlg::Sha3_256 => oid!(2, 16, 840, 1, 101, 3, 4, 2, 8),
            HashAlg::Sha3_512 => oid!(2, 16, 840, 1, 101, 3, 4, 2, 10),
        }
    }

    /// Dotted-decimal form of [`oid`](Self::oid).
    pub fn oid_str(self) -> &'static str {
        match self {
            HashAlg::Md5 => "1.2.840.113549.2.5",
            HashAlg::Sha1 => "1.3.14.3.2.26",
            HashAlg::Sha256 => "2.16.840.1.101.3.4.2.1",
            HashAlg::Sha384 => "2.16.840.1.101.3.4.2.2",
            HashAlg::Sha512 => "2.16.840.1.101.3.4.2.3",
            HashAlg::Sha512_256 => "2.16.840.1.101.3.4.2.6",
            HashAlg::Sha3_256 => "2.16.840.1.101.3.4.2.8",
            HashAlg::Sha3_512 => "2.16.840.1.101.3.4.2.10",
        }
    }

    pub fn from_oid(oid: &OID) -> Option<Self> {
        const ALL: [HashAlg; 8] = [
            HashAlg::Md5,
            HashAlg::Sha1,
            HashAlg::Sha256,
            HashAlg::Sha384,
            HashAlg::Sha512,
            HashAlg::Sha512_256,
            HashAlg::Sha3_256,
            HashAlg::Sha3_512,
        ];
        ALL.into_iter().find(|alg| &alg.oid() == oid)
    }

    pub fn digest(self, msg: &[u8]) -> Vec<u8> {
        match self {
            HashAlg::Md5 => md5::Md5::digest(msg).to_vec(),
            HashAlg::Sha1 => sha1::Sha1::digest(msg).to_vec(),
            HashAlg::Sha256 => sha2::Sha256::digest(msg).to_vec(),
            HashAlg::Sha384 => sha2::Sha384::digest(msg).to_vec(),
            HashAlg::Sha512 => sha2::Sha512::digest(msg).to_vec(),
            HashAlg::Sha512_256 => sha2::Sha512_256::digest(msg).to_vec(),
            HashAlg::Sha3_256 => sha3::Sha3_256::digest(msg).to_vec(),
            HashAlg::Sha3_512 => sha3::Sha3_512::digest(msg).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn digest_sizes_match_output() {
        for alg in [
            HashAlg::Md5,
            HashAlg::Sha1,
            HashAlg::Sha256,
            HashAlg::Sha384,
            HashAlg::Sha512,
            HashAlg::Sha512_256,
            HashAlg::Sha3_256,
            HashAlg::Sha3_512,
        ] {
            assert_eq!(alg.digest(b"abc").len(), alg.size());
            assert_eq!(HashAlg::from_oid(&alg.oid()), Some(alg));
        }
    }

    #[test]
    fn sha256_known_vector() {
        let digest = HashAlg::Sha256.digest(b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            digest,
            hex!("d7a8fbb307d7809469ca9abcb0082e4f8d5651e46d3cdb762d02d0bf37c9e592")
        );
    }
}
