//! DER encoding and parsing of the key and signature structures:
//! PKCS#1 `RSAPublicKey` inside a `SubjectPublicKeyInfo` envelope, a
//! PKCS#8 `PrivateKeyInfo` carrying the PKCS#1 `RSAPrivateKey`, and the
//! `DigestInfo` payload that RSA signatures wrap. Bare PKCS#1 blobs are
//! accepted as a fallback on the parse side for both key kinds.
//!
//! Multi-precision integers travel as unsigned big-endian byte strings in
//! the records; the DER layer adds and strips the leading `0x00` octet
//! that keeps high-bit values positive.

use simple_asn1::{from_der, oid, to_der, ASN1Block, BigInt, OID};
use zeroize::Zeroize;

use crate::errors::{Error, Result};
use crate::hash::HashAlg;

/// rsaEncryption, the algorithm identifier shared by both key envelopes.
fn rsa_oid() -> OID {
    oid!(1, 2, 840, 113_549, 1, 1, 1)
}

/// Modulus and exponent of a public key, unsigned big-endian.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RsaPublicKeyRecord {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

/// The full PKCS#1 private key component set, unsigned big-endian.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RsaPrivateKeyRecord {
    pub version: u32,
    pub modulus: Vec<u8>,
    pub public_exponent: Vec<u8>,
    pub private_exponent: Vec<u8>,
    pub prime1: Vec<u8>,
    pub prime2: Vec<u8>,
    pub exponent1: Vec<u8>,
    pub exponent2: Vec<u8>,
    pub coefficient: Vec<u8>,
}

impl RsaPrivateKeyRecord {
    /// Zero every component buffer.
    pub fn wipe(&mut self) {
        self.version = 0;
        self.modulus.zeroize();
        self.public_exponent.zeroize();
        self.private_exponent.zeroize();
        self.prime1.zeroize();
        self.prime2.zeroize();
        self.exponent1.zeroize();
        self.exponent2.zeroize();
        self.coefficient.zeroize();
    }
}

impl Drop for RsaPrivateKeyRecord {
    fn drop(&mut self) {
        self.wipe();
    }
}

fn parse_err(reason: impl Into<String>) -> Error {
    Error::ParseError {
        reason: reason.into(),
    }
}

fn encode_err(reason: impl Into<String>) -> Error {
    Error::EncodeError {
        reason: reason.into(),
    }
}

/// An INTEGER block holding an unsigned value.
fn uint(bytes: &[u8]) -> ASN1Block {
    let mut padded = Vec::with_capacity(bytes.len() + 1);
    padded.push(0);
    padded.extend_from_slice(bytes);
    ASN1Block::Integer(0, BigInt::from_signed_bytes_be(&padded))
}

/// Unsigned big-endian bytes out of an INTEGER block.
fn uint_bytes(block: &ASN1Block) -> Result<Vec<u8>> {
    let value = match block {
        ASN1Block::Integer(_, value) => value,
        _ => return Err(parse_err("expected INTEGER")),
    };
    let mut bytes = value.to_signed_bytes_be();
    if bytes[0] & 0x80 != 0 {
        return Err(parse_err("negative INTEGER"));
    }
    if bytes.len() > 1 && bytes[0] == 0 {
        bytes.remove(0);
    }
    Ok(bytes)
}

fn single_block(der: &[u8]) -> Result<ASN1Block> {
    let mut blocks = from_der(der).map_err(|e| parse_err(e.to_string()))?;
    if blocks.is_empty() {
        return Err(parse_err("empty DER input"));
    }
    Ok(blocks.swap_remove(0))
}

fn rsa_algorithm_identifier() -> ASN1Block {
    ASN1Block::Sequence(
        0,
        vec![
            ASN1Block::ObjectIdentifier(0, rsa_oid()),
            ASN1Block::Null(0),
        ],
    )
}

fn is_rsa_algorithm_identifier(block: &ASN1Block) -> bool {
    match block {
        ASN1Block::Sequence(_, items) => matches!(
            items.first(),
            Some(ASN1Block::ObjectIdentifier(_, oid)) if *oid == rsa_oid()
        ),
        _ => false,
    }
}

/// `SubjectPublicKeyInfo { algorithm, BIT STRING { RSAPublicKey } }`
pub fn public_key_to_der(record: &RsaPublicKeyRecord) -> Result<Vec<u8>> {
    let rsa_key = ASN1Block::Sequence(
        0,
        vec![uint(&record.modulus), uint(&record.exponent)],
    );
    let key_bits = to_der(&rsa_key).map_err(|e| encode_err(e.to_string()))?;
    let bit_len = key_bits.len() * 8;
    let spki = ASN1Block::Sequence(
        0,
        vec![
            rsa_algorithm_identifier(),
            ASN1Block::BitString(0, bit_len, key_bits),
        ],
    );
    to_der(&spki).map_err(|e| encode_err(e.to_string()))
}

pub fn public_key_from_der(der: &[u8]) -> Result<RsaPublicKeyRecord> {
    let items = match single_block(der)? {
        ASN1Block::Sequence(_, items) => items,
        _ => return Err(parse_err("expected SEQUENCE")),
    };
    match items.as_slice() {
        // SubjectPublicKeyInfo envelope.
        [alg, ASN1Block::BitString(_, _, bits)] if is_rsa_algorithm_identifier(alg) => {
            match single_block(bits)? {
                ASN1Block::Sequence(_, inner) => public_key_fields(&inner),
                _ => Err(parse_err("malformed subjectPublicKey")),
            }
        }
        // Bare RSAPublicKey.
        [ASN1Block::Integer(..), ASN1Block::Integer(..)] => public_key_fields(&items),
        _ => Err(parse_err("unrecognized public key structure")),
    }
}

fn public_key_fields(items: &[ASN1Block]) -> Result<RsaPublicKeyRecord> {
    match items {
        [modulus, exponent] => Ok(RsaPublicKeyRecord {
            modulus: uint_bytes(modulus)?,
            exponent: uint_bytes(exponent)?,
        }),
        _ => Err(parse_err("malformed RSAPublicKey")),
    }
}

/// PKCS#8 `PrivateKeyInfo` with the PKCS#1 key in its OCTET STRING.
pub fn private_key_to_der(record: &RsaPrivateKeyRecord) -> Result<Vec<u8>> {
    let version = BigInt::from(record.version);
    let rsa_key = ASN1Block::Sequence(
        0,
        vec![
            ASN1Block::Integer(0, version.clone()),
            uint(&record.modulus),
            uint(&record.public_exponent),
            uint(&record.private_exponent),
            uint(&record.prime1),
            uint(&record.prime2),
            uint(&record.exponent1),
            uint(&record.exponent2),
            uint(&record.coefficient),
        ],
    );
    let mut key_der = to_der(&rsa_key).map_err(|e| encode_err(e.to_string()))?;
    let info = ASN1Block::Sequence(
        0,
        vec![
            ASN1Block::Integer(0, version),
            rsa_algorithm_identifier(),
            ASN1Block::OctetString(0, key_der.clone()),
        ],
    );
    let out = to_der(&info).map_err(|e| encode_err(e.to_string()));
    key_der.zeroize();
    out
}

pub fn private_key_from_der(der: &[u8]) -> Result<RsaPrivateKeyRecord> {
    let items = match single_block(der)? {
        ASN1Block::Sequence(_, items) => items,
        _ => return Err(parse_err("expected SEQUENCE")),
    };
    match items.as_slice() {
        // PKCS#8 envelope.
        [ASN1Block::Integer(..), alg, ASN1Block::OctetString(_, key)]
            if is_rsa_algorithm_identifier(alg) =>
        {
            match single_block(key)? {
                ASN1Block::Sequence(_, inner) => private_key_fields(&inner),
                _ => Err(parse_err("malformed PKCS#8 key payload")),
            }
        }
        // Bare PKCS#1 RSAPrivateKey.
        [ASN1Block::Integer(..), ..] if items.len() >= 9 => private_key_fields(&items),
        _ => Err(parse_err("unrecognized private key structure")),
    }
}

fn private_key_fields(items: &[ASN1Block]) -> Result<RsaPrivateKeyRecord> {
    if items.len() < 9 {
        return Err(parse_err("truncated RSAPrivateKey"));
    }
    let version_bytes = uint_bytes(&items[0])?;
    let version = version_bytes.last().copied().unwrap_or(0) as u32;
    Ok(RsaPrivateKeyRecord {
        version,
        modulus: uint_bytes(&items[1])?,
        public_exponent: uint_bytes(&items[2])?,
        private_exponent: uint_bytes(&items[3])?,
        prime1: uint_bytes(&items[4])?,
        prime2: uint_bytes(&items[5])?,
        exponent1: uint_bytes(&items[6])?,
        exponent2: uint_bytes(&items[7])?,
        coefficient: uint_bytes(&items[8])?,
    })
}

/// `DigestInfo { AlgorithmIdentifier, OCTET STRING digest }`
pub fn digest_info_to_der(alg: HashAlg, digest: &[u8]) -> Result<Vec<u8>> {
    if digest.len() != alg.size() {
        return Err(encode_err("digest length does not match algorithm"));
    }
    let info = ASN1Block::Sequence(
        0,
        vec![
            ASN1Block::Sequence(
                0,
                vec![
                    ASN1Block::ObjectIdentifier(0, alg.oid()),
                    ASN1Block::Null(0),
                ],
            ),
            ASN1Block::OctetString(0, digest.to_vec()),
        ],
    );
    to_der(&info).map_err(|e| encode_err(e.to_string()))
}

pub fn digest_info_from_der(der: &[u8]) -> Result<(HashAlg, Vec<u8>)> {
    let items = match single_block(der)? {
        ASN1Block::Sequence(_, items) => items,
        _ => return Err(parse_err("expected SEQUENCE")),
    };
    let (alg_items, digest) = match items.as_slice() {
        [ASN1Block::Sequence(_, alg_items), ASN1Block::OctetString(_, digest)] => {
            (alg_items, digest)
        }
        _ => return Err(parse_err("malformed DigestInfo")),
    };
    // The parameters NULL is optional on input.
    let alg = match alg_items.as_slice() {
        [ASN1Block::ObjectIdentifier(_, oid)]
        | [ASN1Block::ObjectIdentifier(_, oid), ASN1Block::Null(_)] => {
            HashAlg::from_oid(oid).ok_or_else(|| parse_err("unknown digest algorithm"))?
        }
        _ => return Err(parse_err("malformed AlgorithmIdentifier")),
    };
    if digest.len() != alg.size() {
        return Err(parse_err("digest length does not match algorithm"));
    }
    Ok((alg, digest.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn bare_public_key_hand_assembled() {
        // SEQUENCE { INTEGER <16 bytes, high bit set>, INTEGER 65537 },
        // lengths computed by hand.
        let der = hex!(
            "30 18"
            "02 11 00 c0 95 08 e1 45 1f ba 88 03 6f 65 9c 14 92 ff 11"
            "02 03 01 00 01"
        );
        let record = public_key_from_der(&der).unwrap();
        assert_eq!(
            record.modulus,
            hex!("c09508e1451fba88036f659c1492ff11")
        );
        assert_eq!(record.exponent, hex!("010001"));
    }

    #[test]
    fn public_key_envelope_round_trip() {
        let record = RsaPublicKeyRecord {
            modulus: hex!("c09508e1451fba88036f659c1492ff11").to_vec(),
            exponent: hex!("010001").to_vec(),
        };
        let der = public_key_to_der(&record).unwrap();
        // The envelope leads with the rsaEncryption algorithm identifier.
        assert_eq!(
            &der[2..17],
            &hex!("30 0d 06 09 2a 86 48 86 f7 0d 01 01 01 05 00")
        );
        assert_eq!(public_key_from_der(&der).unwrap(), record);
    }

    #[test]
    fn private_key_round_trip_both_framings() {
        let record = RsaPrivateKeyRecord {
            version: 0,
            modulus: hex!("0f9d").to_vec(),
            public_exponent: hex!("010001").to_vec(),
            private_exponent: hex!("0ae1").to_vec(),
            prime1: hex!("83").to_vec(),
            prime2: hex!("89").to_vec(),
            exponent1: hex!("31").to_vec(),
            exponent2: hex!("07").to_vec(),
            coefficient: hex!("5f").to_vec(),
        };
        let der = private_key_to_der(&record).unwrap();
        assert_eq!(private_key_from_der(&der).unwrap(), record);

        // The inner OCTET STRING payload alone is a valid PKCS#1 blob.
        let blocks = from_der(&der).unwrap();
        let inner = match &blocks[0] {
            ASN1Block::Sequence(_, items) => match &items[2] {
                ASN1Block::OctetString(_, key) => key.clone(),
                _ => panic!("expected OCTET STRING"),
            },
            _ => panic!("expected SEQUENCE"),
        };
        assert_eq!(private_key_from_der(&inner).unwrap(), record);
    }

    #[test]
    fn integers_with_high_bit_keep_sign_octet() {
        let record = RsaPublicKeyRecord {
            modulus: hex!("ff00000000000000000001").to_vec(),
            exponent: hex!("03").to_vec(),
        };
        let der = public_key_to_der(&record).unwrap();
        let parsed = public_key_from_der(&der).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn digest_info_matches_published_prefix() {
        let digest = [0xabu8; 32];
        let der = digest_info_to_der(HashAlg::Sha256, &digest).unwrap();
        // The standard SHA-256 DigestInfo prefix.
        assert_eq!(
            &der[..19],
            &hex!("30 31 30 0d 06 09 60 86 48 01 65 03 04 02 01 05 00 04 20")
        );
        assert_eq!(&der[19..], &digest);

        let (alg, parsed) = digest_info_from_der(&der).unwrap();
        assert_eq!(alg, HashAlg::Sha256);
        assert_eq!(parsed, digest);
    }

    #[test]
    fn digest_info_rejects_length_mismatch() {
        assert!(digest_info_to_der(HashAlg::Sha256, &[0u8; 20]).is_err());
        let der = digest_info_to_der(HashAlg::Sha1, &[0u8; 20]).unwrap();
        let (alg, _) = digest_info_from_der(&der).unwrap();
        assert_eq!(alg, HashAlg::Sha1);
    }

    #[test]
    fn wipe_clears_private_record() {
        let mut record = RsaPrivateKeyRecord {
            version: 0,
            modulus: vec![1, 2, 3],
            public_exponent: vec![1, 0, 1],
            private_exponent: vec![9, 9, 9],
            prime1: vec![7],
            prime2: vec![11],
            exponent1: vec![3],
            exponent2: vec![5],
            coefficient: vec![2],
        };
        record.wipe();
        assert!(record.private_exponent.is_empty() || record.private_exponent.iter().all(|b| *b == 0));
        assert!(record.prime1.is_empty() || record.prime1.iter().all(|b| *b == 0));
    }
}
