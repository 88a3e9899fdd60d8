//! RSA public-key cryptography over an arena-pooled big integer core.
//!
//! The crate carries its own multi-precision arithmetic: reference-counted
//! copy-on-write values pooled in an [`Arena`], schoolbook multiplication
//! over half-machine-word limbs, Knuth long division with cached
//! pre-normalized moduli, and a FIPS 186-4 prime generator. On top of that
//! sit PKCS#1 v1.5 padding, DER/PEM key serialization (PKCS#1 and PKCS#8)
//! and the [`Rsa`] key object with `sign`/`verify`/`encrypt`/`decrypt`.
//!
//! Modular exponentiation here is *not* constant-time and the private
//! operations are unblinded; see [`Arena::mod_power`] before using this
//! in a setting where local timing adversaries matter.
//!
//! # Example
//!
//! ```
//! use rsa_arena::{HashAlg, PrimeCoverage, Rsa};
//! use rand_core::OsRng;
//! use std::time::Duration;
//!
//! let mut rsa = Rsa::new();
//! rsa.generate(&mut OsRng, 512, PrimeCoverage::Fast, 0, Duration::from_secs(60))
//!     .expect("key generation");
//!
//! let digest = HashAlg::Sha256.digest(b"hello world");
//! let signature = rsa.sign(HashAlg::Sha256, &digest).expect("sign");
//! let (alg, opened) = rsa.verify(&signature).expect("verify");
//! assert_eq!(alg, HashAlg::Sha256);
//! assert_eq!(opened, digest);
//! ```

pub mod asn1;
pub mod bigint;
pub mod errors;
pub mod hash;
pub mod registry;

mod key;
mod pkcs1v15;

pub use crate::asn1::{RsaPrivateKeyRecord, RsaPublicKeyRecord};
pub use crate::bigint::{Arena, ModSlot, Num, PrimeCoverage};
pub use crate::errors::{Error, Result};
pub use crate::hash::HashAlg;
pub use crate::key::{Rsa, DEFAULT_GENERATE_TIMEOUT, SUPPORTED_KEY_BITS};
