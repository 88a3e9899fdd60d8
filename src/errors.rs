use std::string::String;

pub type Result<T> = core::result::Result<T, Error>;

/// Error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A key is already installed on this instance.
    KeyAlreadyLoaded,
    /// The requested operation needs key material that has not been loaded.
    KeyNotLoaded,
    /// Key generation was requested with a modulus size outside the
    /// supported set.
    UnsupportedKeySize,
    /// A shared value cannot be promoted to a permanent one.
    ValueShared,
    /// The value is not permanent, so it cannot be demoted.
    ValueUnique,
    /// A value was used with an arena that did not issue it. Reserved:
    /// cross-arena mixing is caught by debug assertions, which report
    /// this condition without constructing it.
    ForeignValue,
    DivisionByZero,
    /// GCD requires both operands to be nonzero.
    ZeroOperand,
    /// The modulus is out of range: shorter than the minimum on load, or
    /// not above one for an inversion.
    InvalidModulus,
    /// The exponent component is out of range or missing.
    InvalidExponent,
    /// A prime component is out of range or missing.
    InvalidPrime,
    MessageTooLong,
    /// Malformed PKCS#1 v1.5 padding on decrypt or verify.
    Padding,
    Decryption,
    Verification,
    ParseError { reason: String },
    EncodeError { reason: String },
    /// The prime search deadline elapsed before a candidate was found.
    Timeout,
    /// The random source failed its output quality checks.
    WeakRandomness,
    Internal,
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Error::KeyAlreadyLoaded => write!(f, "key material already loaded"),
            Error::KeyNotLoaded => write!(f, "key material not loaded"),
            Error::UnsupportedKeySize => write!(f, "unsupported modulus bit size"),
            Error::ValueShared => write!(f, "value is shared and cannot become permanent"),
            Error::ValueUnique => write!(f, "value is not permanent"),
            Error::ForeignValue => write!(f, "value belongs to a different arena"),
            Error::DivisionByZero => write!(f, "division by zero"),
            Error::ZeroOperand => write!(f, "gcd operand is zero"),
            Error::InvalidModulus => write!(f, "invalid modulus"),
            Error::InvalidExponent => write!(f, "invalid exponent"),
            Error::InvalidPrime => write!(f, "invalid prime value"),
            Error::MessageTooLong => write!(f, "message too long"),
            Error::Padding => write!(f, "invalid padding"),
            Error::Decryption => write!(f, "decryption error"),
            Error::Verification => write!(f, "verification error"),
            Error::ParseError { reason } => write!(f, "parse error: {}", reason),
            Error::EncodeError { reason } => write!(f, "encoding error: {}", reason),
            Error::Timeout => write!(f, "prime generation timed out"),
            Error::WeakRandomness => write!(f, "random generator output is too weak"),
            Error::Internal => write!(f, "internal error"),
        }
    }
}
