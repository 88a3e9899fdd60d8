//! PKCS#1 v1.5 block padding as described in [RFC8017 § 8.2 and § 7.2].
//!
//! Block type 1 (all-`0xFF` filler) wraps signatures, block type 2 (random
//! nonzero filler) wraps encrypted messages. Neither provides the security
//! of a modern scheme; both unpad scans are kept constant-layout so
//! padding validity leaks as little as possible.
//!
//! [RFC8017 § 8.2 and § 7.2]: https://datatracker.ietf.org/doc/html/rfc8017

use rand_core::CryptoRngCore;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::errors::{Error, Result};

/// Least padding bytes between header and message.
const MIN_PAD: usize = 8;

/// Fills the provided slice with random values, which are guaranteed
/// to not be zero.
#[inline]
fn non_zero_random_bytes<R: CryptoRngCore + ?Sized>(rng: &mut R, data: &mut [u8]) {
    rng.fill_bytes(data);

    for el in data {
        while *el == 0u8 {
            rng.fill_bytes(core::slice::from_mut(el));
        }
    }
}

/// `EM = 0x00 || 0x01 || PS(0xFF) || 0x00 || M`
pub(crate) fn sign_pad(msg: &[u8], k: usize) -> Result<Vec<u8>> {
    if msg.len() + MIN_PAD + 3 > k {
        return Err(Error::MessageTooLong);
    }
    let mut em = vec![0xff; k];
    em[0] = 0;
    em[1] = 1;
    em[k - msg.len() - 1] = 0;
    em[k - msg.len()..].copy_from_slice(msg);
    Ok(em)
}

/// `EM = 0x00 || 0x02 || PS(random nonzero) || 0x00 || M`
pub(crate) fn encrypt_pad<R: CryptoRngCore + ?Sized>(
    rng: &mut R,
    msg: &[u8],
    k: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if msg.len() + MIN_PAD + 3 > k {
        return Err(Error::MessageTooLong);
    }
    let mut em = Zeroizing::new(vec![0u8; k]);
    em[1] = 2;
    non_zero_random_bytes(rng, &mut em[2..k - msg.len() - 1]);
    em[k - msg.len() - 1] = 0;
    em[k - msg.len()..].copy_from_slice(msg);
    Ok(em)
}

/// Strip a block type 1 envelope, returning the signed payload.
///
/// Like the block type 2 scan below, the whole buffer is walked
/// unconditionally and validity accumulates into a single `Choice`.
pub(crate) fn sign_unpad(em: &[u8]) -> Result<Vec<u8>> {
    if em.len() < MIN_PAD + 3 {
        return Err(Error::Padding);
    }
    let first_byte_is_zero = em[0].ct_eq(&0u8);
    let second_byte_is_one = em[1].ct_eq(&1u8);

    // Offset of the byte ending the 0xFF run, found without branching on
    // the data; that byte must be the zero terminator.
    let mut in_filler = Choice::from(1u8);
    let mut index = 0u32;
    let mut terminated = Choice::from(0u8);
    for (i, el) in em.iter().enumerate().skip(2) {
        let is_filler = el.ct_eq(&0xffu8);
        let at_end = in_filler & !is_filler;
        index.conditional_assign(&(i as u32), at_end);
        terminated.conditional_assign(&el.ct_eq(&0u8), at_end);
        in_filler &= is_filler;
    }

    // The filler run must span at least eight bytes, i.e. the terminator
    // can appear at offset ten or later.
    let valid_ps = Choice::from((((2 + MIN_PAD as i32 - index as i32 - 1) >> 31) & 1) as u8);
    let valid = first_byte_is_zero & second_byte_is_one & !in_filler & terminated & valid_ps;
    if valid.unwrap_u8() == 0 {
        return Err(Error::Padding);
    }
    Ok(em[index as usize + 1..].to_vec())
}

/// Strip a block type 2 envelope, returning the encrypted payload.
///
/// The scan walks the whole buffer regardless of where the terminator
/// sits, so invalid padding costs the same as valid padding.
pub(crate) fn encrypt_unpad(em: &[u8]) -> Result<Vec<u8>> {
    if em.len() < MIN_PAD + 3 {
        return Err(Error::Padding);
    }
    let first_byte_is_zero = em[0].ct_eq(&0u8);
    let second_byte_is_two = em[1].ct_eq(&2u8);

    // Offset of the first zero byte after the header, found without
    // branching on the data.
    let mut looking_for_index = Choice::from(1u8);
    let mut index = 0u32;
    for (i, el) in em.iter().enumerate().skip(2) {
        let equals0 = el.ct_eq(&0u8);
        index.conditional_assign(&(i as u32), looking_for_index & equals0);
        looking_for_index &= !equals0;
    }

    // The padding run must span at least eight bytes, i.e. the first zero
    // can appear at offset ten or later.
    let valid_ps = Choice::from((((2 + MIN_PAD as i32 - index as i32 - 1) >> 31) & 1) as u8);
    let valid = first_byte_is_zero & second_byte_is_two & !looking_for_index & valid_ps;
    if valid.unwrap_u8() == 0 {
        return Err(Error::Padding);
    }
    Ok(em[index as usize + 1..].to_vec())
}
