//! Per-limb arithmetic primitives.
//!
//! A limb is half the native pointer width, so every intermediate fits in a
//! native double-width accumulator and carries never need special casing:
//! `(R-1) + (R-1)*(R-1) + (R-1) = R*R - 1` is exactly the widest value a
//! `Wide` can hold.

/// One storage word of a big integer, half the host pointer width.
#[cfg(target_pointer_width = "64")]
pub type Limb = u32;
/// Double-width accumulator for limb arithmetic.
#[cfg(target_pointer_width = "64")]
pub type Wide = u64;

#[cfg(target_pointer_width = "32")]
pub type Limb = u16;
#[cfg(target_pointer_width = "32")]
pub type Wide = u32;

pub const LIMB_BITS: usize = Limb::BITS as usize;
pub const LIMB_BYTES: usize = LIMB_BITS / 8;

/// The limb radix `R = 2^LIMB_BITS`.
pub const RADIX: Wide = (Limb::MAX as Wide) + 1;

/// `dst[i] += src[i]` over `src.len()` limbs, returning the final carry.
pub fn add(dst: &mut [Limb], src: &[Limb], mut carry: Limb) -> Limb {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        let acc = *d as Wide + *s as Wide + carry as Wide;
        *d = acc as Limb;
        carry = (acc >> LIMB_BITS) as Limb;
    }
    carry
}

/// Propagate a carry through `dst`, returning whatever is left at the top.
pub fn add_carry(dst: &mut [Limb], mut carry: Limb) -> Limb {
    for d in dst.iter_mut() {
        if carry == 0 {
            break;
        }
        let acc = *d as Wide + carry as Wide;
        *d = acc as Limb;
        carry = (acc >> LIMB_BITS) as Limb;
    }
    carry
}

/// `dst[i] -= src[i]` over `src.len()` limbs, returning the final borrow.
pub fn sub(dst: &mut [Limb], src: &[Limb], mut borrow: Limb) -> Limb {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        let acc = RADIX + *d as Wide - *s as Wide - borrow as Wide;
        *d = acc as Limb;
        borrow = 1 - (acc >> LIMB_BITS) as Limb;
    }
    borrow
}

/// Propagate a borrow through `dst`, returning whatever is left at the top.
pub fn sub_borrow(dst: &mut [Limb], mut borrow: Limb) -> Limb {
    for d in dst.iter_mut() {
        if borrow == 0 {
            break;
        }
        let acc = RADIX + *d as Wide - borrow as Wide;
        *d = acc as Limb;
        borrow = 1 - (acc >> LIMB_BITS) as Limb;
    }
    borrow
}

/// `dst[i] += src[i] * factor`, the inner step of schoolbook
/// multiplication. Returns the final carry.
pub fn mul_add(dst: &mut [Limb], src: &[Limb], factor: Limb, mut carry: Limb) -> Limb {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        let acc = *d as Wide + *s as Wide * factor as Wide + carry as Wide;
        *d = acc as Limb;
        carry = (acc >> LIMB_BITS) as Limb;
    }
    carry
}

/// `dst[i] -= src[i] * factor`, the multiply-subtract step of long
/// division. Returns the final borrow.
pub fn sub_mul(dst: &mut [Limb], src: &[Limb], factor: Limb) -> Limb {
    let mut borrow: Wide = 0;
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        let product = *s as Wide * factor as Wide + borrow;
        let acc = RADIX + *d as Wide - (product & (RADIX - 1));
        *d = acc as Limb;
        borrow = (product >> LIMB_BITS) + 1 - (acc >> LIMB_BITS);
    }
    borrow as Limb
}

/// Multiply in place by a single limb, returning the carry out of the top.
pub fn mul(dst: &mut [Limb], factor: Limb, mut carry: Limb) -> Limb {
    for d in dst.iter_mut() {
        let acc = *d as Wide * factor as Wide + carry as Wide;
        *d = acc as Limb;
        carry = (acc >> LIMB_BITS) as Limb;
    }
    carry
}

/// Top-down in-place division by a single limb; the return value is the
/// remainder.
pub fn div_rem(limbs: &mut [Limb], divisor: Limb) -> Limb {
    debug_assert!(divisor != 0);
    let mut rem: Wide = 0;
    for d in limbs.iter_mut().rev() {
        let acc = (rem << LIMB_BITS) | *d as Wide;
        *d = (acc / divisor as Wide) as Limb;
        rem = acc % divisor as Wide;
    }
    rem as Limb
}

/// Remainder of division by a single limb, without writing the quotient.
pub fn rem(limbs: &[Limb], divisor: Limb) -> Limb {
    debug_assert!(divisor != 0);
    let mut rem: Wide = 0;
    for d in limbs.iter().rev() {
        rem = ((rem << LIMB_BITS) | *d as Wide) % divisor as Wide;
    }
    rem as Limb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_carries_across_limbs() {
        let mut a = [Limb::MAX, Limb::MAX];
        let carry = add(&mut a, &[1, 0], 0);
        assert_eq!(a, [0, 0]);
        assert_eq!(carry, 1);
    }

    #[test]
    fn sub_borrows_across_limbs() {
        let mut a = [0, 1];
        let borrow = sub(&mut a, &[1, 0], 0);
        assert_eq!(a, [Limb::MAX, 0]);
        assert_eq!(borrow, 0);

        let mut b = [0, 0];
        let borrow = sub(&mut b, &[1, 0], 0);
        assert_eq!(b, [Limb::MAX, Limb::MAX]);
        assert_eq!(borrow, 1);
    }

    #[test]
    fn mul_add_maximum_does_not_overflow() {
        let mut dst = [Limb::MAX, Limb::MAX];
        let carry = mul_add(&mut dst, &[Limb::MAX, Limb::MAX], Limb::MAX, Limb::MAX);
        // (R-1) + (R-1)^2 + (R-1) per limb stays below R^2.
        assert_eq!(carry, Limb::MAX);
    }

    #[test]
    fn sub_mul_matches_manual_borrow() {
        // 3R - 2 * (R - 1) == R + 2, with a two-unit borrow into the top
        // limb.
        let mut dst = [0, 3];
        let borrow = sub_mul(&mut dst[..1], &[Limb::MAX], 2);
        assert_eq!(borrow, 2);
        let fixed = sub_borrow(&mut dst[1..], borrow);
        assert_eq!(fixed, 0);
        assert_eq!(dst, [2, 1]);
    }

    #[test]
    fn div_rem_single_limb() {
        let mut a = [7, 3]; // 3 * R + 7
        let r = div_rem(&mut a, 2);
        assert_eq!(r, 1);
        assert_eq!(a[1], 1);
        assert_eq!(a[0], (RADIX / 2 + 3) as Limb);
        assert_eq!(rem(&[7, 3], 2), 1);
    }
}
