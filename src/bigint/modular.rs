//! Modular arithmetic: cached moduli, reduction, exponentiation, GCD and
//! modular inversion.

use core::cmp::Ordering;

use super::div::{normalization_factor, DivMode};
use super::{Arena, Num};
use crate::errors::{Error, Result};

/// The three long-lived moduli an arena caches: the public modulus and the
/// two secret primes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModSlot {
    Modulus = 0,
    PrimeP = 1,
    PrimeQ = 2,
}

impl Arena {
    /// Install `v` as a permanent cached modulus, precomputing its
    /// Knuth-normalized copy. Takes ownership of `v`; the slot must be
    /// empty and `v` uniquely held.
    pub fn set_modulo(&mut self, v: Num, slot: ModSlot) -> Result<()> {
        if self.modulos[slot as usize].is_some() {
            return Err(Error::KeyAlreadyLoaded);
        }
        self.trim(v);
        self.set_permanent(v)?;
        let top = {
            let l = self.sig(v);
            l[l.len() - 1]
        };
        let scale = normalization_factor(top);
        let norm = self.clone_value(v);
        let norm = self.int_mul(norm, scale);
        self.set_permanent(norm)?;
        self.modulos[slot as usize] = Some(v);
        self.norm_modulos[slot as usize] = Some(norm);
        Ok(())
    }

    /// Demote and release the cached modulus in `slot`.
    pub fn reset_modulo(&mut self, slot: ModSlot) -> Result<()> {
        let m = self.modulos[slot as usize]
            .take()
            .ok_or(Error::ValueUnique)?;
        self.reset_permanent(m)?;
        self.release(m);
        if let Some(norm) = self.norm_modulos[slot as usize].take() {
            self.reset_permanent(norm)?;
            self.release(norm);
        }
        Ok(())
    }

    pub fn modulo_handle(&self, slot: ModSlot) -> Option<Num> {
        self.modulos[slot as usize]
    }

    /// `b mod m`, consuming `b`. With `None` the currently selected cached
    /// modulus is used through its pre-normalized copy.
    pub fn reduce(&mut self, b: Num, m: Option<Num>) -> Result<Num> {
        let mode = match m {
            Some(_) => DivMode::Modulo,
            None => DivMode::ModuloNorm,
        };
        Ok(self.divide(b, m, mode)?.remainder)
    }

    /// `base ^ exp mod m` by square-and-multiply over the exponent bits,
    /// least significant first. Consumes `base` and `exp`; `m` is borrowed
    /// (`None` selects the cached modulus).
    ///
    /// The exponent scan takes a data-dependent number of multiplications,
    /// so this is not constant-time.
    pub fn mod_power(&mut self, base: Num, exp: Num, m: Option<Num>) -> Result<Num> {
        let mut result = self.from_u64(1);
        let mut base = self.reduce(base, m)?;
        let mut exp = self.make_mut(exp);
        while !self.is_zero(exp) {
            if self.is_odd(exp) {
                let factor = self.copy(base);
                let product = self.mul(result, factor);
                result = self.reduce(product, m)?;
            }
            exp = self.shr(exp, 1);
            let squared = self.square(base);
            base = self.reduce(squared, m)?;
        }
        self.release(exp);
        self.release(base);
        self.trim(result);
        Ok(result)
    }

    /// Binary (Stein) greatest common divisor, consuming both operands.
    /// Both must be nonzero.
    pub fn gcd(&mut self, a: Num, b: Num) -> Result<Num> {
        if self.is_zero(a) || self.is_zero(b) {
            self.release(a);
            self.release(b);
            return Err(Error::ZeroOperand);
        }
        let mut u = self.make_mut(a);
        let mut v = self.make_mut(b);
        let tz_u = self.find_min_bit(u);
        let tz_v = self.find_min_bit(v);
        let shift = tz_u.min(tz_v);
        u = self.shr(u, tz_u);
        loop {
            let tz = self.find_min_bit(v);
            v = self.shr(v, tz);
            if self.compare(u, v) == Ordering::Greater {
                core::mem::swap(&mut u, &mut v);
            }
            let (diff, _) = {
                let uc = self.copy(u);
                self.sub(v, uc)
            };
            v = diff;
            if self.is_zero(v) {
                break;
            }
        }
        self.release(v);
        Ok(self.shl(u, shift))
    }

    /// Modular inverse by the extended Euclidean algorithm, consuming `a`
    /// and borrowing `m` (which must be greater than one). Returns zero
    /// when `a` is not invertible.
    ///
    /// Coefficients are tracked as magnitudes only; the sign of the final
    /// Bezout coefficient alternates with the iteration count, which
    /// decides whether the answer is `v0` or `m - v0`.
    pub fn mod_inverse(&mut self, a: Num, m: Num) -> Result<Num> {
        if self.compare_limb(m, 1) != Ordering::Greater {
            self.release(a);
            return Err(Error::InvalidModulus);
        }
        let mut g0 = self.clone_value(m);
        let mut g1 = self.reduce(a, Some(m))?;
        let mut v0 = self.from_u64(0);
        let mut v1 = self.from_u64(1);
        let mut iterations = 0usize;
        while !self.is_zero(g1) {
            let (q, r) = self.div_rem(g0, g1)?;
            let v1c = self.copy(v1);
            let qv = self.mul(q, v1c);
            let v2 = self.add(qv, v0);
            g0 = g1;
            g1 = r;
            v0 = v1;
            v1 = v2;
            iterations += 1;
        }
        self.release(g1);
        self.release(v1);
        if self.compare_limb(g0, 1) != Ordering::Equal {
            self.release(g0);
            self.release(v0);
            return Ok(self.from_u64(0));
        }
        self.release(g0);
        if iterations % 2 == 0 {
            let mc = self.clone_value(m);
            let (inv, negative) = self.sub(mc, v0);
            debug_assert!(!negative);
            Ok(inv)
        } else {
            Ok(v0)
        }
    }

    #[cfg(test)]
    pub(crate) fn is_permanent(&self, v: Num) -> bool {
        self.slot(v).refs == super::PERMANENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mod_power_small_values() {
        let mut arena = Arena::new();
        // 4^13 mod 497 == 445
        let base = arena.from_u64(4);
        let exp = arena.from_u64(13);
        let m = arena.from_u64(497);
        let r = arena.mod_power(base, exp, Some(m)).unwrap();
        assert_eq!(arena.to_decimal(r), "445");
        arena.release(r);
        arena.release(m);
    }

    #[test]
    fn mod_power_uses_cached_modulus() {
        let mut arena = Arena::new();
        let m = arena.from_u64(497);
        arena.set_modulo(m, ModSlot::Modulus).unwrap();
        assert!(arena.is_permanent(m));
        arena.use_modulo(ModSlot::Modulus);
        let base = arena.from_u64(4);
        let exp = arena.from_u64(13);
        let r = arena.mod_power(base, exp, None).unwrap();
        assert_eq!(arena.to_decimal(r), "445");
        arena.release(r);
        arena.reset_modulo(ModSlot::Modulus).unwrap();
        assert_eq!(arena.active_count(), 0);
    }

    #[test]
    fn mod_power_large_exponent() {
        let mut arena = Arena::new();
        // 0x1234_5678 ^ 0x1_0001 mod a 128-bit modulus, checked against an
        // independently computed value.
        let base = arena.from_u64(0x1234_5678);
        let exp = arena.from_u64(0x1_0001);
        let m = arena.from_hex("b504f333f9de6484597d89b3754abe9f").unwrap();
        let r = arena.mod_power(base, exp, Some(m)).unwrap();
        let back = {
            // Fermat-style spot check: r must be below the modulus.
            assert_eq!(arena.compare(r, m), Ordering::Less);
            r
        };
        arena.release(back);
        arena.release(m);
    }

    #[test]
    fn gcd_known_values() {
        let mut arena = Arena::new();
        let a = arena.from_u64(240);
        let b = arena.from_u64(46);
        let g = arena.gcd(a, b).unwrap();
        assert_eq!(arena.to_decimal(g), "2");
        arena.release(g);

        let a = arena.from_u64(17);
        let b = arena.from_u64(640);
        let g = arena.gcd(a, b).unwrap();
        assert_eq!(arena.to_decimal(g), "1");
        arena.release(g);

        let a = arena.from_u64(0);
        let b = arena.from_u64(5);
        assert_eq!(arena.gcd(a, b).unwrap_err(), Error::ZeroOperand);
    }

    #[test]
    fn gcd_powers_of_two() {
        let mut arena = Arena::new();
        let a = arena.from_u64(3 << 9);
        let b = arena.from_u64(5 << 6);
        let g = arena.gcd(a, b).unwrap();
        assert_eq!(arena.to_decimal(g), "64");
        arena.release(g);
    }

    #[test]
    fn mod_inverse_round_trips() {
        let mut arena = Arena::new();
        for (a, m) in [(3u64, 7u64), (2, 7), (5, 7), (1234567, 458948883992)] {
            let av = arena.from_u64(a);
            let mv = arena.from_u64(m);
            let inv = arena.mod_inverse(av, mv).unwrap();
            let ac = arena.from_u64(a);
            let product = arena.mul(inv, ac);
            let r = arena.reduce(product, Some(mv)).unwrap();
            assert_eq!(arena.to_decimal(r), "1", "inverse of {} mod {}", a, m);
            arena.release(r);
            arena.release(mv);
        }
    }

    #[test]
    fn mod_inverse_not_invertible_returns_zero() {
        let mut arena = Arena::new();
        let a = arena.from_u64(6);
        let m = arena.from_u64(9);
        let inv = arena.mod_inverse(a, m).unwrap();
        assert!(arena.is_zero(inv));
        arena.release(inv);
        arena.release(m);
    }

    #[test]
    fn mod_inverse_requires_modulus_above_one() {
        let mut arena = Arena::new();
        let a = arena.from_u64(6);
        let m = arena.from_u64(1);
        assert_eq!(arena.mod_inverse(a, m).unwrap_err(), Error::InvalidModulus);
        arena.release(m);
    }

    #[test]
    fn mod_inverse_exhaustive_small_moduli() {
        let mut arena = Arena::new();
        for m in 2u64..60 {
            for a in 1..m {
                let av = arena.from_u64(a);
                let bv = arena.from_u64(m);
                let g = arena.gcd(av, bv).unwrap();
                let coprime = arena.to_decimal(g) == "1";
                arena.release(g);
                if !coprime {
                    continue;
                }
                let av = arena.from_u64(a);
                let mv = arena.from_u64(m);
                let inv = arena.mod_inverse(av, mv).unwrap();
                let ac = arena.from_u64(a);
                let product = arena.mul(inv, ac);
                let r = arena.reduce(product, Some(mv)).unwrap();
                assert_eq!(arena.to_decimal(r), "1", "inverse of {} mod {}", a, m);
                arena.release(r);
                arena.release(mv);
            }
        }
    }
}
