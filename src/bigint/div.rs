//! Multi-limb division: Knuth's algorithm D with divisor pre-normalization.
//!
//! The divisor's top limb is scaled up to at least `R/2` by the factor
//! `d = R / (top + 1)` so that the two-limb quotient estimate is off by at
//! most one (fixed by the add-back step). For reductions against a cached
//! modulus the pre-scaled divisor is reused instead of being recomputed.

use super::limb::{self, Limb, LIMB_BITS, RADIX, Wide};
use super::{Arena, Num};
use crate::errors::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DivMode {
    /// Quotient and remainder.
    Divide,
    /// Remainder only.
    Modulo,
    /// Remainder only, against the currently selected cached modulus using
    /// its pre-normalized copy.
    ModuloNorm,
}

pub(crate) struct DivOut {
    pub quotient: Option<Num>,
    pub remainder: Num,
}

impl Arena {
    /// `u / v` and `u mod v`, consuming `u`. The divisor is borrowed.
    pub fn div_rem(&mut self, u: Num, v: Num) -> Result<(Num, Num)> {
        let out = self.divide(u, Some(v), DivMode::Divide)?;
        // Divide mode always produces a quotient.
        let q = out.quotient.ok_or(Error::Internal)?;
        Ok((q, out.remainder))
    }

    /// `u mod v`, consuming `u`. The divisor is borrowed.
    pub fn modulo(&mut self, u: Num, v: Num) -> Result<Num> {
        Ok(self.divide(u, Some(v), DivMode::Modulo)?.remainder)
    }

    pub(crate) fn divide(&mut self, u: Num, v: Option<Num>, mode: DivMode) -> Result<DivOut> {
        let cur = self.current_modulo();
        let (v, cached_norm) = match (mode, v) {
            (DivMode::ModuloNorm, _) => {
                match (self.modulos[cur as usize], self.norm_modulos[cur as usize]) {
                    (Some(m), Some(norm)) => (m, Some(norm)),
                    _ => {
                        self.release(u);
                        return Err(Error::InvalidModulus);
                    }
                }
            }
            (_, Some(v)) => (v, None),
            (_, None) => {
                self.release(u);
                return Err(Error::InvalidModulus);
            }
        };
        if self.is_zero(v) {
            self.release(u);
            return Err(Error::DivisionByZero);
        }

        // Fast path: dividend already smaller than the divisor.
        if self.compare(u, v) == core::cmp::Ordering::Less {
            let u = self.make_mut(u);
            let quotient = match mode {
                DivMode::Divide => Some(self.from_u64(0)),
                _ => None,
            };
            return Ok(DivOut {
                quotient,
                remainder: u,
            });
        }

        // Fast path: single-limb divisor.
        let vs = self.sig(v).len();
        if vs == 1 {
            let divisor = self.sig(v)[0];
            let (q, rem) = self.int_div(u, divisor);
            let remainder = self.from_u64(rem as u64);
            return match mode {
                DivMode::Divide => Ok(DivOut {
                    quotient: Some(q),
                    remainder,
                }),
                _ => {
                    self.release(q);
                    Ok(DivOut {
                        quotient: None,
                        remainder,
                    })
                }
            };
        }

        let scale = normalization_factor(self.sig(v)[self.sig(v).len() - 1]);

        // Working copy of the dividend, scaled and with one spare top limb.
        let un = self.sig(u).len();
        let work = self.allocate(un + 1);
        {
            let (dst, src) = self.pair_mut(work, u);
            dst.limbs[..un].copy_from_slice(&src.limbs[..un]);
            let carry = limb::mul(&mut dst.limbs[..un], scale, 0);
            dst.limbs[un] = carry;
        }
        self.release(u);

        // Scaled divisor: reuse the cached pre-normalized modulus when asked.
        let (vn, release_vn) = match cached_norm {
            Some(cached) => (cached, false),
            None => {
                let vn = self.clone_value(v);
                let vn = self.int_mul(vn, scale);
                (vn, true)
            }
        };
        debug_assert_eq!(self.sig(vn).len(), vs);

        let quotient = self.allocate(un - vs + 1);
        {
            let (work_slot, q_slot, v_slot) = self.triple_for_div(work, quotient, vn);
            let w = &mut work_slot.limbs[..un + 1];
            let q = &mut q_slot.limbs[..un - vs + 1];
            let d = &v_slot.limbs[..vs];
            let v_top = d[vs - 1] as Wide;
            let v_next = d[vs - 2] as Wide;
            for j in (0..=un - vs).rev() {
                // Two-limb estimate against the divisor's top limb.
                let num = ((w[j + vs] as Wide) << LIMB_BITS) | w[j + vs - 1] as Wide;
                let mut q_hat = num / v_top;
                let mut r_hat = num - q_hat * v_top;
                if q_hat >= RADIX {
                    q_hat = RADIX - 1;
                    r_hat = num - q_hat * v_top;
                }
                // Refine with the second divisor limb.
                while r_hat < RADIX
                    && q_hat * v_next > ((r_hat << LIMB_BITS) | w[j + vs - 2] as Wide)
                {
                    q_hat -= 1;
                    r_hat += v_top;
                }
                // Multiply-subtract; on overshoot add the divisor back once.
                let borrow = limb::sub_mul(&mut w[j..j + vs], d, q_hat as Limb);
                let (top, underflow) = w[j + vs].overflowing_sub(borrow);
                w[j + vs] = top;
                if underflow {
                    q_hat -= 1;
                    let carry = limb::add(&mut w[j..j + vs], d, 0);
                    w[j + vs] = w[j + vs].wrapping_add(carry);
                }
                q[j] = q_hat as Limb;
            }
        }

        // The remainder sits in the low limbs of the work buffer, still
        // scaled by the normalization factor.
        let remainder = self.allocate(vs);
        {
            let (dst, src) = self.pair_mut(remainder, work);
            dst.limbs[..vs].copy_from_slice(&src.limbs[..vs]);
        }
        self.release(work);
        let (remainder, stray) = self.int_div(remainder, scale);
        debug_assert_eq!(stray, 0);
        if release_vn {
            self.release(vn);
        }

        let quotient = match mode {
            DivMode::Divide => {
                self.trim(quotient);
                Some(quotient)
            }
            _ => {
                self.release(quotient);
                None
            }
        };
        Ok(DivOut {
            quotient,
            remainder,
        })
    }

    /// Same split-borrow as `triple`, but with the mutable quotient slot as
    /// a second writable region folded into the work slot borrow.
    fn triple_for_div(&mut self, work: Num, quotient: Num, vn: Num) -> (&mut super::Slot, &mut super::Slot, &super::Slot) {
        debug_assert_ne!(work.idx, quotient.idx);
        debug_assert_ne!(work.idx, vn.idx);
        debug_assert_ne!(quotient.idx, vn.idx);
        let mut order = [work.idx, quotient.idx, vn.idx];
        order.sort_unstable();
        let (first, rest) = self.slots.split_at_mut(order[1]);
        let (second, third) = rest.split_at_mut(order[2] - order[1]);
        let mut w: Option<&mut super::Slot> = None;
        let mut q: Option<&mut super::Slot> = None;
        let mut v: Option<&mut super::Slot> = None;
        for (idx, slot) in [
            (order[0], &mut first[order[0]]),
            (order[1], &mut second[0]),
            (order[2], &mut third[0]),
        ] {
            if idx == work.idx {
                w = Some(slot);
            } else if idx == quotient.idx {
                q = Some(slot);
            } else {
                v = Some(slot);
            }
        }
        match (w, q, v) {
            (Some(w), Some(q), Some(v)) => (w, q, &*v),
            _ => unreachable!("distinct slot indices"),
        }
    }
}

/// Knuth's scaling factor `R / (top + 1)`, bringing the divisor's top limb
/// to at least `R/2`.
pub(crate) fn normalization_factor(top: Limb) -> Limb {
    (RADIX / (top as Wide + 1)) as Limb
}
