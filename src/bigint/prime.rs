//! Probabilistic prime testing and prime generation.
//!
//! Candidates are first screened by trial division against a table of small
//! odd primes, then put through Miller-Rabin with at least the round count
//! FIPS 186-4 table C.2 requires for the candidate's size.

use core::cmp::Ordering;
use std::time::Instant;

use rand_core::{CryptoRngCore, OsRng, RngCore};

use super::limb::{Limb, LIMB_BITS};
use super::{Arena, Num};
use crate::errors::{Error, Result};

/// How far the trial-division screen reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimeCoverage {
    /// Primes up to 53.
    Fast,
    /// Primes up to 1999.
    Most,
    /// Primes up to 17989.
    All,
}

impl PrimeCoverage {
    fn bound(self) -> u32 {
        match self {
            PrimeCoverage::Fast => 53,
            PrimeCoverage::Most => 1999,
            PrimeCoverage::All => 17989,
        }
    }
}

lazy_static::lazy_static! {
    /// Odd primes up to the widest coverage bound.
    static ref SMALL_PRIMES: Vec<u32> = {
        let limit = PrimeCoverage::All.bound() as usize;
        let mut composite = vec![false; limit + 1];
        let mut primes = Vec::with_capacity(2100);
        for n in 3..=limit {
            if composite[n] {
                continue;
            }
            primes.push(n as u32);
            let mut multiple = n * n;
            while multiple <= limit {
                composite[multiple] = true;
                multiple += n;
            }
        }
        primes
    };
}

/// Minimum Miller-Rabin rounds for a candidate of `bits` size, from
/// FIPS 186-4 table C.2 (error probability 2^-100).
pub(crate) fn miller_rabin_rounds(bits: usize, requested: usize) -> usize {
    let floor = if bits >= 1450 {
        4
    } else if bits >= 1150 {
        5
    } else if bits >= 1000 {
        6
    } else if bits >= 850 {
        7
    } else if bits >= 750 {
        8
    } else if bits >= 500 {
        13
    } else if bits >= 250 {
        28
    } else if bits >= 150 {
        40
    } else {
        51
    };
    requested.max(floor)
}

/// Candidates below `2^(n-0.5)` are rejected by FIPS 186-4; this is the
/// top-32-bit image of `sqrt(2) * 2^31`.
const MIN_TOP_WORD: u32 = 0xB504_F334;
const TOP_WORD_PATCH: u32 = 0xB505_0000;

const DENSITY_RETRIES: usize = 16;
const WITNESS_RETRIES: usize = 30;

impl Arena {
    /// True when the value is divisible by two or by any sieved prime
    /// within the coverage bound.
    pub fn matches_known_prime(&self, v: Num, coverage: PrimeCoverage) -> bool {
        if self.is_even(v) {
            return true;
        }
        let bound = coverage.bound();
        for p in SMALL_PRIMES.iter().take_while(|p| **p <= bound) {
            if self.int_mod(v, *p as Limb) == 0 {
                return true;
            }
        }
        false
    }

    /// Miller-Rabin primality test behind the trial-division screen.
    ///
    /// `iterations` rounds are run with random bases drawn from `rng`;
    /// pass 0 for the screen alone.
    pub fn is_prime<R: CryptoRngCore + ?Sized>(
        &mut self,
        v: Num,
        coverage: PrimeCoverage,
        iterations: usize,
        rng: &mut R,
    ) -> Result<bool> {
        if self.compare_limb(v, 2) == Ordering::Less {
            return Ok(false);
        }
        if self.compare_limb(v, 2) == Ordering::Equal {
            return Ok(true);
        }
        if self.is_even(v) {
            return Ok(false);
        }
        let bound = coverage.bound();
        for p in SMALL_PRIMES.iter().take_while(|p| **p <= bound) {
            if self.int_mod(v, *p as Limb) == 0 {
                return Ok(self.compare_limb(v, *p as Limb) == Ordering::Equal);
            }
        }

        // v - 1 = r * 2^s with r odd.
        let nm1 = {
            let c = self.copy(v);
            self.int_sub(c, 1)
        };
        let s = self.find_min_bit(nm1);
        let r = {
            let c = self.copy(nm1);
            self.shr(c, s)
        };

        let mut prime = true;
        'rounds: for _ in 0..iterations {
            let a = match self.random_witness(v, nm1, rng) {
                Ok(a) => a,
                Err(e) => {
                    self.release(nm1);
                    self.release(r);
                    return Err(e);
                }
            };
            let rc = self.copy(r);
            let mut y = self.mod_power(a, rc, Some(v))?;
            if self.compare_limb(y, 1) == Ordering::Equal
                || self.compare(y, nm1) == Ordering::Equal
            {
                self.release(y);
                continue;
            }
            for _ in 1..s {
                let sq = self.square(y);
                y = self.reduce(sq, Some(v))?;
                if self.compare(y, nm1) == Ordering::Equal {
                    self.release(y);
                    continue 'rounds;
                }
                if self.compare_limb(y, 1) == Ordering::Equal {
                    break;
                }
            }
            self.release(y);
            prime = false;
            break;
        }
        self.release(nm1);
        self.release(r);
        Ok(prime)
    }

    /// Draw a Miller-Rabin base `1 < a < v - 1` with the same limb count
    /// as `v`. A random source that cannot produce one in thirty draws is
    /// reported as too weak.
    fn random_witness<R: CryptoRngCore + ?Sized>(
        &mut self,
        v: Num,
        nm1: Num,
        rng: &mut R,
    ) -> Result<Num> {
        let bits = self.bit_count(v);
        let n = self.sig(v).len();
        let top_mask: Limb = if bits % LIMB_BITS == 0 {
            Limb::MAX
        } else {
            (1 << (bits % LIMB_BITS)) - 1
        };
        let a = self.allocate(n);
        for _ in 0..WITNESS_RETRIES {
            {
                let limbs = self.limbs_mut(a);
                for l in limbs.iter_mut() {
                    *l = rng.next_u32() as Limb;
                }
                limbs[n - 1] &= top_mask;
            }
            if self.bit_count(a) <= 1 {
                continue;
            }
            if self.compare(a, nm1) != Ordering::Less {
                continue;
            }
            return Ok(a);
        }
        self.release(a);
        Err(Error::WeakRandomness)
    }

    /// Turn `v` (its full allocated width) into a random probable prime.
    ///
    /// The buffer is seeded from the operating system generator, whitened
    /// with the caller's CSPRNG, forced odd and dense at the top per
    /// FIPS 186-4, then searched by repeated increments of two. Fails with
    /// `Timeout` once `deadline` passes without a hit.
    pub fn fill_prime<R: CryptoRngCore + ?Sized>(
        &mut self,
        v: Num,
        coverage: PrimeCoverage,
        iterations: usize,
        deadline: Instant,
        rng: &mut R,
    ) -> Result<()> {
        let bits = self.size(v) * LIMB_BITS;
        let iterations = miller_rabin_rounds(bits, iterations);
        loop {
            self.randomize_candidate(v, rng)?;
            loop {
                if Instant::now() > deadline {
                    return Err(Error::Timeout);
                }
                if self.is_prime(v, coverage, iterations, rng)? {
                    return Ok(());
                }
                let limbs = self.limbs_mut(v);
                super::limb::add_carry(limbs, 2);
                if top_word(limbs) < MIN_TOP_WORD {
                    // Wrapped past the top of the range; start over.
                    break;
                }
            }
        }
    }

    fn randomize_candidate<R: CryptoRngCore + ?Sized>(
        &mut self,
        v: Num,
        rng: &mut R,
    ) -> Result<()> {
        let bits = self.size(v) * LIMB_BITS;
        {
            let limbs = self.limbs_mut(v);
            for l in limbs.iter_mut() {
                *l = OsRng.next_u32() as Limb;
            }
        }
        let mut dense = false;
        for _ in 0..DENSITY_RETRIES {
            let limbs = self.limbs_mut(v);
            for l in limbs.iter_mut() {
                *l ^= rng.next_u32() as Limb;
            }
            let ones: usize = limbs.iter().map(|l| l.count_ones() as usize).sum();
            if ones * 3 >= bits {
                dense = true;
                break;
            }
        }
        if !dense {
            return Err(Error::WeakRandomness);
        }
        let limbs = self.limbs_mut(v);
        limbs[0] |= 1;
        if top_word(limbs) < MIN_TOP_WORD {
            or_top_word(limbs, TOP_WORD_PATCH);
        }
        Ok(())
    }
}

/// The top 32 bits of a limb buffer (which always spans at least 32 bits
/// when generating primes).
fn top_word(limbs: &[Limb]) -> u32 {
    let n = limbs.len();
    if LIMB_BITS >= 32 {
        limbs[n - 1] as u32
    } else {
        ((limbs[n - 1] as u32) << 16) | limbs[n - 2] as u32
    }
}

fn or_top_word(limbs: &mut [Limb], mask: u32) {
    let n = limbs.len();
    if LIMB_BITS >= 32 {
        limbs[n - 1] |= mask as Limb;
    } else {
        limbs[n - 1] |= (mask >> 16) as Limb;
        limbs[n - 2] |= mask as Limb;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::time::Duration;

    #[test]
    fn sieve_spans_all_coverage_bounds() {
        assert!(SMALL_PRIMES.starts_with(&[3, 5, 7, 11, 13]));
        assert!(SMALL_PRIMES.contains(&53));
        assert!(SMALL_PRIMES.contains(&1999));
        assert_eq!(*SMALL_PRIMES.last().unwrap(), 17989);
        assert!(SMALL_PRIMES.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn fips_round_floor() {
        assert_eq!(miller_rabin_rounds(1536, 0), 4);
        assert_eq!(miller_rabin_rounds(1024, 0), 6);
        assert_eq!(miller_rabin_rounds(512, 0), 13);
        assert_eq!(miller_rabin_rounds(256, 0), 28);
        assert_eq!(miller_rabin_rounds(128, 0), 51);
        assert_eq!(miller_rabin_rounds(512, 40), 40);
    }

    #[test]
    fn carmichael_numbers_are_composite() {
        let mut arena = Arena::new();
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        for n in [561u64, 1729] {
            let v = arena.from_u64(n);
            assert!(!arena
                .is_prime(v, PrimeCoverage::Fast, 5, &mut rng)
                .unwrap());
            assert!(!arena
                .is_prime(v, PrimeCoverage::Most, 20, &mut rng)
                .unwrap());
            arena.release(v);
        }
    }

    #[test]
    fn known_primes_pass() {
        let mut arena = Arena::new();
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        for n in [2u64, 3, 53, 1999, 17989, 65537, 2147483647] {
            let v = arena.from_u64(n);
            assert!(
                arena
                    .is_prime(v, PrimeCoverage::All, 20, &mut rng)
                    .unwrap(),
                "{} must test prime",
                n
            );
            arena.release(v);
        }
    }

    #[test]
    fn known_composites_fail() {
        let mut arena = Arena::new();
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        // 2^31 - 1 is prime but 2^29 - 1 = 233 * 1103 * 2089 is not, and
        // the factors sit beyond every sieve bound.
        for n in [4u64, 1001, (1 << 29) - 1, 65537 * 65539] {
            let v = arena.from_u64(n);
            assert!(!arena
                .is_prime(v, PrimeCoverage::Fast, 20, &mut rng)
                .unwrap());
            arena.release(v);
        }
    }

    #[test]
    fn matches_known_prime_respects_coverage() {
        let mut arena = Arena::new();
        // 59 * 61: both factors above the Fast bound.
        let v = arena.from_u64(59 * 61);
        assert!(!arena.matches_known_prime(v, PrimeCoverage::Fast));
        assert!(arena.matches_known_prime(v, PrimeCoverage::Most));
        arena.release(v);
        let even = arena.from_u64(1 << 20);
        assert!(arena.matches_known_prime(even, PrimeCoverage::Fast));
        arena.release(even);
    }

    #[test]
    fn fill_prime_produces_a_dense_odd_prime() {
        let mut arena = Arena::new();
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let n_limbs = 256 / LIMB_BITS;
        let v = arena.allocate(n_limbs);
        let deadline = Instant::now() + Duration::from_secs(30);
        arena
            .fill_prime(v, PrimeCoverage::Most, 0, deadline, &mut rng)
            .unwrap();
        assert!(arena.is_odd(v));
        assert_eq!(arena.bit_count(v), 256);
        assert!(top_word(arena.limbs(v)) >= MIN_TOP_WORD);
        assert!(arena
            .is_prime(v, PrimeCoverage::Most, 28, &mut rng)
            .unwrap());
        arena.release(v);
    }

    #[test]
    fn fill_prime_honors_deadline() {
        let mut arena = Arena::new();
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let n_limbs = 512 / LIMB_BITS;
        let v = arena.allocate(n_limbs);
        let deadline = Instant::now() - Duration::from_secs(1);
        assert_eq!(
            arena
                .fill_prime(v, PrimeCoverage::Fast, 0, deadline, &mut rng)
                .unwrap_err(),
            Error::Timeout
        );
        arena.release(v);
    }
}
