//! Arena-pooled multi-precision integers.
//!
//! Every big integer lives inside an [`Arena`] that owns its limb storage.
//! Values are addressed through small copyable [`Num`] handles carrying a
//! reference count inside the arena slot: copies are free until a mutation
//! forces a private buffer (copy-on-write), released buffers go onto a LIFO
//! free list for reuse, and long-lived key material is promoted to a
//! *permanent* state that the ordinary release path ignores.
//!
//! The arena also caches up to three moduli (N, P, Q) together with their
//! pre-normalized counterparts for Knuth division; see [`ModSlot`].

pub(crate) mod limb;

mod div;
mod modular;
mod ops;
mod prime;

pub use modular::ModSlot;
pub use prime::PrimeCoverage;

use byteorder::{BigEndian, ByteOrder};
use zeroize::Zeroize;

use crate::errors::{Error, Result};
use limb::{Limb, LIMB_BYTES};

/// Reference count value marking a permanent slot.
const PERMANENT: i32 = -1;

/// Handle to one value inside an [`Arena`].
///
/// Handles are plain indices and are only meaningful for the arena that
/// issued them; mixing arenas is a bug caught by a debug assertion.
#[derive(Clone, Copy, Debug)]
pub struct Num {
    idx: usize,
    owner: u32,
}

struct Slot {
    /// Little-endian limbs; `limbs.len()` is the slot capacity.
    limbs: Vec<Limb>,
    /// Number of meaningful limbs, at least 1 for a live value.
    size: usize,
    /// `>= 1` shared, `0` on the free list, `-1` permanent.
    refs: i32,
    next_free: Option<usize>,
}

/// Owner of pooled big integers and cached moduli.
pub struct Arena {
    slots: Vec<Slot>,
    free_head: Option<usize>,
    active: usize,
    freed: usize,
    id: u32,
    current: ModSlot,
    pub(crate) modulos: [Option<Num>; 3],
    pub(crate) norm_modulos: [Option<Num>; 3],
}

use core::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

fn next_grow(n: usize) -> usize {
    n.next_power_of_two().max(4)
}

impl Arena {
    pub fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free_head: None,
            active: 0,
            freed: 0,
            id: NEXT_ARENA_ID.fetch_add(1, AtomicOrdering::Relaxed),
            current: ModSlot::Modulus,
            modulos: [None; 3],
            norm_modulos: [None; 3],
        }
    }

    /// Number of live (not released) values, permanents included.
    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Number of buffers parked on the free list.
    pub fn free_count(&self) -> usize {
        self.freed
    }

    fn handle(&self, idx: usize) -> Num {
        Num {
            idx,
            owner: self.id,
        }
    }

    fn slot(&self, v: Num) -> &Slot {
        debug_assert_eq!(v.owner, self.id, "value used with a foreign arena");
        let s = &self.slots[v.idx];
        debug_assert_ne!(s.refs, 0, "value used after release");
        s
    }

    fn slot_mut(&mut self, v: Num) -> &mut Slot {
        debug_assert_eq!(v.owner, self.id, "value used with a foreign arena");
        let s = &mut self.slots[v.idx];
        debug_assert_ne!(s.refs, 0, "value used after release");
        s
    }

    pub(crate) fn limbs(&self, v: Num) -> &[Limb] {
        let s = self.slot(v);
        &s.limbs[..s.size]
    }

    pub(crate) fn limbs_mut(&mut self, v: Num) -> &mut [Limb] {
        let s = self.slot_mut(v);
        debug_assert_eq!(s.refs, 1, "mutating a shared value");
        &mut s.limbs[..s.size]
    }

    pub fn size(&self, v: Num) -> usize {
        self.slot(v).size
    }

    /// Grow or shrink the meaningful limb count; newly exposed limbs are
    /// zeroed.
    pub(crate) fn set_size(&mut self, v: Num, n: usize) {
        debug_assert!(n >= 1);
        let s = self.slot_mut(v);
        if n > s.limbs.len() {
            s.limbs.resize(next_grow(n), 0);
        }
        if n > s.size {
            s.limbs[s.size..n].fill(0);
        }
        s.size = n;
    }

    /// Allocate a zeroed value of `n` limbs, reusing the most recently
    /// released buffer when one is available.
    pub fn allocate(&mut self, n: usize) -> Num {
        debug_assert!(n >= 1);
        self.active += 1;
        if let Some(idx) = self.free_head {
            let slot = &mut self.slots[idx];
            self.free_head = slot.next_free.take();
            self.freed -= 1;
            if slot.limbs.len() < n {
                slot.limbs.resize(next_grow(n), 0);
            }
            slot.limbs[..n].fill(0);
            slot.size = n;
            slot.refs = 1;
            return self.handle(idx);
        }
        let idx = self.slots.len();
        self.slots.push(Slot {
            limbs: vec![0; next_grow(n)],
            size: n,
            refs: 1,
            next_free: None,
        });
        self.handle(idx)
    }

    pub fn from_u64(&mut self, u: u64) -> Num {
        let n = (64 / limb::LIMB_BITS).max(1);
        let v = self.allocate(n);
        {
            let limbs = self.limbs_mut(v);
            let mut u = u;
            for l in limbs.iter_mut() {
                *l = u as Limb;
                u >>= limb::LIMB_BITS;
            }
        }
        self.trim(v);
        v
    }

    /// Share a value: free for permanents, a reference count bump otherwise.
    pub fn copy(&mut self, v: Num) -> Num {
        let s = self.slot_mut(v);
        if s.refs != PERMANENT {
            s.refs += 1;
        }
        v
    }

    /// Deep copy into a fresh slot.
    pub fn clone_value(&mut self, v: Num) -> Num {
        let n = self.size(v);
        let out = self.allocate(n);
        let (dst, src) = self.pair_mut(out, v);
        dst.limbs[..n].copy_from_slice(&src.limbs[..n]);
        out
    }

    /// Ensure `v` has a private buffer before an in-place mutation.
    ///
    /// Same contract as `Rc::make_mut`: uniquely held values are returned
    /// as-is, shared and permanent ones are deep-copied (dropping one
    /// shared reference in the former case).
    pub(crate) fn make_mut(&mut self, v: Num) -> Num {
        let refs = self.slot(v).refs;
        if refs == 1 {
            return v;
        }
        if refs > 1 {
            self.slot_mut(v).refs -= 1;
        }
        self.clone_value(v)
    }

    /// Drop one reference; the buffer is parked on the free list when the
    /// count reaches zero. Releasing a permanent value is a no-op.
    pub fn release(&mut self, v: Num) {
        debug_assert_eq!(v.owner, self.id, "value released into a foreign arena");
        let slot = &mut self.slots[v.idx];
        debug_assert_ne!(slot.refs, 0, "double release");
        if slot.refs == PERMANENT {
            return;
        }
        slot.refs -= 1;
        if slot.refs == 0 {
            self.active -= 1;
            slot.next_free = self.free_head.take();
            self.free_head = Some(v.idx);
            self.freed += 1;
        }
    }

    /// Zero-fill every buffer on the free list so released intermediates
    /// of private-key operations leave no trace.
    pub fn wipe_released(&mut self) {
        let mut cursor = self.free_head;
        while let Some(idx) = cursor {
            let slot = &mut self.slots[idx];
            slot.limbs.zeroize();
            slot.size = 1;
            cursor = slot.next_free;
        }
    }

    /// Promote a uniquely held value to the permanent state.
    pub fn set_permanent(&mut self, v: Num) -> Result<()> {
        let slot = self.slot_mut(v);
        if slot.refs != 1 {
            return Err(Error::ValueShared);
        }
        slot.refs = PERMANENT;
        Ok(())
    }

    /// Demote a permanent value back to an ordinary single-reference one.
    pub fn reset_permanent(&mut self, v: Num) -> Result<()> {
        let slot = self.slot_mut(v);
        if slot.refs != PERMANENT {
            return Err(Error::ValueUnique);
        }
        slot.refs = 1;
        Ok(())
    }

    pub(crate) fn current_modulo(&self) -> ModSlot {
        self.current
    }

    /// Select which cached modulus `reduce`/`mod_power` use when called
    /// without an explicit one.
    pub fn use_modulo(&mut self, slot: ModSlot) {
        self.current = slot;
    }

    /// Big-endian bytes into a fresh value.
    pub fn load(&mut self, bytes: &[u8]) -> Num {
        let n = ((bytes.len() + LIMB_BYTES - 1) / LIMB_BYTES).max(1);
        let v = self.allocate(n);
        {
            let limbs = self.limbs_mut(v);
            let mut end = bytes.len();
            for l in limbs.iter_mut() {
                if end == 0 {
                    break;
                }
                let start = end.saturating_sub(LIMB_BYTES);
                *l = BigEndian::read_uint(&bytes[start..end], end - start) as Limb;
                end = start;
            }
        }
        self.trim(v);
        v
    }

    /// Big-endian bytes, left-padded with zeros to exactly `len` bytes.
    pub fn save(&self, v: Num, len: usize) -> Result<Vec<u8>> {
        let limbs = self.limbs(v);
        let mut out = vec![0u8; len];
        let mut end = len;
        for l in limbs.iter() {
            if end == 0 {
                if *l != 0 {
                    return Err(Error::EncodeError {
                        reason: "value does not fit output buffer".into(),
                    });
                }
                continue;
            }
            let start = end.saturating_sub(LIMB_BYTES);
            let written = end - start;
            let keep = *l as u64 & (u64::MAX >> (64 - 8 * written));
            if keep != *l as u64 {
                return Err(Error::EncodeError {
                    reason: "value does not fit output buffer".into(),
                });
            }
            BigEndian::write_uint(&mut out[start..end], keep, written);
            end = start;
        }
        Ok(out)
    }

    /// Minimal big-endian byte representation (one `0x00` for zero).
    pub fn to_bytes(&self, v: Num) -> Vec<u8> {
        let len = (self.bit_count(v) + 7) / 8;
        // bit_count is exact, so this cannot fail.
        self.save(v, len.max(1)).unwrap_or_default()
    }

    /// Parse display-order (big-endian) hexadecimal.
    pub fn from_hex(&mut self, s: &str) -> Result<Num> {
        let digits: Vec<u8> = s
            .chars()
            .map(|c| {
                c.to_digit(16).map(|d| d as u8).ok_or(Error::ParseError {
                    reason: format!("invalid hex digit {:?}", c),
                })
            })
            .collect::<Result<_>>()?;
        if digits.is_empty() {
            return Err(Error::ParseError {
                reason: "empty hex string".into(),
            });
        }
        let mut bytes = Vec::with_capacity(digits.len() / 2 + 1);
        let mut iter = digits.iter();
        if digits.len() % 2 == 1 {
            bytes.push(*iter.next().unwrap_or(&0));
        }
        while let (Some(hi), Some(lo)) = (iter.next(), iter.next()) {
            bytes.push(hi << 4 | lo);
        }
        Ok(self.load(&bytes))
    }

    /// Display-order hexadecimal, no leading zero digits.
    pub fn to_hex(&self, v: Num) -> String {
        let bytes = self.to_bytes(v);
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in &bytes {
            s.push_str(&format!("{:02x}", b));
        }
        if s.len() > 1 && s.starts_with('0') {
            s.remove(0);
        }
        s
    }

    /// Split borrow: mutable destination slot plus one shared source slot.
    fn pair_mut(&mut self, dst: Num, src: Num) -> (&mut Slot, &Slot) {
        debug_assert_eq!(dst.owner, self.id);
        debug_assert_eq!(src.owner, self.id);
        debug_assert_ne!(dst.idx, src.idx, "aliasing destination and source");
        if dst.idx < src.idx {
            let (lo, hi) = self.slots.split_at_mut(src.idx);
            (&mut lo[dst.idx], &hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(dst.idx);
            (&mut hi[0], &lo[src.idx])
        }
    }

    /// Split borrow: mutable destination plus two shared sources, which may
    /// alias each other but never the destination.
    fn triple(&mut self, dst: Num, a: Num, b: Num) -> (&mut Slot, &Slot, &Slot) {
        debug_assert_ne!(dst.idx, a.idx);
        debug_assert_ne!(dst.idx, b.idx);
        if a.idx == b.idx {
            let (d, s) = self.pair_mut(dst, a);
            return (d, s, s);
        }
        let (lo, mid, hi) = {
            let mut order = [dst.idx, a.idx, b.idx];
            order.sort_unstable();
            let (first, rest) = self.slots.split_at_mut(order[1]);
            let (second, third) = rest.split_at_mut(order[2] - order[1]);
            (
                (order[0], &mut first[order[0]]),
                (order[1], &mut second[0]),
                (order[2], &mut third[0]),
            )
        };
        let mut d: Option<&mut Slot> = None;
        let mut s1: Option<&mut Slot> = None;
        let mut s2: Option<&mut Slot> = None;
        for (idx, slot) in [lo, mid, hi] {
            if idx == dst.idx {
                d = Some(slot);
            } else if idx == a.idx {
                s1 = Some(slot);
            } else {
                s2 = Some(slot);
            }
        }
        match (d, s1, s2) {
            (Some(d), Some(a), Some(b)) => (d, &*a, &*b),
            _ => unreachable!("distinct slot indices"),
        }
    }

    #[cfg(test)]
    fn released_are_wiped(&self) -> bool {
        let mut cursor = self.free_head;
        while let Some(idx) = cursor {
            let slot = &self.slots[idx];
            if slot.limbs.iter().any(|l| *l != 0) {
                return false;
            }
            cursor = slot.next_free;
        }
        true
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.limbs.zeroize();
        }
        debug_assert_eq!(self.active, 0, "arena dropped with live values");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_reuses_last_released_buffer() {
        let mut arena = Arena::new();
        let a = arena.allocate(4);
        let b = arena.allocate(4);
        let a_idx = a.idx;
        let b_idx = b.idx;
        arena.release(a);
        arena.release(b);
        assert_eq!(arena.free_count(), 2);
        // LIFO: b came back last, so it goes out first.
        let c = arena.allocate(4);
        assert_eq!(c.idx, b_idx);
        let d = arena.allocate(8);
        assert_eq!(d.idx, a_idx);
        arena.release(c);
        arena.release(d);
        assert_eq!(arena.active_count(), 0);
    }

    #[test]
    fn copy_is_shared_until_mutated() {
        let mut arena = Arena::new();
        let a = arena.from_u64(1234);
        let b = arena.copy(a);
        assert_eq!(a.idx, b.idx);
        let b = arena.make_mut(b);
        assert_ne!(a.idx, b.idx);
        assert_eq!(arena.compare(a, b), core::cmp::Ordering::Equal);
        arena.release(a);
        arena.release(b);
    }

    #[test]
    fn permanent_values_ignore_release() {
        let mut arena = Arena::new();
        let a = arena.from_u64(7);
        arena.set_permanent(a).unwrap();
        arena.release(a);
        assert_eq!(arena.active_count(), 1);
        let b = arena.copy(a);
        assert_eq!(b.idx, a.idx);
        arena.reset_permanent(a).unwrap();
        arena.release(a);
        assert_eq!(arena.active_count(), 0);
    }

    #[test]
    fn double_promotion_and_demotion_fail() {
        let mut arena = Arena::new();
        let a = arena.from_u64(7);
        let b = arena.copy(a);
        assert_eq!(arena.set_permanent(a), Err(Error::ValueShared));
        arena.release(b);
        arena.set_permanent(a).unwrap();
        assert_eq!(arena.set_permanent(a), Err(Error::ValueShared));
        arena.reset_permanent(a).unwrap();
        assert_eq!(arena.reset_permanent(a), Err(Error::ValueUnique));
        arena.release(a);
    }

    #[test]
    fn wipe_released_clears_buffers() {
        let mut arena = Arena::new();
        let a = arena.from_u64(u64::MAX);
        let b = arena.from_u64(u64::MAX / 3);
        arena.release(a);
        arena.release(b);
        assert!(!arena.released_are_wiped());
        arena.wipe_released();
        assert!(arena.released_are_wiped());
    }

    #[test]
    fn load_save_round_trip() {
        let mut arena = Arena::new();
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09];
        let v = arena.load(&bytes);
        assert_eq!(arena.save(v, 9).unwrap(), bytes);
        // Left padding.
        let padded = arena.save(v, 12).unwrap();
        assert_eq!(&padded[..3], &[0, 0, 0]);
        assert_eq!(&padded[3..], bytes);
        // Too small.
        assert!(arena.save(v, 8).is_err());
        arena.release(v);
    }

    #[test]
    fn hex_round_trip() {
        let mut arena = Arena::new();
        let v = arena.from_hex("0123456789abcdef0123").unwrap();
        assert_eq!(arena.to_hex(v), "123456789abcdef0123");
        let w = arena.from_u64(0);
        assert_eq!(arena.to_hex(w), "0");
        arena.release(v);
        arena.release(w);
    }
}
