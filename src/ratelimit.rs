//! Keyed token-bucket rate limiter, open-addressed with single-slot eviction.
//!
//! Two tables exist in the running daemon: one keyed by source IP address
//! bytes (capacity ~8191, chosen prime-ish to spread collisions), and one
//! with capacity 1 keyed by a constant, acting as a single global egress
//! bucket. Both share this implementation.
//!
//! Unlike a sliding-window limiter built for a multi-threaded proxy, this
//! table is mutated exclusively by the single-threaded packet loop (see
//! [`crate::supervisor`]), so plain `&mut self` access is correct and no
//! atomics are needed.

use ahash::RandomState;
use std::time::Instant;

/// Capacity of the per-source-address table.
pub const SOURCES_CAPACITY: usize = 8191;
/// Capacity of the single global egress-interface table.
pub const IFACES_CAPACITY: usize = 1;
/// Burst is derived from the configured steady-state rate.
pub const BURST_MULTIPLIER: f64 = 1.9;
/// Constant key used to touch the (capacity-1) interface table.
pub const IFACE_KEY: &[u8] = b"iface";

#[derive(Clone, Copy)]
struct SlotKey {
    buf: [u8; 16],
    len: u8,
}

impl SlotKey {
    fn from_bytes(key: &[u8]) -> Self {
        let mut buf = [0u8; 16];
        let len = key.len().min(16);
        buf[..len].copy_from_slice(&key[..len]);
        Self { buf, len: len as u8 }
    }

    fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }
}

#[derive(Clone, Copy)]
struct Bucket {
    occupied: bool,
    key: SlotKey,
    tokens: f64,
    last_refill_ns: u64,
}

impl Bucket {
    const EMPTY: Bucket = Bucket { occupied: false, key: SlotKey { buf: [0; 16], len: 0 }, tokens: 0.0, last_refill_ns: 0 };
}

/// A fixed-capacity, single-slot-eviction token-bucket table.
pub struct Table {
    slots: Box<[Bucket]>,
    capacity: usize,
    rate_pps: f64,
    burst: f64,
    hasher: RandomState,
    created: Instant,
}

impl Table {
    /// `burst` must be `>= rate_pps`; `capacity` should be prime-ish to
    /// reduce modulo clustering under adversarial keys.
    pub fn alloc(capacity: usize, rate_pps: f64, burst: f64) -> Self {
        assert!(capacity > 0, "rate-limit table capacity must be nonzero");
        assert!(burst >= rate_pps, "burst must be >= rate_pps");
        Self {
            slots: vec![Bucket::EMPTY; capacity].into_boxed_slice(),
            capacity,
            rate_pps,
            burst,
            hasher: RandomState::new(),
            created: Instant::now(),
        }
    }

    /// Touch the bucket for `key`, admitting or denying the event at the
    /// current monotonic time. See [`Self::touch_hash_at`] for the
    /// deterministic, testable variant.
    pub fn touch_hash(&mut self, key: &[u8]) -> bool {
        self.touch_hash_at(key, Instant::now())
    }

    /// Touch the bucket for `key` as of a caller-supplied instant.
    ///
    /// Exists so tests can drive the refill arithmetic without sleeping.
    pub fn touch_hash_at(&mut self, key: &[u8], now: Instant) -> bool {
        let slot_idx = (self.hasher.hash_one(key) as usize) % self.capacity;
        let elapsed_ns = now.saturating_duration_since(self.created).as_nanos() as u64;
        let slot = &mut self.slots[slot_idx];

        let occupant_matches = slot.occupied && slot.key.as_slice() == key;
        if !occupant_matches {
            // Eviction rule: unoccupied slot, or a different key hashed here.
            slot.occupied = true;
            slot.key = SlotKey::from_bytes(key);
            slot.tokens = self.burst;
            slot.last_refill_ns = elapsed_ns;
        } else {
            let dt_ns = elapsed_ns.saturating_sub(slot.last_refill_ns);
            let refill = self.rate_pps * (dt_ns as f64 / 1_000_000_000.0);
            slot.tokens = (slot.tokens + refill).min(self.burst);
            slot.last_refill_ns = elapsed_ns;
        }

        if slot.tokens >= 1.0 {
            slot.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Touch the bucket for a scalar key (used for the capacity-1 interface
    /// table, whose sole occupant is keyed by a constant).
    pub fn touch(&mut self, key: &[u8]) -> bool {
        self.touch_hash(key)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(table: &Table, secs: f64) -> Instant {
        table.created + Duration::from_secs_f64(secs)
    }

    #[test]
    fn first_touch_always_admits() {
        let mut t = Table::alloc(8191, 1.0, 1.9);
        assert!(t.touch_hash_at(b"10.0.0.1", at(&t, 0.0)));
    }

    #[test]
    fn burst_allows_ceil_burst_admits_immediately() {
        let mut t = Table::alloc(8191, 1.0, 1.9);
        let now = at(&t, 0.0);
        assert!(t.touch_hash_at(b"10.0.0.1", now));
        assert!(t.touch_hash_at(b"10.0.0.1", now));
        assert!(!t.touch_hash_at(b"10.0.0.1", now));
    }

    #[test]
    fn tokens_are_clamped_to_burst() {
        let mut t = Table::alloc(8191, 1.0, 1.9);
        t.touch_hash_at(b"k", at(&t, 0.0));
        // Huge elapsed time should clamp refill to burst, not overflow it.
        let admitted = t.touch_hash_at(b"k", at(&t, 10_000.0));
        assert!(admitted);
        // Immediately after, tokens should be burst - 1, still enough for one more.
        assert!(t.touch_hash_at(b"k", at(&t, 10_000.0)));
        assert!(!t.touch_hash_at(b"k", at(&t, 10_000.0)));
    }

    #[test]
    fn refill_over_time_restores_admits() {
        let mut t = Table::alloc(8191, 1.0, 1.9);
        let t0 = at(&t, 0.0);
        assert!(t.touch_hash_at(b"k", t0));
        assert!(t.touch_hash_at(b"k", t0));
        assert!(!t.touch_hash_at(b"k", t0));

        // After 1s at rate=1.0 pps, one token should have refilled.
        assert!(t.touch_hash_at(b"k", at(&t, 1.0)));
        assert!(!t.touch_hash_at(b"k", at(&t, 1.0)));
    }

    #[test]
    fn eviction_transparency_first_admit_after_collision_always_succeeds() {
        // Capacity 1 forces every key into the same slot.
        let mut t = Table::alloc(1, 1.0, 1.9);
        let t0 = at(&t, 0.0);
        assert!(t.touch_hash_at(b"victim", t0));
        assert!(t.touch_hash_at(b"victim", t0));
        assert!(!t.touch_hash_at(b"victim", t0));

        // A different key evicts victim's bucket; its first touch always admits.
        assert!(t.touch_hash_at(b"attacker", t0));
    }

    #[test]
    fn independent_keys_have_independent_buckets() {
        let mut t = Table::alloc(8191, 1.0, 1.9);
        let t0 = at(&t, 0.0);
        assert!(t.touch_hash_at(b"a", t0));
        assert!(t.touch_hash_at(b"a", t0));
        assert!(!t.touch_hash_at(b"a", t0));

        assert!(t.touch_hash_at(b"b", t0));
    }

    #[test]
    fn rate_ceiling_over_window() {
        // rate=1.0, burst=1.9 -> ceil(rate * window) + burst admits at most,
        // but in practice bounded tightly by burst since window is tiny.
        let mut t = Table::alloc(8191, 1.0, 1.9);
        let t0 = at(&t, 0.0);
        let admits = (0..100).filter(|_| t.touch_hash_at(b"flood", t0)).count();
        assert!(admits <= 2, "expected <= 2 admits for a burst of 1.9, got {admits}");
    }
}
