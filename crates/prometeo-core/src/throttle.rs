//! Token-Bucket Throttle (§4.1): rate-limits bytes passing from the HTTP
//! response into a part file.
//!
//! The bucket math is original, grounded directly on §4.1's description.
//! The `acquire` naming and "one Throttle shared across concurrent readers"
//! shape is grounded on `RateLimiter::acquire` in
//! `other_examples/7480e512_novincode-dlman__.../segment_worker.rs.rs`
//! (`self.rate_limiter.acquire(chunk_len).await`).
//!
//! A Worker's GET runs inside `spawn_blocking` (§5), so `acquire_blocking` is
//! the entry point actually used on the hot path; the async `acquire` exists
//! for callers on the executor (tests, the Coordinator's own bookkeeping).

use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Bucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
    }
}

/// A shared rate limiter: `bucket_size = R`, `refill = R` tokens/second.
/// Cloning shares the same underlying bucket (`Arc`-style via an inner
/// `Mutex`), so every Worker throttled by one Coordinator draws from a
/// single pool when constructed from the same `Throttle`.
pub struct Throttle {
    bucket: Mutex<Bucket>,
}

impl Throttle {
    /// Creates a Throttle at `rate_bps` bytes/second. Panics if `rate_bps`
    /// is 0 — §4.1 states a rate of 0 is not valid, and callers are expected
    /// to validate before construction (this mirrors `assert!` elsewhere in
    /// this crate for programmer-error invariants, not caller input).
    pub fn new(rate_bps: u64) -> Self {
        assert!(rate_bps > 0, "throttle rate must be > 0");
        let rate = rate_bps as f64;
        Throttle {
            bucket: Mutex::new(Bucket {
                capacity: rate,
                refill_per_sec: rate,
                tokens: rate,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Atomically replaces both bucket capacity and refill rate (§4.1).
    /// Bytes already admitted by a prior `acquire` are never revoked; this
    /// only changes capacity/refill going forward.
    pub fn set_rate(&self, rate_bps: u64) -> Result<(), &'static str> {
        if rate_bps == 0 {
            return Err("rate must be > 0");
        }
        let rate = rate_bps as f64;
        let mut bucket = self.bucket.lock().unwrap();
        bucket.refill();
        bucket.capacity = rate;
        bucket.refill_per_sec = rate;
        bucket.tokens = bucket.tokens.min(rate);
        Ok(())
    }

    /// Blocks the current (OS) thread until `bytes` tokens are available,
    /// then admits them. Intended for use inside `spawn_blocking`, where an
    /// async `.await` would violate §5's "no blocking I/O on the executor"
    /// by inverting it (nothing here touches the executor at all).
    pub fn acquire_blocking(&self, bytes: u64) {
        let bytes = bytes as f64;
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().unwrap();
                bucket.refill();
                if bucket.tokens >= bytes {
                    bucket.tokens -= bytes;
                    return;
                }
                let deficit = bytes - bucket.tokens;
                Duration::from_secs_f64((deficit / bucket.refill_per_sec).max(0.001))
            };
            std::thread::sleep(wait);
        }
    }

    /// Async counterpart of `acquire_blocking`, for callers already on the
    /// executor (tests, non-Worker code paths).
    pub async fn acquire(&self, bytes: u64) {
        let bytes = bytes as f64;
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().unwrap();
                bucket.refill();
                if bucket.tokens >= bytes {
                    bucket.tokens -= bytes;
                    return;
                }
                let deficit = bytes - bucket.tokens;
                Duration::from_secs_f64((deficit / bucket.refill_per_sec).max(0.001))
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "throttle rate must be > 0")]
    fn zero_rate_is_invalid() {
        Throttle::new(0);
    }

    #[test]
    fn set_rate_rejects_zero() {
        let throttle = Throttle::new(1000);
        assert!(throttle.set_rate(0).is_err());
    }

    #[test]
    fn acquire_blocking_admits_up_to_capacity_immediately() {
        let throttle = Throttle::new(1000);
        let start = Instant::now();
        throttle.acquire_blocking(1000);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn acquire_blocking_waits_for_refill_beyond_capacity() {
        let throttle = Throttle::new(1000);
        throttle.acquire_blocking(1000);
        let start = Instant::now();
        throttle.acquire_blocking(500);
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn set_rate_changes_future_refill_without_revoking_admitted_bytes() {
        let throttle = Throttle::new(1000);
        throttle.acquire(1000).await;
        throttle.set_rate(2000).unwrap();
        let start = Instant::now();
        throttle.acquire(2000).await;
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
