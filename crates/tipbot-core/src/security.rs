use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::Platform;

/// Per-user key: the same numeric id on two platforms is two different people.
pub type RateKey = (Platform, u64);

#[derive(Clone, Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// Token bucket limiter for inbound commands and button presses.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    enabled: bool,
    max_tokens: f64,
    refill_per_sec: f64,
    buckets: HashMap<RateKey, Bucket>,
    last_prune: Option<Instant>,
}

impl RateLimiter {
    pub fn new(enabled: bool, max_tokens: u32, window: Duration) -> Self {
        let max_tokens_f = max_tokens as f64;
        let window_secs = window.as_secs_f64().max(1e-9);

        Self {
            enabled,
            max_tokens: max_tokens_f,
            refill_per_sec: max_tokens_f / window_secs,
            buckets: HashMap::new(),
            last_prune: None,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 1, Duration::from_secs(1))
    }

    /// Take one token for `key`, or return how long until one is available.
    pub fn check(&mut self, key: RateKey) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&mut self, key: RateKey, now: Instant) -> Result<(), Duration> {
        if !self.enabled {
            return Ok(());
        }
        // At most one sweep per refill period keeps the map bounded by the
        // users active within roughly two periods.
        let due = self
            .last_prune
            .map_or(true, |at| now.saturating_duration_since(at) >= self.full_after());
        if due {
            self.prune_idle_at(now);
            self.last_prune = Some(now);
        }

        let bucket = self.buckets.entry(key).or_insert_with(|| Bucket {
            tokens: self.max_tokens,
            last_update: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_update).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.max_tokens);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let secs = (1.0 - bucket.tokens) / self.refill_per_sec;
        Err(Duration::from_secs_f64(secs.max(0.0)))
    }

    /// Forget buckets that have been idle long enough to be full again.
    pub fn prune_idle_at(&mut self, now: Instant) {
        let full_after = self.full_after();
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.last_update) < full_after);
    }

    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }

    fn full_after(&self) -> Duration {
        Duration::from_secs_f64(self.max_tokens / self.refill_per_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_basic_refill() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 2, Duration::from_secs(10));
        let u = (Platform::Telegram, 1);

        assert!(rl.check_at(u, start).is_ok());
        assert!(rl.check_at(u, start).is_ok());
        let wait = rl.check_at(u, start).unwrap_err();
        assert!(wait > Duration::from_secs(4) && wait <= Duration::from_secs(5));

        // 2 tokens / 10s: one token back after 5 seconds.
        assert!(rl.check_at(u, start + Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn platforms_are_limited_separately() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 1, Duration::from_secs(60));
        assert!(rl.check_at((Platform::Telegram, 9), start).is_ok());
        assert!(rl.check_at((Platform::Discord, 9), start).is_ok());
        assert!(rl.check_at((Platform::Telegram, 9), start).is_err());
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let mut rl = RateLimiter::disabled();
        for _ in 0..100 {
            assert!(rl.check((Platform::Discord, 1)).is_ok());
        }
        assert_eq!(rl.tracked(), 0);
    }

    #[test]
    fn idle_buckets_are_pruned() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 2, Duration::from_secs(10));
        rl.check_at((Platform::Telegram, 1), start).unwrap();
        rl.prune_idle_at(start + Duration::from_secs(3));
        assert_eq!(rl.tracked(), 1);
        rl.prune_idle_at(start + Duration::from_secs(11));
        assert_eq!(rl.tracked(), 0);
    }

    #[test]
    fn checks_sweep_idle_buckets_on_their_own() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 2, Duration::from_secs(10));
        for id in 0..1000 {
            rl.check_at((Platform::Discord, id), start).unwrap();
        }
        assert_eq!(rl.tracked(), 1000);

        rl.check_at((Platform::Discord, 5000), start + Duration::from_secs(11))
            .unwrap();
        assert_eq!(rl.tracked(), 1);
    }
}
