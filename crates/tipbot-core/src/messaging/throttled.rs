use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{messaging::port::DirectMessenger, Result};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two direct messages.
    pub global_min_interval: Duration,
    /// Minimum spacing between direct messages to the same recipient.
    pub per_recipient_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_recipient_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return how long to wait before using it.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// Per-recipient windows, swept once per interval.
#[derive(Debug)]
struct Recipients {
    limiters: HashMap<u64, Arc<Mutex<IntervalLimiter>>>,
    next_sweep: Instant,
}

impl Recipients {
    /// Drop windows that have already closed and that no send is holding.
    fn sweep(&mut self, now: Instant, every: Duration) {
        if now < self.next_sweep {
            return;
        }
        self.limiters.retain(|_, lim| {
            Arc::strong_count(lim) > 1 || lim.try_lock().map_or(true, |l| l.next > now)
        });
        self.next_sweep = now + every;
    }
}

/// DirectMessenger decorator that spaces out notifications.
///
/// A burst of tips to one popular recipient would otherwise trip platform flood limits.
pub struct ThrottledMessenger {
    inner: Arc<dyn DirectMessenger>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_recipient: Mutex<Recipients>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn DirectMessenger>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_recipient: Mutex::new(Recipients {
                limiters: HashMap::new(),
                next_sweep: Instant::now(),
            }),
        }
    }

    async fn limiter_for(&self, native_id: u64) -> Arc<Mutex<IntervalLimiter>> {
        let mut recipients = self.per_recipient.lock().await;
        recipients.sweep(Instant::now(), self.cfg.per_recipient_min_interval);
        recipients
            .limiters
            .entry(native_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_recipient_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle(&self, native_id: u64) {
        let global_wait = { self.global.lock().await.reserve() };
        let recipient_wait = {
            let lim = self.limiter_for(native_id).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(recipient_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl DirectMessenger for ThrottledMessenger {
    async fn send_direct(&self, native_id: u64, text: &str) -> Result<()> {
        self.throttle(native_id).await;
        self.inner.send_direct(native_id, text).await
    }
}
