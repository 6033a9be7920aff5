use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Worker-side counters the render loop reads for its health log.
#[derive(Debug)]
pub struct StreamHealth {
    created: Instant,
    consecutive_failures: AtomicU32,
    forced_reconnects: AtomicU32,
    // Milliseconds after `created`, offset by one; zero means never.
    last_success_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub consecutive_failures: u32,
    pub forced_reconnects: u32,
    pub since_last_success: Option<Duration>,
}

impl HealthSnapshot {
    pub fn is_live(&self) -> bool {
        self.consecutive_failures == 0 && self.since_last_success.is_some()
    }
}

impl StreamHealth {
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            consecutive_failures: AtomicU32::new(0),
            forced_reconnects: AtomicU32::new(0),
            last_success_ms: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self) {
        let ms = self.created.elapsed().as_millis() as u64 + 1;
        self.last_success_ms.store(ms, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }

    pub fn set_failures(&self, failures: u32) {
        self.consecutive_failures.store(failures, Ordering::Release);
    }

    pub fn record_forced_reconnect(&self) {
        self.forced_reconnects.fetch_add(1, Ordering::AcqRel);
        self.consecutive_failures.store(0, Ordering::Release);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last = self.last_success_ms.load(Ordering::Acquire);
        let since_last_success = if last == 0 {
            None
        } else {
            let at = Duration::from_millis(last - 1);
            Some(self.created.elapsed().saturating_sub(at))
        };
        HealthSnapshot {
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            forced_reconnects: self.forced_reconnects.load(Ordering::Acquire),
            since_last_success,
        }
    }
}

impl Default for StreamHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_health_has_no_success() {
        let health = StreamHealth::new();
        let snap = health.snapshot();
        assert_eq!(snap.since_last_success, None);
        assert!(!snap.is_live());
    }

    #[test]
    fn success_clears_failures() {
        let health = StreamHealth::new();
        health.set_failures(4);
        assert_eq!(health.snapshot().consecutive_failures, 4);
        health.record_success();
        let snap = health.snapshot();
        assert_eq!(snap.consecutive_failures, 0);
        assert!(snap.since_last_success.is_some());
        assert!(snap.is_live());
    }

    #[test]
    fn forced_reconnects_accumulate() {
        let health = StreamHealth::new();
        health.set_failures(31);
        health.record_forced_reconnect();
        health.record_forced_reconnect();
        let snap = health.snapshot();
        assert_eq!(snap.forced_reconnects, 2);
        assert_eq!(snap.consecutive_failures, 0);
    }
}
