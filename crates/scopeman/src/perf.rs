// perf.rs - Timing and engine traffic counters
//
// Timing logs are off unless SCOPEMAN_PERF is set.
//
// Usage:
//   SCOPEMAN_PERF=1 scopeman --stdio        # [PERF] timing logs
//   SCOPEMAN_PERF=verbose scopeman --stdio  # also warn on slow operations

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PERF_ENABLED: OnceLock<bool> = OnceLock::new();
static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

static MESSAGES_SENT: AtomicU64 = AtomicU64::new(0);
static MESSAGES_RECEIVED: AtomicU64 = AtomicU64::new(0);
static RESPONSES_DROPPED: AtomicU64 = AtomicU64::new(0);

pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("SCOPEMAN_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("SCOPEMAN_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// Logs how long a scope took when dropped.
///
/// ```
/// use scopeman::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("request_hints");
/// // Duration logged when _guard goes out of scope
/// ```
pub struct TimingGuard {
    start: Instant,
    name: &'static str,
    threshold_warn_ms: Option<u64>,
    enabled: bool,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: None,
            enabled: is_enabled(),
        }
    }

    /// In verbose mode, also warn when the scope runs past `threshold_ms`.
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        Self {
            threshold_warn_ms: Some(threshold_ms),
            ..Self::new(name)
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timing without logging.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        std::mem::forget(self);
        elapsed
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        log::info!("[PERF] {} completed in {:?}", self.name, elapsed);

        if let Some(threshold) = self.threshold_warn_ms {
            if elapsed.as_millis() > threshold as u128 && is_verbose() {
                log::warn!(
                    "[PERF] {} exceeded threshold ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    threshold
                );
            }
        }
    }
}

pub fn record_sent() {
    MESSAGES_SENT.fetch_add(1, Ordering::Relaxed);
}

pub fn record_received() {
    MESSAGES_RECEIVED.fetch_add(1, Ordering::Relaxed);
}

/// A completion reply arrived with nobody waiting for it.
pub fn record_dropped() {
    RESPONSES_DROPPED.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time copy of the engine traffic counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineCounters {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
}

pub fn counters() -> EngineCounters {
    EngineCounters {
        sent: MESSAGES_SENT.load(Ordering::Relaxed),
        received: MESSAGES_RECEIVED.load(Ordering::Relaxed),
        dropped: RESPONSES_DROPPED.load(Ordering::Relaxed),
    }
}

pub fn log_summary() {
    if !is_enabled() {
        return;
    }
    let c = counters();
    log::info!("[PERF] Engine traffic summary:");
    log::info!("  Messages sent: {}", c.sent);
    log::info!("  Messages received: {}", c.received);
    log::info!("  Unmatched replies dropped: {}", c.dropped);
}
