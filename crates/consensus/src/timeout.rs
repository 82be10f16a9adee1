//! Timeout handling for view-change coordination.
//!
//! This module provides:
//! - [`TimeoutConfig`] - liveness and agreement timeouts
//! - [`TimeoutScheduler`] - spawns timers and delivers [`TimeoutInfo`] events
//! - [`BackoffMode`] - Linear or exponential growth of agreement timeouts
//!
//! Agreement timeouts grow with the view-change counter so that a committee
//! that keeps failing under network delay eventually waits long enough for
//! proposals to arrive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Backoff strategy for agreement timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffMode {
    /// Linear backoff: timeout = base + delta * attempt
    #[default]
    Linear,
    /// Exponential backoff: timeout = base * 2^min(attempt, max_exponent)
    Exponential {
        /// Maximum exponent to prevent overflow (typically 5-8)
        max_exponent: u32,
    },
}

impl BackoffMode {
    /// Exponential backoff with a max exponent of 6 (64x multiplier)
    pub fn exponential() -> Self {
        BackoffMode::Exponential { max_exponent: 6 }
    }

    /// Exponential backoff with a custom max exponent
    pub fn exponential_with_cap(max_exponent: u32) -> Self {
        BackoffMode::Exponential { max_exponent }
    }
}

/// Which wait expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// No progress from the primary round while monitoring
    Liveness,
    /// No agreement on the current candidate
    Agreement,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutKind::Liveness => write!(f, "liveness"),
            TimeoutKind::Agreement => write!(f, "agreement"),
        }
    }
}

/// Timeout event sent to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutInfo {
    /// The wait that expired
    pub kind: TimeoutKind,
    /// Coordinator generation when scheduled; stale generations are ignored
    pub generation: u64,
    /// View-change counter when scheduled
    pub counter: u32,
}

/// Configuration for view-change timeouts
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// How long the primary round may go without progress
    pub liveness: Duration,

    /// Agreement timeout of the first attempt
    pub agreement_base: Duration,
    /// Additional duration per attempt (linear backoff)
    pub agreement_delta: Duration,

    /// Cap on any timeout after backoff and jitter
    pub max_timeout: Duration,

    /// Backoff mode (linear or exponential)
    pub backoff_mode: BackoffMode,

    /// Random jitter fraction (0.0 to 0.5)
    ///
    /// Spreads timers so committee members do not all fire in lockstep.
    pub jitter_percent: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            liveness: Duration::from_millis(10_000),
            agreement_base: Duration::from_millis(3_000),
            agreement_delta: Duration::from_millis(1_000),
            max_timeout: Duration::from_secs(60),
            backoff_mode: BackoffMode::Linear,
            jitter_percent: 0.10,
        }
    }
}

impl TimeoutConfig {
    /// Create a configuration with linear backoff.
    pub fn new(liveness: Duration, agreement_base: Duration, agreement_delta: Duration) -> Self {
        Self {
            liveness,
            agreement_base,
            agreement_delta,
            ..Self::default()
        }
    }

    /// Exponential backoff for networks with unknown delay bounds
    pub fn partial_synchrony() -> Self {
        Self {
            backoff_mode: BackoffMode::exponential(),
            ..Self::default()
        }
    }

    /// Create a fast configuration for testing and simulation
    pub fn fast() -> Self {
        Self {
            liveness: Duration::from_millis(200),
            agreement_base: Duration::from_millis(150),
            agreement_delta: Duration::from_millis(50),
            max_timeout: Duration::from_secs(5),
            backoff_mode: BackoffMode::Linear,
            jitter_percent: 0.10,
        }
    }

    /// Set the backoff mode
    pub fn with_backoff_mode(mut self, mode: BackoffMode) -> Self {
        self.backoff_mode = mode;
        self
    }

    /// Set the jitter fraction, clamped to 0-50%
    pub fn with_jitter(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 0.5);
        self
    }

    /// Liveness timeout.
    pub fn liveness_timeout(&self) -> Duration {
        self.apply_jitter(self.liveness).min(self.max_timeout)
    }

    /// Agreement timeout for view-change `counter` (starting at 1).
    pub fn agreement_timeout(&self, counter: u32) -> Duration {
        let attempt = counter.saturating_sub(1);
        let raw = match self.backoff_mode {
            BackoffMode::Linear => self
                .agreement_base
                .saturating_add(self.agreement_delta.saturating_mul(attempt)),
            BackoffMode::Exponential { max_exponent } => {
                let exponent = attempt.min(max_exponent).min(31);
                self.agreement_base.saturating_mul(1u32 << exponent)
            }
        };
        self.apply_jitter(raw).min(self.max_timeout)
    }

    /// Timeout of `kind` at `counter`.
    pub fn timeout_for(&self, kind: TimeoutKind, counter: u32) -> Duration {
        match kind {
            TimeoutKind::Liveness => self.liveness_timeout(),
            TimeoutKind::Agreement => self.agreement_timeout(counter),
        }
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.jitter_percent <= 0.0 {
            return duration;
        }
        let mut rng = rand::thread_rng();
        let multiplier = 1.0 + rng.gen::<f64>() * self.jitter_percent;
        Duration::from_secs_f64(duration.as_secs_f64() * multiplier)
    }
}

/// Spawns timers and delivers [`TimeoutInfo`] when they expire.
///
/// Raising the generation cancels every timer scheduled under an older one.
pub struct TimeoutScheduler {
    timeout_tx: mpsc::Sender<TimeoutInfo>,
    generation: Arc<AtomicU64>,
    pending: Arc<Mutex<Vec<TimeoutInfo>>>,
}

impl TimeoutScheduler {
    /// Create a scheduler delivering to `timeout_tx`.
    pub fn new(timeout_tx: mpsc::Sender<TimeoutInfo>) -> Self {
        Self {
            timeout_tx,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Drop every timer older than `generation`.
    pub fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::SeqCst);
        self.pending.lock().retain(|t| t.generation >= generation);
    }

    /// Deliver `info` after `duration`, unless its generation is superseded.
    pub fn schedule(&self, info: TimeoutInfo, duration: Duration) {
        self.set_generation(info.generation.max(self.generation.load(Ordering::SeqCst)));

        debug!(
            kind = %info.kind,
            generation = info.generation,
            counter = info.counter,
            duration_ms = duration.as_millis() as u64,
            "Scheduling timeout"
        );
        self.pending.lock().push(info);

        let timeout_tx = self.timeout_tx.clone();
        let generation = self.generation.clone();
        let pending = self.pending.clone();

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;

            let live = {
                let mut pending = pending.lock();
                let live = generation.load(Ordering::SeqCst) == info.generation
                    && pending.contains(&info);
                pending.retain(|t| t != &info);
                live
            };

            if live {
                trace!(
                    kind = %info.kind,
                    generation = info.generation,
                    counter = info.counter,
                    "Timeout fired"
                );
                let _ = timeout_tx.send(info).await;
            }
        });
    }

    /// Cancel all pending timers.
    pub fn cancel_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().clear();
    }

    /// Number of timers that have not fired or been cancelled.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
