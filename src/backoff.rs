//! Exponential backoff with full jitter
//!
//! A [`Backoff`] tracks the attempts and cumulative wait of one logical batch
//! call. Each [`Backoff::advance`] draws a wait uniformly from
//! `[0, base * 2^attempt)` and sleeps for it, clamping the last sleep so the
//! cumulative wait lands exactly on the cap. Once the cap has been reached the
//! next call reports [`Exhausted`] without sleeping.

use rand::Rng;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;

/// Immutable backoff parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    base_ms: u64,
    cap_ms: u64,
}

impl BackoffConfig {
    /// 50 ms base wait, 1 minute cumulative cap
    pub const DEFAULT: BackoffConfig = BackoffConfig {
        base_ms: 50,
        cap_ms: 60_000,
    };

    /// Create a configuration
    ///
    /// Both durations are truncated to whole milliseconds, saturating at
    /// `u64::MAX`. See [`BackoffConfig::from_millis`] for the base clamp.
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self::from_millis(saturating_millis(base), saturating_millis(cap))
    }

    /// Create a configuration from millisecond values
    ///
    /// The base is clamped to at least one millisecond so the jitter bound keeps
    /// growing and the cap is always reached eventually.
    pub const fn from_millis(base_ms: u64, cap_ms: u64) -> Self {
        Self {
            base_ms: if base_ms == 0 { 1 } else { base_ms },
            cap_ms,
        }
    }

    /// Base wait
    pub const fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    /// Cap on the cumulative wait of one logical call
    pub const fn cap(&self) -> Duration {
        Duration::from_millis(self.cap_ms)
    }
}

const fn saturating_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    if millis > u64::MAX as u128 {
        u64::MAX
    } else {
        millis as u64
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The retry budget of a logical call is spent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Exhausted {
    /// Attempts made before exhaustion
    pub attempts: u32,
    /// Cumulative wait, equal to the cap
    pub elapsed: Duration,
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backoff exhausted after {} attempts ({:?})",
            self.attempts, self.elapsed
        )
    }
}

impl std::error::Error for Exhausted {}

/// Backoff state of one logical batch call
///
/// Not shared between concurrent calls; every in-flight call owns its own.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    elapsed_ms: u64,
    exhausted: bool,
}

impl Backoff {
    /// Fresh state for the given configuration
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempt: 0,
            elapsed_ms: 0,
            exhausted: false,
        }
    }

    /// Configuration this state was created with
    pub fn config(&self) -> BackoffConfig {
        self.config
    }

    /// Attempts made since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Cumulative wait since the last reset
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Whether the cap has been hit
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Wait before the next attempt
    ///
    /// Returns the wait actually performed, or [`Exhausted`] without sleeping
    /// when the cumulative wait already equals the cap.
    pub async fn advance(&mut self) -> Result<Duration, Exhausted> {
        let wait = self.next_wait(&mut rand::thread_rng())?;
        if !wait.is_zero() {
            sleep(wait).await;
        }
        Ok(wait)
    }

    /// Compute and record the next wait without sleeping
    pub fn next_wait<R: Rng>(&mut self, rng: &mut R) -> Result<Duration, Exhausted> {
        if self.elapsed_ms >= self.config.cap_ms {
            self.exhausted = true;
            return Err(Exhausted {
                attempts: self.attempt,
                elapsed: self.elapsed(),
            });
        }

        self.attempt = self.attempt.saturating_add(1);
        let upper = self.upper_bound_ms();
        let candidate = if upper == 0 {
            0
        } else {
            rng.gen_range(0..upper)
        };

        let wait = if self.elapsed_ms.saturating_add(candidate) > self.config.cap_ms {
            let remaining = self.config.cap_ms - self.elapsed_ms;
            self.elapsed_ms = self.config.cap_ms;
            remaining
        } else {
            self.elapsed_ms += candidate;
            candidate
        };

        Ok(Duration::from_millis(wait))
    }

    /// Zero the counters after a logical call fully drained its unprocessed set
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.elapsed_ms = 0;
        self.exhausted = false;
    }

    /// Exclusive upper bound of the jitter range for the current attempt
    fn upper_bound_ms(&self) -> u64 {
        1u64.checked_shl(self.attempt)
            .map_or(u64::MAX, |factor| self.config.base_ms.saturating_mul(factor))
    }
}
