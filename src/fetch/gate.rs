//! Process-wide rate gate shared by every outbound API call.
//!
//! This module provides the [`RateGate`] handle. While the gate is open, calls
//! pass straight through [`RateGate::await_open`]. When any call observes a
//! rate-limit response it calls [`RateGate::signal_limited`], which closes the
//! gate for everyone until the server-specified delay (plus a one second margin)
//! has elapsed.
//!
//! # Single-flight episodes
//!
//! A rate-limit episode has exactly one closer. The first signal flips the gate
//! from open to closed and arms the single reopen timer; signals arriving while
//! the gate is already closed are no-ops, so N concurrent 429 responses cost one
//! backoff interval rather than N.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use trackbatch_core::fetch::RateGate;
//!
//! # async fn example() {
//! let gate = RateGate::new();
//!
//! // Open gate: returns immediately
//! gate.await_open().await;
//!
//! // A 429 with `Retry-After: 2` closes the gate for 3 seconds
//! let closer = gate.signal_limited(Duration::from_secs(2));
//! assert!(closer);
//! gate.await_open().await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::{GATE_REOPEN_MARGIN, MAX_RETRY_AFTER};

/// Observable state of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Calls may proceed.
    Open,
    /// Calls wait until `reopen_at`.
    Closed {
        /// When the armed timer reopens the gate.
        reopen_at: Instant,
    },
}

impl GateState {
    /// Returns whether calls may proceed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Shared admission gate for outbound calls.
///
/// `RateGate` is a cheap handle: clones share the same underlying state, so one
/// gate constructed at startup is passed into every [`FetchClient`](super::FetchClient).
///
/// # Thread Safety
///
/// The state lives in a `tokio::sync::watch` channel. Closing uses
/// `send_if_modified`, which makes the open→closed transition atomic and
/// identifies the single closer of each episode.
#[derive(Debug, Clone)]
pub struct RateGate {
    inner: Arc<GateInner>,
}

#[derive(Debug)]
struct GateInner {
    state: watch::Sender<GateState>,
    /// Added to every server delay before reopening.
    margin: Duration,
    /// Number of rate-limit episodes observed.
    episodes: AtomicU64,
    /// Total time the gate has been scheduled closed (in milliseconds).
    cumulative_closed_ms: AtomicU64,
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RateGate {
    /// Creates an open gate with the default one second reopen margin.
    #[must_use]
    pub fn new() -> Self {
        Self::with_margin(GATE_REOPEN_MARGIN)
    }

    /// Creates an open gate with a custom reopen margin.
    #[must_use]
    #[instrument(skip_all, fields(margin_ms = margin.as_millis()))]
    pub fn with_margin(margin: Duration) -> Self {
        debug!("creating rate gate");
        let (state, _initial_rx) = watch::channel(GateState::Open);
        Self {
            inner: Arc::new(GateInner {
                state,
                margin,
                episodes: AtomicU64::new(0),
                cumulative_closed_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the current gate state.
    #[must_use]
    pub fn state(&self) -> GateState {
        *self.inner.state.borrow()
    }

    /// Returns whether the gate is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Returns the number of rate-limit episodes this gate has gone through.
    #[must_use]
    pub fn episodes(&self) -> u64 {
        self.inner.episodes.load(Ordering::SeqCst)
    }

    /// Returns the total time the gate has been scheduled closed.
    #[must_use]
    pub fn cumulative_closed(&self) -> Duration {
        Duration::from_millis(self.inner.cumulative_closed_ms.load(Ordering::SeqCst))
    }

    /// Suspends the caller until the gate is open.
    pub async fn await_open(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self.inner`, so the channel cannot close while we wait.
        let _ = rx.wait_for(GateState::is_open).await;
    }

    /// Closes the gate for `retry_after` plus the reopen margin.
    ///
    /// Returns `true` when this caller became the closer of a new episode and
    /// armed the reopen timer. Returns `false` when the gate was already closed;
    /// the existing episode is left untouched and the caller should simply
    /// [`await_open`](Self::await_open) again.
    ///
    /// The reopen timer runs as its own Tokio task, so cancelling the caller
    /// cannot strand the gate in the closed state. Must be called from within a
    /// Tokio runtime.
    #[instrument(skip(self), fields(retry_after_ms = retry_after.as_millis()))]
    pub fn signal_limited(&self, retry_after: Duration) -> bool {
        let closed_for = retry_after.min(MAX_RETRY_AFTER) + self.inner.margin;
        let reopen_at = Instant::now() + closed_for;

        let became_closer = self.inner.state.send_if_modified(|state| match *state {
            GateState::Open => {
                *state = GateState::Closed { reopen_at };
                true
            }
            GateState::Closed { .. } => false,
        });

        if !became_closer {
            debug!("gate already closed - joining current episode");
            return false;
        }

        let episode = self.inner.episodes.fetch_add(1, Ordering::SeqCst) + 1;
        #[allow(clippy::cast_possible_truncation)]
        let closed_ms = closed_for.as_millis() as u64;
        let cumulative_ms = self
            .inner
            .cumulative_closed_ms
            .fetch_add(closed_ms, Ordering::SeqCst)
            + closed_ms;

        warn!(
            episode,
            closed_ms,
            cumulative_ms,
            "rate limited - closing gate for all outbound calls"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep_until(reopen_at).await;
            inner.state.send_modify(|state| *state = GateState::Open);
            debug!(episode, "rate gate reopened");
        });

        true
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports two formats as per RFC 7231:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2025 07:28:00 GMT`
///
/// Returns `None` if the value cannot be parsed. Caps excessive values at 1 hour.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use trackbatch_core::fetch::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };

    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) if duration > MAX_RETRY_AFTER => {
            warn!(
                delay_secs = duration.as_secs(),
                max_secs = MAX_RETRY_AFTER.as_secs(),
                "Retry-After date exceeds maximum, capping at 1 hour"
            );
            Some(MAX_RETRY_AFTER)
        }
        Ok(duration) => Some(duration),
        Err(_) => {
            debug!(header_value, "Retry-After date is in the past, returning zero");
            Some(Duration::ZERO)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    // ==================== RateGate Tests ====================

    #[tokio::test]
    async fn test_rate_gate_starts_open() {
        tokio::time::pause();

        let gate = RateGate::new();
        assert!(gate.is_open());
        assert_eq!(gate.episodes(), 0);

        let start = Instant::now();
        gate.await_open().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_rate_gate_closes_for_retry_after_plus_margin() {
        tokio::time::pause();

        let gate = RateGate::new();
        let start = Instant::now();

        assert!(gate.signal_limited(Duration::from_secs(2)));
        assert!(!gate.is_open());

        gate.await_open().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_millis(3100));
        assert!(gate.is_open());
    }

    #[tokio::test]
    async fn test_rate_gate_concurrent_signals_single_episode() {
        tokio::time::pause();

        let gate = RateGate::new();
        let closers = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();
        let mut handles = Vec::new();

        for _ in 0..10 {
            let gate = gate.clone();
            let closers = Arc::clone(&closers);
            handles.push(tokio::spawn(async move {
                if gate.signal_limited(Duration::from_secs(2)) {
                    closers.fetch_add(1, Ordering::SeqCst);
                }
                gate.await_open().await;
                Instant::now()
            }));
        }

        for handle in handles {
            let released_at = handle.await.unwrap();
            // Everyone is released by the single reopen, not by their own timer
            assert!(released_at.duration_since(start) >= Duration::from_secs(3));
        }

        assert_eq!(closers.load(Ordering::SeqCst), 1);
        assert_eq!(gate.episodes(), 1);
        assert_eq!(gate.cumulative_closed(), Duration::from_secs(3));
        // One interval total, not ten
        assert!(start.elapsed() < Duration::from_millis(3100));
    }

    #[tokio::test]
    async fn test_rate_gate_signal_while_closed_does_not_extend() {
        tokio::time::pause();

        let gate = RateGate::new();
        let start = Instant::now();

        assert!(gate.signal_limited(Duration::from_secs(1)));
        assert!(!gate.signal_limited(Duration::from_secs(30)));

        gate.await_open().await;
        assert!(start.elapsed() < Duration::from_millis(2100));
    }

    #[tokio::test]
    async fn test_rate_gate_new_episode_after_reopen() {
        tokio::time::pause();

        let gate = RateGate::with_margin(Duration::ZERO);

        assert!(gate.signal_limited(Duration::from_secs(1)));
        gate.await_open().await;
        assert!(gate.signal_limited(Duration::from_secs(1)));
        gate.await_open().await;

        assert_eq!(gate.episodes(), 2);
        assert_eq!(gate.cumulative_closed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_rate_gate_clones_share_state() {
        tokio::time::pause();

        let gate = RateGate::new();
        let other = gate.clone();

        other.signal_limited(Duration::ZERO);
        assert!(!gate.is_open());
        assert!(matches!(gate.state(), GateState::Closed { .. }));
    }

    #[tokio::test]
    async fn test_rate_gate_caps_excessive_delay() {
        tokio::time::pause();

        let gate = RateGate::with_margin(Duration::ZERO);
        gate.signal_limited(Duration::from_secs(10 * 3600));
        assert_eq!(gate.cumulative_closed(), MAX_RETRY_AFTER);
    }

    // ==================== parse_retry_after Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_parse_retry_after_negative() {
        assert_eq!(parse_retry_after("-5"), None);
    }

    #[test]
    fn test_parse_retry_after_invalid_and_empty() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_parse_retry_after_whitespace() {
        assert_eq!(parse_retry_after("  120  "), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("7200"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_retry_after_http_date_past() {
        let past_date = "Wed, 01 Jan 2020 00:00:00 GMT";
        assert_eq!(parse_retry_after(past_date), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_http_date_future() {
        let future_time = std::time::SystemTime::now() + Duration::from_secs(60);
        let future_date = httpdate::fmt_http_date(future_time);

        let duration = parse_retry_after(&future_date).unwrap();
        assert!(
            duration >= Duration::from_secs(55) && duration <= Duration::from_secs(65),
            "Duration should be ~60s, got {duration:?}"
        );
    }
}
