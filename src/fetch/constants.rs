//! Constants for the fetch module (timeouts, rate limiting, retry bounds).

use std::time::Duration;

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (30 seconds; API calls return small JSON bodies).
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Delay used when a 429 response carries no usable Retry-After header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Extra time the gate stays closed beyond the server-provided delay.
pub const GATE_REOPEN_MARGIN: Duration = Duration::from_secs(1);

/// Default maximum attempts for a single call (initial attempt included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
