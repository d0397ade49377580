//! Outbound API calls behind a shared rate gate.
//!
//! This module provides the [`RateGate`] admission primitive and the
//! [`FetchClient`] that every outbound HTTP call goes through.
//!
//! # Features
//!
//! - One explicitly constructed gate shared by handle (no hidden global)
//! - Single-flight close/reopen per rate-limit episode
//! - Retry-After support (seconds or HTTP-date, capped at 1 hour)
//! - Bounded retry on HTTP 429, escalating to [`FetchError::Upstream`]
//!
//! # Example
//!
//! ```no_run
//! use trackbatch_core::fetch::{FetchClient, RateGate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gate = RateGate::new();
//! let api = FetchClient::new(gate.clone()).with_max_attempts(5);
//! let track = api.get_json("https://api.example.com/tracks/42", &[]).await?;
//! println!("{}", track["title"]);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
pub mod gate;

pub use client::FetchClient;
pub use error::FetchError;
pub use gate::{GateState, RateGate, parse_retry_after};
