//! Trackbatch Core Library
//!
//! This library fetches a batch of remotely hosted tracks concurrently,
//! tolerates per-item failure, and packages everything that succeeded into a
//! single downloadable archive.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - Rate gate and JSON API client shared by all outbound calls
//! - [`item`] - Batch items, request descriptors, and archive-safe names
//! - [`pool`] - Bounded worker pool and the external media fetcher
//! - [`matcher`] - Reconciles fetch tool output with the requested item
//! - [`aggregate`] - Success/failure partition and archive entry naming
//! - [`archive`] - Deterministic ZIP packaging
//! - [`storage`] - Object store handoff and API credentials
//! - [`resolve`] - Optional track metadata lookup
//! - [`orchestrator`] - End-to-end batch state machine
//! - [`config`] - Batch settings and the TOML config file

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregate;
pub mod archive;
pub mod config;
mod error;
pub mod fetch;
pub mod item;
pub mod matcher;
pub mod orchestrator;
pub mod pool;
pub mod resolve;
pub mod response;
pub mod storage;
mod user_agent;

// Re-export commonly used types
pub use aggregate::{ArchiveEntry, Manifest};
pub use archive::ArchiveError;
pub use config::{BatchSettings, ConfigError, FileConfig, RetrySettings};
pub use error::BatchError;
pub use fetch::{FetchClient, FetchError, RateGate};
pub use item::{BatchRequest, Item, ItemDescriptor, safe_name};
pub use orchestrator::{BatchOrchestrator, BatchReport, BatchState};
pub use pool::{CommandFetcher, FetchOutcome, ItemFailure, MediaFetcher, WorkerPool, Workspace};
pub use resolve::MetadataResolver;
pub use response::{BatchResponse, ErrorResponse};
pub use storage::{
    CredentialError, CredentialProvider, EnvCredentialProvider, LocalObjectStore, ObjectStore,
    StorageError,
};
