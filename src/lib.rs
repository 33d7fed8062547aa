//! # billedhenter
//!
//! Backend library for bulk image retrieval from the ICRT product catalog.
//!
//! Feed it a spreadsheet (or pasted text) of product identifiers and it
//! resolves each one against the catalog API with bounded concurrency, a
//! shared rate limit and retries, then hands back a zip archive of the
//! images plus a per-row status report.
//!
//! ## Design Philosophy
//!
//! billedhenter is designed to be:
//! - **One-shot** - Each run is self-contained; nothing persists between runs
//! - **Total** - Every input row gets exactly one report row, whatever happens
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to progress events, no polling
//!
//! ## Quick Start
//!
//! ```no_run
//! use billedhenter::{Config, HttpIcrtClient, Pipeline, PipelineInput};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let client = HttpIcrtClient::authenticate(
//!         "https://api.example.com/",
//!         "client-id",
//!         "client-key",
//!         config.per_call_timeout,
//!     )
//!     .await?;
//!
//!     let pipeline = Pipeline::new(config)?;
//!     let bytes = std::fs::read("priser.xlsx")?;
//!     let bundle = pipeline
//!         .run(
//!             PipelineInput::File { filename: "priser.xlsx", bytes: &bytes },
//!             Arc::new(client),
//!         )
//!         .await?;
//!
//!     std::fs::write("billeder.zip", &bundle.archive_bytes)?;
//!     println!("{}", bundle.report_json()?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog API client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Concurrent record resolution
pub mod orchestrator;
/// Archive and report assembly
pub mod packager;
/// Pipeline entry point
pub mod pipeline;
/// Shared API call throttling
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Spreadsheet and text input parsing
pub mod spreadsheet;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use client::{ClientError, HttpIcrtClient, IcrtClient};
pub use config::{Config, RateLimitConfig, RetryConfig};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineInput, run_pipeline};
pub use rate_limiter::RateLimiter;
pub use retry::{IsRetryable, RetryError, with_retry};
pub use spreadsheet::SpreadsheetReader;
pub use types::{
    FetchOutcome, FetchSession, IdentifierRecord, ImageReference, PipelineEvent, ReportRow,
    ResultBundle, RowStatus,
};
