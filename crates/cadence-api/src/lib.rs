//! # cadence-api
//!
//! HTTP side of the Cadence client:
//!
//! - [`ApiClient`]: `GET {base}/analysis/{id}` and multipart `POST {base}/upload`
//! - [`StatusPoller`]: fixed-interval polling until a terminal status
//! - [`watch_analysis`]: posts a notification when an analysis finishes

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod poller;
pub mod types;
pub mod watch;

pub use client::ApiClient;
pub use errors::{ApiError, Result};
pub use poller::{PollEvent, PollOptions, PollSubscription, StatusPoller, StatusSource};
pub use types::{AnalysisRecord, AnalysisStatus, UploadReceipt};
pub use watch::{WatchOutcome, analysis_notification, watch_analysis};
