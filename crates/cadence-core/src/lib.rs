//! # cadence-core
//!
//! Foundation types shared by every Cadence crate:
//!
//! - **Branded IDs**: [`SessionKey`], [`NotificationId`], [`MessageId`] as newtypes
//! - **Constants**: package identity and the default timings of the real-time
//!   channel and status poller
//! - **Logging**: `tracing` subscriber setup and an in-memory capture layer for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod logging;

pub use ids::{MessageId, NotificationId, SessionKey};
