//! # cadence-realtime
//!
//! The resilient real-time channel:
//!
//! - **Frames**: [`InboundFrame`] tagged union and [`OutboundFrame`]
//! - **Router**: [`MessageRouter`] parses raw frames and dispatches to a [`FrameHandler`]
//! - **Connection Manager**: [`ConnectionManager`] keeps one transport per
//!   [`SessionKey`](cadence_core::SessionKey) with bounded fixed-delay reconnects
//! - **Transcript**: streaming assistant replies folded into chat turns
//! - **Hub**: [`ChannelHub`] ties routed frames to [`SessionView`]s and the
//!   notification sink

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod frame;
pub mod hub;
pub mod router;
pub mod transcript;

pub use connection::{
    ChannelConfig, ChannelEvent, ConnectionManager, ConnectionState, Connector, Transport,
    TransportEvent, WsConnector,
};
pub use errors::{RealtimeError, Result};
pub use frame::{InboundFrame, OutboundFrame};
pub use hub::{AnalysisOutcome, ChannelHub, HubEvent, SessionView};
pub use router::{FrameHandler, MessageRouter, RouteOutcome};
pub use transcript::{ChatMessage, ChatRole, Transcript};
