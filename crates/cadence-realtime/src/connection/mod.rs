//! Connection Manager: one resilient transport per session key.
//!
//! - [`state`]: lifecycle states and the published [`ChannelEvent`]s
//! - [`transport`]: the [`Connector`]/[`Transport`] seam and the WebSocket implementation
//! - [`manager`]: per-key workers with bounded fixed-delay reconnects

pub mod manager;
pub mod state;
pub mod transport;

pub use manager::{ChannelConfig, ConnectionManager};
pub use state::{ChannelEvent, ConnectionState};
pub use transport::{Connector, Transport, TransportEvent, WsConnector, WsTransport};
