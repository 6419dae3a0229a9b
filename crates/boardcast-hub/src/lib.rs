//! # boardcast-hub
//!
//! In-process real-time broadcast hub for a task-board service.
//!
//! The hub tracks live client connections, groups them by the boards they
//! watch, fans outbound events out to the right subset, and evicts dead
//! connections through an application-level heartbeat and an inactivity
//! sweep. It never touches sockets: each connection is an
//! `Arc<dyn Transport>` supplied by the caller.
//!
//! ```text
//! board service ──► Hub::broadcast_to_board ──► Transport::send (per client)
//! client frame  ──► Hub::handle_client_message (subscribe / ping / heartbeat_response)
//! ```

#![deny(unsafe_code)]

pub mod broadcast;
mod cleanup;
pub mod config;
pub mod errors;
mod heartbeat;
pub mod hub;
pub mod ids;
pub mod message;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod subscriptions;
mod tasks;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcast::BatchReport;
pub use config::HubConfig;
pub use errors::HubError;
pub use hub::Hub;
pub use ids::{BoardId, ConnectionId};
pub use message::OutboundMessage;
pub use protocol::{ClientMessage, ProtocolError};
pub use registry::{ConnectionSnapshot, ConnectionStats, EvictionReason};
pub use subscriptions::BoardSubscriptions;
pub use transport::{ChannelTransport, OutboundFrame, Transport, TransportError};
