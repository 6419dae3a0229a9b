//! # boardcast-server
//!
//! Axum HTTP + `WebSocket` adapter for the boardcast hub.
//!
//! - `GET /ws?client_id=&user=`: upgrade, register with the hub, pump frames
//! - `GET /health`: liveness and connection count
//! - `GET /api/realtime/stats`: per-connection statistics
//! - `GET /metrics`: Prometheus text
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, BoardcastServer};
pub use shutdown::ShutdownCoordinator;
