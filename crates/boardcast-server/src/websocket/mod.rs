//! WebSocket upgrade admission and per-connection session loop.

pub mod handler;
pub mod session;
