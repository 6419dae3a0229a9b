//! `GET /ws` upgrade admission.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use serde::Deserialize;
use tracing::warn;

use super::session::run_ws_session;
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::server::AppState;

/// Query parameters accepted on the upgrade request.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Connection id chosen by the client. A new id is generated if absent.
    pub client_id: Option<String>,
    /// Free-form user label shown in connection stats.
    pub user: Option<String>,
}

/// Why an upgrade was refused before the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Accept the upgrade.
    Accept,
    /// The server is shutting down.
    ShuttingDown,
    /// `max_connections` is reached.
    Full,
}

/// Decide whether a new connection may be accepted.
///
/// The count is read without reserving a slot, so a burst of simultaneous
/// upgrades can overshoot the limit by the size of the burst.
pub fn admit(state: &AppState) -> Admission {
    if state.shutdown.is_shutting_down() {
        Admission::ShuttingDown
    } else if state.hub.count() >= state.config.max_connections {
        Admission::Full
    } else {
        Admission::Accept
    }
}

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    match admit(&state) {
        Admission::Accept => {}
        Admission::ShuttingDown => {
            return (StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response();
        }
        Admission::Full => {
            counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
            warn!(
                max_connections = state.config.max_connections,
                client_id = ?params.client_id,
                "connection limit reached, rejecting upgrade"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
        }
    }

    let max_message_size = state.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, params, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use boardcast_hub::{ChannelTransport, Hub, HubConfig};

    use crate::config::ServerConfig;
    use crate::shutdown::ShutdownCoordinator;

    fn state(max_connections: usize) -> AppState {
        AppState {
            hub: Arc::new(Hub::new(HubConfig::default())),
            config: Arc::new(ServerConfig {
                max_connections,
                ..ServerConfig::default()
            }),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    #[test]
    fn params_deserialize_from_query() {
        let params: ConnectParams =
            serde_json::from_value(serde_json::json!({"client_id": "tab-1", "user": "ann"}))
                .unwrap();
        assert_eq!(params.client_id.as_deref(), Some("tab-1"));
        assert_eq!(params.user.as_deref(), Some("ann"));
    }

    #[test]
    fn params_are_optional() {
        let params: ConnectParams = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(params.client_id.is_none());
        assert!(params.user.is_none());
    }

    #[test]
    fn admits_below_limit() {
        assert_eq!(admit(&state(2)), Admission::Accept);
    }

    #[tokio::test]
    async fn refuses_at_limit() {
        let state = state(1);
        let (transport, _rx) = ChannelTransport::new(4, Duration::from_secs(1));
        let _ = state.hub.register(Arc::new(transport), None, None);
        assert_eq!(admit(&state), Admission::Full);
        state.hub.shutdown(Duration::from_secs(1)).await;
    }

    #[test]
    fn refuses_during_shutdown() {
        let state = state(10);
        state.shutdown.shutdown();
        assert_eq!(admit(&state), Admission::ShuttingDown);
    }
}
