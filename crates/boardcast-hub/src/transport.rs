//! Transport seam between the hub and a client's socket.
//!
//! The hub never touches sockets. It holds an `Arc<dyn Transport>` per
//! connection and only ever calls [`Transport::send`] and
//! [`Transport::close`]. A send either completes or fails; the caller
//! decides what a failure means.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;

/// Why a send did not reach the client's outbound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The client's writer is gone (socket closed or broken).
    #[error("transport closed")]
    Closed,
    /// The client's buffer stayed full for the whole send timeout.
    #[error("send timed out")]
    TimedOut,
}

/// Send/close handle for one client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one serialized frame.
    async fn send(&self, frame: Arc<str>) -> Result<(), TransportError>;

    /// Ask the client side to close. Must not block.
    fn close(&self);
}

/// Frame handed to a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A serialized envelope.
    Text(Arc<str>),
    /// Close the socket and stop writing.
    Close,
}

/// [`Transport`] backed by a bounded mpsc channel.
///
/// The receiving half is drained by whatever owns the socket (the WebSocket
/// session's writer task). Dropping the receiver makes every later send fail
/// with [`TransportError::Closed`].
///
/// `close` also cancels a token, see [`close_signal`](Self::close_signal).
/// The token fires even when the buffer is full.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::Sender<OutboundFrame>,
    send_timeout: Duration,
    closed: CancellationToken,
}

impl ChannelTransport {
    /// Create a transport and the receiver its writer drains.
    pub fn new(capacity: usize, send_timeout: Duration) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            tx,
            send_timeout,
            closed: CancellationToken::new(),
        };
        (transport, rx)
    }

    /// Token cancelled by [`Transport::close`]. The socket owner should stop
    /// writing and drop the socket once it fires.
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, frame: Arc<str>) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.tx
            .send_timeout(OutboundFrame::Text(frame), self.send_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => TransportError::TimedOut,
                SendTimeoutError::Closed(_) => TransportError::Closed,
            })
    }

    fn close(&self) {
        self.closed.cancel();
        // Best effort: a full buffer drops the close frame.
        let _ = self.tx.try_send(OutboundFrame::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[tokio::test]
    async fn send_reaches_receiver() {
        let (transport, mut rx) = ChannelTransport::new(4, Duration::from_secs(1));
        transport.send(frame("hello")).await.unwrap();
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text(frame("hello"))));
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_is_closed() {
        let (transport, rx) = ChannelTransport::new(4, Duration::from_secs(1));
        drop(rx);
        assert_eq!(
            transport.send(frame("x")).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_to_full_buffer_times_out() {
        let (transport, _rx) = ChannelTransport::new(1, Duration::from_millis(50));
        transport.send(frame("first")).await.unwrap();
        assert_eq!(
            transport.send(frame("second")).await,
            Err(TransportError::TimedOut)
        );
    }

    #[tokio::test]
    async fn close_enqueues_close_frame() {
        let (transport, mut rx) = ChannelTransport::new(4, Duration::from_secs(1));
        transport.close();
        assert_eq!(rx.recv().await, Some(OutboundFrame::Close));
    }

    #[tokio::test]
    async fn close_on_full_buffer_does_not_block() {
        let (transport, mut rx) = ChannelTransport::new(1, Duration::from_secs(1));
        transport.send(frame("fill")).await.unwrap();
        transport.close();
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text(frame("fill"))));
        drop(transport);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn close_signal_fires_with_full_buffer() {
        let (transport, _rx) = ChannelTransport::new(1, Duration::from_secs(1));
        let signal = transport.close_signal();
        transport.send(frame("fill")).await.unwrap();
        assert!(!signal.is_cancelled());
        transport.close();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn send_after_close_is_closed() {
        let (transport, _rx) = ChannelTransport::new(4, Duration::from_secs(1));
        transport.close();
        assert_eq!(
            transport.send(frame("late")).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let (transport, mut rx) = ChannelTransport::new(8, Duration::from_secs(1));
        for i in 0..5 {
            transport.send(frame(&format!("m{i}"))).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(
                rx.recv().await,
                Some(OutboundFrame::Text(frame(&format!("m{i}"))))
            );
        }
    }
}
