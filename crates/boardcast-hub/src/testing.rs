//! In-memory transport for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::transport::{Transport, TransportError};

/// Records every frame it is given; can be switched to fail.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    frames: Mutex<Vec<String>>,
    closed: AtomicBool,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        let transport = Self::new();
        transport.set_failing(true);
        transport
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn frames(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|f| f["event"].as_str().unwrap().to_owned())
            .collect()
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub(crate) fn last(&self) -> Option<Value> {
        self.frames().pop()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, frame: Arc<str>) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) || self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.frames.lock().push(frame.to_string());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
