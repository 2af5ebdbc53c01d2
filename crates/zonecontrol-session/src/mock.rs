//! In-memory [`Connection`] for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use zonecontrol_transport::{Connection, ConnectionId, TransportError};

/// Records every frame it is asked to send.
pub(crate) struct MockConnection {
    id: ConnectionId,
    sent: Mutex<Vec<Vec<u8>>>,
    fail_sends: bool,
    closed: AtomicBool,
}

impl MockConnection {
    pub(crate) fn new(id: u64) -> Arc<Self> {
        Self::build(id, false)
    }

    /// A connection whose peer is already gone: every send fails.
    pub(crate) fn failing(id: u64) -> Arc<Self> {
        Self::build(id, true)
    }

    fn build(id: u64, fail_sends: bool) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(id),
            sent: Mutex::new(Vec::new()),
            fail_sends,
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Connection for MockConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_sends {
            return Err(TransportError::ConnectionClosed(
                "peer went away".into(),
            ));
        }
        self.sent.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(None)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
