//! Connector wrapper that counts dial attempts.

use async_trait::async_trait;
use slirc_relay::ServerIdentity;
use slirc_relay::upstream::{ConnectError, Connector, HandshakeSettings, Transport};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct CountingConnector<C> {
    inner: C,
    calls: AtomicUsize,
}

impl<C: Connector> CountingConnector<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: Connector> Connector for CountingConnector<C> {
    async fn connect(
        &self,
        identity: &ServerIdentity,
        settings: &HandshakeSettings,
    ) -> Result<Transport, ConnectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(identity, settings).await
    }
}
