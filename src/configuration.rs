use crate::comparer::{ProviderRequestComparer, RequestComparer};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

/// Knobs shared by the dispatcher and the bundled mock server.
#[derive(Debug, Clone)]
pub struct MockProviderConfiguration {
    expose_mismatch_body: bool,
    comparer: Arc<dyn RequestComparer + Send + Sync>,
    listen_address: SocketAddr,
}

impl MockProviderConfiguration {
    pub fn new() -> Self {
        Self {
            expose_mismatch_body: false,
            comparer: Arc::new(ProviderRequestComparer::new()),
            listen_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        }
    }

    /// When enabled, a synthetic 500 caused by a comparison mismatch carries
    /// the rendered mismatch as its body instead of an empty one. Off by
    /// default so the wire response stays a bare 500.
    pub fn set_expose_mismatch_body(&mut self, value: bool) {
        self.expose_mismatch_body = value;
    }

    pub fn expose_mismatch_body(&self) -> bool {
        self.expose_mismatch_body
    }

    pub fn set_comparer(&mut self, comparer: Arc<dyn RequestComparer + Send + Sync>) {
        self.comparer = comparer;
    }

    pub fn comparer(&self) -> Arc<dyn RequestComparer + Send + Sync> {
        self.comparer.clone()
    }

    pub fn set_listen_address(&mut self, address: SocketAddr) {
        self.listen_address = address;
    }

    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }
}

impl Default for MockProviderConfiguration {
    fn default() -> Self {
        Self::new()
    }
}
