//! Connection acceptor for Cardforge: a raw length-prefixed TCP transport
//! plus a UDP LAN-discovery responder, sharing one port.
//!
//! # Modules
//!
//! - [`tcp`] — `TcpTransport`/`TcpConnection`, the production [`Transport`].
//! - [`udp`] — `UdpDiscovery`, answering `fkDetectServer`/`fkGetDetail…` probes.

#![allow(async_fn_in_trait)]

mod error;
pub mod tcp;
pub mod udp;

pub use error::TransportError;
pub use tcp::{TcpConnection, TcpTransport};
pub use udp::{ServerSummary, UdpDiscovery};

use cardforge_protocol::ConnId;

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that can send and receive length-prefixed frames.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the connection-scoped identifier assigned at accept time.
    fn id(&self) -> ConnId;
}
