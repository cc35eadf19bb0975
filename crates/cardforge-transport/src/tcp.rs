//! Raw TCP transport: a length-prefixed framing over `tokio::net::TcpStream`.
//!
//! The wire codec (`cardforge-protocol`) only cares about byte blobs; this
//! module is purely responsible for carving a `TcpStream` into discrete
//! frames, using a big-endian `u32` length prefix ahead of each CBOR body.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use cardforge_protocol::ConnId;

use crate::error::TransportError;
use crate::{Connection, Transport};

/// Frames larger than this are rejected outright rather than allocating
/// an attacker-controlled buffer.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Listens for TCP connections and hands each one back as a [`TcpConnection`].
pub struct TcpTransport {
    listener: TcpListener,
    next_conn_id: AtomicI64,
}

impl TcpTransport {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(TransportError::AcceptFailed)?;
        Ok(TcpTransport { listener, next_conn_id: AtomicI64::new(1000) })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::AcceptFailed)
    }

    fn next_id(&self) -> ConnId {
        // connIds are process-unique, allocated monotonically from 1000 and
        // wrapped before they'd run into the sign bit.
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        if id > 0x7FFF_FF00 {
            self.next_conn_id.store(1000, Ordering::Relaxed);
        }
        ConnId(id)
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let _ = socket.set_nodelay(true);
                    let id = self.next_id();
                    debug!(%id, %peer_addr, "accepted tcp connection");
                    let (read_half, write_half) = tokio::io::split(socket);
                    return Ok(TcpConnection {
                        id,
                        peer_addr,
                        reader: Mutex::new(read_half),
                        writer: Mutex::new(write_half),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionAborted => continue,
                Err(e) => return Err(TransportError::AcceptFailed(e)),
            }
        }
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// One accepted TCP socket, framed by a 4-byte big-endian length prefix.
pub struct TcpConnection {
    id: ConnId,
    peer_addr: SocketAddr,
    reader: Mutex<ReadHalf<TcpStream>>,
    writer: Mutex<WriteHalf<TcpStream>>,
}

impl TcpConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        let len = u32::try_from(data.len()).map_err(|_| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "frame too large",
            ))
        })?;
        writer.write_all(&len.to_be_bytes()).await.map_err(TransportError::SendFailed)?;
        writer.write_all(data).await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut reader = self.reader.lock().await;
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(TransportError::ReceiveFailed(e)),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            warn!(id = %self.id, len, "oversized frame, closing connection");
            return Err(TransportError::ReceiveFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "frame exceeds maximum length",
            )));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await.map_err(TransportError::ReceiveFailed)?;
        Ok(Some(buf))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame_over_loopback() {
        let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        let mut transport = transport;

        let client_task = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, write_half) = tokio::io::split(stream);
            let conn = TcpConnection {
                id: ConnId(1),
                peer_addr: addr,
                reader: Mutex::new(read_half),
                writer: Mutex::new(write_half),
            };
            conn.send(b"hello").await.unwrap();
            conn.recv().await.unwrap()
        });

        let server_conn = transport.accept().await.unwrap();
        let received = server_conn.recv().await.unwrap();
        assert_eq!(received, Some(b"hello".to_vec()));
        server_conn.send(b"world").await.unwrap();

        let echoed = client_task.await.unwrap();
        assert_eq!(echoed, Some(b"world".to_vec()));
    }
}
