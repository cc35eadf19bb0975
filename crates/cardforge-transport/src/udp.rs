//! UDP LAN-discovery responder.
//!
//! Answers two well-known probe payloads on the same port the TCP
//! listener binds. Every other datagram is ignored; this socket never
//! carries game traffic.

use std::net::SocketAddr;

use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::TransportError;

const DETECT_PROBE: &str = "fkDetectServer";
const DETECT_REPLY: &str = "me";
const DETAIL_PREFIX: &str = "fkGetDetail";

/// What the discovery responder needs to know about the server to answer
/// a detail probe.
#[derive(Debug, Clone)]
pub struct ServerSummary {
    pub version: String,
    pub icon_url: String,
    pub description: String,
    pub capacity: u32,
    pub online_count: u32,
}

#[derive(Serialize)]
struct DetailReply<'a>(&'a str, &'a str, &'a str, u32, u32, &'a str);

/// A UDP socket that answers LAN-discovery probes. Runs its own receive
/// loop; callers provide a closure to fetch a fresh [`ServerSummary`] on
/// every detail request so the reply always reflects current load.
pub struct UdpDiscovery {
    socket: UdpSocket,
}

impl UdpDiscovery {
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await.map_err(TransportError::AcceptFailed)?;
        Ok(UdpDiscovery { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::AcceptFailed)
    }

    /// Runs forever, answering probes using `summary_fn` for each detail
    /// request. Intended to be spawned on the acceptor thread's runtime.
    pub async fn run(&self, summary_fn: impl Fn() -> ServerSummary) {
        let mut buf = [0u8; 512];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "udp discovery recv failed");
                    continue;
                }
            };
            let payload = &buf[..len];
            if let Some(reply) = handle_probe(payload, &summary_fn) {
                if let Err(e) = self.socket.send_to(&reply, peer).await {
                    warn!(%peer, error = %e, "udp discovery reply failed");
                } else {
                    debug!(%peer, "answered discovery probe");
                }
            }
        }
    }
}

fn handle_probe(payload: &[u8], summary_fn: &impl Fn() -> ServerSummary) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(payload).ok()?;
    if text == DETECT_PROBE {
        return Some(DETECT_REPLY.as_bytes().to_vec());
    }
    if let Some(rest) = text.strip_prefix(DETAIL_PREFIX) {
        let token = rest.trim_start_matches(',');
        let summary = summary_fn();
        let reply = DetailReply(
            &summary.version,
            &summary.icon_url,
            &summary.description,
            summary.capacity,
            summary.online_count,
            token,
        );
        return serde_json::to_vec(&reply).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> ServerSummary {
        ServerSummary {
            version: "0.5.14+".into(),
            icon_url: "".into(),
            description: "".into(),
            capacity: 100,
            online_count: 0,
        }
    }

    #[test]
    fn answers_detect_probe() {
        let reply = handle_probe(DETECT_PROBE.as_bytes(), &summary).unwrap();
        assert_eq!(reply, DETECT_REPLY.as_bytes());
    }

    #[test]
    fn answers_detail_probe_with_echoed_token() {
        let reply = handle_probe(b"fkGetDetail,abc", &summary).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr[0], "0.5.14+");
        assert_eq!(arr[5], "abc");
    }

    #[test]
    fn ignores_unknown_probes() {
        assert!(handle_probe(b"garbage", &summary).is_none());
    }
}
