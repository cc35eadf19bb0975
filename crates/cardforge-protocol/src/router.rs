//! Per-connection request/reply/notify router.
//!
//! A [`Router`] is owned by exactly one connection. It allocates request
//! ids, enforces at most one outstanding request at a time, and matches
//! inbound replies against the request that is currently waiting.
//!
//! The blocking "acquire a semaphore" wait described for the original
//! server is expressed here as an async `oneshot` channel: the scheduler
//! task that calls [`Router::request`] simply `.await`s it instead of
//! parking an OS thread.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::RouterError;
use crate::packet::{Packet, REQUEST_ID_WRAP};

/// What `request()` resolves to, mirroring the three outcomes the source
/// router's `waitForReply` can return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterWait {
    /// A reply arrived for the outstanding request, matching id and
    /// within the timeout window.
    Reply(Vec<u8>),
    /// No reply arrived before the deadline (the `"__notready"` sentinel).
    NotReady,
    /// The connection closed, or the request was explicitly cancelled
    /// (the `"__cancel"` sentinel).
    Cancelled,
}

struct PendingRequest {
    request_id: i64,
    sent_at: std::time::Instant,
    reply_timeout: Duration,
    reply_tx: Option<oneshot::Sender<RouterWait>>,
    wake_tx: Option<oneshot::Sender<()>>,
}

struct RouterInner {
    next_request_id: i64,
    pending: Option<PendingRequest>,
}

impl RouterInner {
    fn allocate_id(&mut self) -> i64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        if self.next_request_id >= REQUEST_ID_WRAP {
            self.next_request_id = 1;
        }
        id
    }
}

/// Owns the outbound packet channel for one connection and tracks the
/// single in-flight request, if any.
pub struct Router {
    inner: Mutex<RouterInner>,
    outbound: mpsc::UnboundedSender<Packet>,
}

impl Router {
    pub fn new(outbound: mpsc::UnboundedSender<Packet>) -> Self {
        Router {
            inner: Mutex::new(RouterInner { next_request_id: 1, pending: None }),
            outbound,
        }
    }

    /// Fire-and-forget notification; `requestId = -2`.
    pub fn notify(&self, command: impl Into<String>, data: Vec<u8>) -> Result<(), RouterError> {
        self.outbound
            .send(Packet::notify(command, data))
            .map_err(|_| RouterError::Cancelled)
    }

    /// Sends a request and waits for the matching reply, up to `timeout`.
    ///
    /// Enforces the single-outstanding-request invariant: a second call
    /// while one is already pending fails with
    /// [`RouterError::RequestInFlight`] rather than silently queuing.
    pub async fn request(
        &self,
        command: impl Into<String>,
        data: Vec<u8>,
        timeout: Duration,
    ) -> Result<RouterWait, RouterError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request_id = {
            let mut inner = self.inner.lock().await;
            if inner.pending.is_some() {
                return Err(RouterError::RequestInFlight);
            }
            let id = inner.allocate_id();
            inner.pending = Some(PendingRequest {
                request_id: id,
                sent_at: std::time::Instant::now(),
                reply_timeout: timeout,
                reply_tx: Some(reply_tx),
                wake_tx: None,
            });
            id
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let packet = Packet::request(request_id, command, data, timeout.as_secs() as i64, timestamp);
        if self.outbound.send(packet).is_err() {
            self.clear_pending(request_id).await;
            return Ok(RouterWait::Cancelled);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Ok(RouterWait::Cancelled),
            Err(_) => {
                debug!(request_id, "request timed out waiting for reply");
                self.clear_pending(request_id).await;
                Ok(RouterWait::NotReady)
            }
        }
    }

    /// Registers a second waiter (e.g. a room's request timer) to be
    /// woken, without consuming the reply, when the current request
    /// settles. Only one secondary waiter is kept at a time.
    pub async fn register_wake(&self, wake_tx: oneshot::Sender<()>) {
        let mut inner = self.inner.lock().await;
        if let Some(pending) = &mut inner.pending {
            pending.wake_tx = Some(wake_tx);
        }
    }

    /// Feeds an inbound packet that claims to be a reply. Accepted only
    /// if its id matches the outstanding request and it arrived within
    /// that request's timeout window; otherwise it's dropped as stale.
    pub async fn accept_reply(&self, packet: &Packet) {
        let mut inner = self.inner.lock().await;
        let matches = inner
            .pending
            .as_ref()
            .is_some_and(|p| p.request_id == packet.request_id && p.sent_at.elapsed() <= p.reply_timeout);
        if !matches {
            warn!(request_id = packet.request_id, "dropping stale or unmatched reply");
            return;
        }
        if let Some(mut pending) = inner.pending.take() {
            if let Some(tx) = pending.reply_tx.take() {
                let _ = tx.send(RouterWait::Reply(packet.data.clone()));
            }
            if let Some(wake) = pending.wake_tx.take() {
                let _ = wake.send(());
            }
        }
    }

    /// Releases any waiter with `Cancelled`, e.g. because the socket died.
    pub async fn cancel(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(mut pending) = inner.pending.take() {
            if let Some(tx) = pending.reply_tx.take() {
                let _ = tx.send(RouterWait::Cancelled);
            }
        }
    }

    async fn clear_pending(&self, request_id: i64) {
        let mut inner = self.inner.lock().await;
        if inner.pending.as_ref().is_some_and(|p| p.request_id == request_id) {
            inner.pending = None;
        }
    }

    pub async fn has_outstanding_request(&self) -> bool {
        self.inner.lock().await.pending.is_some()
    }
}
