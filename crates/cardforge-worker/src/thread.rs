//! The worker-thread pool (§4.8): each `RoomThread` owns a dedicated OS
//! thread running a single-threaded Tokio runtime, the direct analogue of
//! the source's one-`io_context`-per-`std::thread` pattern. Rooms are
//! assigned to a thread, never migrated; commands reach the thread only
//! over its `mpsc` channel, the same cross-reactor posting idiom
//! `cardforge_room`'s main-reactor/worker split uses elsewhere.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use cardforge_protocol::RoomId;
use cardforge_room::ThreadId;
use tokio::sync::mpsc;

enum ThreadCommand {
    AssignRoom(RoomId),
    ReleaseRoom(RoomId),
    Quit,
}

/// One worker thread and the rooms currently assigned to it.
pub struct RoomThread {
    id: ThreadId,
    tx: mpsc::UnboundedSender<ThreadCommand>,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    /// Content-pack digest this thread was created against.
    md5_snapshot: String,
    /// Sticky once set: an outdated thread never becomes fresh again,
    /// even if the content md5 later matches again (§4.8).
    outdated: AtomicBool,
    room_count: AtomicU32,
    capacity: u32,
}

impl RoomThread {
    fn spawn(id: ThreadId, md5_snapshot: String, capacity: u32) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ThreadCommand>();
        let thread_id = id;
        let handle = std::thread::Builder::new()
            .name(format!("room-thread-{}", id.0))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("worker thread runtime");
                runtime.block_on(async move {
                    while let Some(cmd) = rx.recv().await {
                        match cmd {
                            ThreadCommand::AssignRoom(room_id) => {
                                tracing::debug!(thread = thread_id.0, %room_id, "room assigned to thread");
                            }
                            ThreadCommand::ReleaseRoom(room_id) => {
                                tracing::debug!(thread = thread_id.0, %room_id, "room released from thread");
                            }
                            ThreadCommand::Quit => break,
                        }
                    }
                });
            })
            .expect("spawn worker OS thread");

        RoomThread {
            id,
            tx,
            handle: Mutex::new(Some(handle)),
            md5_snapshot,
            outdated: AtomicBool::new(false),
            room_count: AtomicU32::new(0),
            capacity,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn room_count(&self) -> u32 {
        self.room_count.load(Ordering::Relaxed)
    }

    pub fn is_full(&self) -> bool {
        self.room_count() >= self.capacity
    }

    /// Sticky outdated check (§4.8): once a content-md5 mismatch is
    /// observed, this thread answers `true` forever, even if the content
    /// is later rolled back to match `md5_snapshot` again.
    pub fn is_outdated(&self, current_md5: &str) -> bool {
        if self.outdated.load(Ordering::Acquire) {
            return true;
        }
        if self.md5_snapshot != current_md5 {
            self.outdated.store(true, Ordering::Release);
            return true;
        }
        false
    }

    pub fn assign_room(&self, room_id: RoomId) {
        self.room_count.fetch_add(1, Ordering::AcqRel);
        let _ = self.tx.send(ThreadCommand::AssignRoom(room_id));
    }

    pub fn release_room(&self, room_id: RoomId) {
        self.room_count.fetch_sub(1, Ordering::AcqRel);
        let _ = self.tx.send(ThreadCommand::ReleaseRoom(room_id));
    }
}

impl Drop for RoomThread {
    fn drop(&mut self) {
        let _ = self.tx.send(ThreadCommand::Quit);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Owns every live [`RoomThread`] and implements `Server::getAvailableThread`
/// (§4.8): the first thread that is neither outdated nor full, or a fresh
/// one if none qualifies.
pub struct ThreadPool {
    threads: Mutex<Vec<std::sync::Arc<RoomThread>>>,
    next_thread_id: AtomicU64,
    capacity_per_thread: u32,
}

impl ThreadPool {
    pub fn new(capacity_per_thread: u32) -> Self {
        ThreadPool {
            threads: Mutex::new(Vec::new()),
            next_thread_id: AtomicU64::new(1),
            capacity_per_thread,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }

    /// `Server::getAvailableThread` (§4.8).
    pub fn get_available_thread(&self, current_md5: &str) -> std::sync::Arc<RoomThread> {
        let mut threads = self.threads.lock().unwrap();
        for thread in threads.iter() {
            if !thread.is_outdated(current_md5) && !thread.is_full() {
                return thread.clone();
            }
        }
        let id = ThreadId(self.next_thread_id.fetch_add(1, Ordering::Relaxed));
        let thread = std::sync::Arc::new(RoomThread::spawn(id, current_md5.to_string(), self.capacity_per_thread));
        threads.push(thread.clone());
        tracing::info!(thread = id.0, "worker thread created");
        thread
    }

    /// Drops threads with zero assigned rooms whose md5 snapshot has gone
    /// stale, releasing their OS thread (§4.11 `refreshMd5`, "reap worker
    /// threads whose refcount is zero").
    pub fn reap_outdated_idle(&self, current_md5: &str) {
        let mut threads = self.threads.lock().unwrap();
        threads.retain(|t| !(t.is_outdated(current_md5) && t.room_count() == 0));
    }
}
