//! Worker-thread assignment combined with the script-engine seam, as the
//! server facade would drive them together during a content-md5 change.

use cardforge_protocol::RoomId;
use cardforge_worker::{NullScriptEngine, RoomLiveness, ScriptEngine, ThreadPool};

#[test]
fn a_room_keeps_its_assigned_thread_across_lookups() {
    let pool = ThreadPool::new(5);
    let thread = pool.get_available_thread("md5-1");
    thread.assign_room(RoomId(7));

    let same_thread = pool.get_available_thread("md5-1");
    assert_eq!(thread.id(), same_thread.id());
}

#[tokio::test]
async fn refresh_md5_flags_old_threads_and_reaps_idle_ones() {
    let pool = ThreadPool::new(5);
    let idle = pool.get_available_thread("md5-1");
    assert!(!idle.is_outdated("md5-1"));

    // Content changed; a fresh thread request now asks for the new md5.
    pool.reap_outdated_idle("md5-2");
    assert_eq!(pool.thread_count(), 0, "idle thread on stale content is reaped");

    let engine = NullScriptEngine;
    let liveness = engine.resume_room(RoomId(7), "content_changed").await;
    assert_eq!(liveness, RoomLiveness::Dropped);
}
