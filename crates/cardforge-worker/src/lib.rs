//! Worker-thread pool and script-engine RPC bridge for Cardforge.
//!
//! A [`ThreadPool`] hands out [`RoomThread`]s the way `Server::getAvailableThread`
//! does (§4.8): each room is pinned to one dedicated-OS-thread worker for
//! its lifetime. The worker speaks to the out-of-scope external script
//! engine through the [`ScriptEngine`]/[`EngineHost`] seam (§4.9) rather
//! than embedding any game rules itself.

#![allow(async_fn_in_trait)]

mod engine;
mod thread;

pub use engine::{EngineCall, EngineHost, EngineReply, NullScriptEngine, RoomLiveness, ScriptEngine};
pub use thread::{RoomThread, ThreadPool};
