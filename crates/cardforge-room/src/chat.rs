//! `RoomBase::chat` (§4.7 "Chat"): decode, truncate, ban-word and mute
//! filtering shared by both the lobby and every room.

use cardforge_protocol::PlayerId;

use crate::error::RoomError;

/// Messages longer than this are truncated before any further processing.
const MAX_CHAT_BYTES: usize = 300;

/// Lobby chat (`type == 1`) vs. in-room chat (`type == 2`), per §4.6/§4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatScope {
    Lobby,
    Room,
}

/// A decoded `{type, msg}` chat payload, with `sender` filled in by the
/// caller (the wire payload never carries it — the source of a chat frame
/// is always the connection that sent it).
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub scope: ChatScope,
    pub sender: PlayerId,
    pub msg: String,
}

/// This server's view of a player's chat-mute row (`tempmute`), auto-
/// cleared by the [`crate::ChatStore`] seam once `expireAt` has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteStatus {
    /// Not muted.
    None,
    /// Every chat message is rejected.
    Full,
    /// Only messages starting with `$` (commands) are rejected.
    NoCommands,
}

/// Decodes a chat payload's `{type, msg}` CBOR map, truncates `msg` to
/// [`MAX_CHAT_BYTES`], and stamps it with `sender`.
pub fn decode_chat(sender: PlayerId, data: &[u8]) -> Result<ChatMessage, RoomError> {
    let value: ciborium::Value =
        ciborium::from_reader(data).map_err(|_| RoomError::ChatRejected)?;
    let ciborium::Value::Map(entries) = value else {
        return Err(RoomError::ChatRejected);
    };
    let mut kind = None;
    let mut msg = None;
    for (k, v) in entries {
        let Some(key) = k.as_text() else { continue };
        match key {
            "type" => kind = v.as_integer().and_then(|i| i128::try_from(i).ok()),
            "msg" => msg = v.as_text().map(str::to_string),
            _ => {}
        }
    }
    let scope = match kind {
        Some(1) => ChatScope::Lobby,
        Some(2) => ChatScope::Room,
        _ => return Err(RoomError::ChatRejected),
    };
    let mut msg = msg.ok_or(RoomError::ChatRejected)?;
    truncate_to_bytes(&mut msg, MAX_CHAT_BYTES);
    Ok(ChatMessage { scope, sender, msg })
}

fn truncate_to_bytes(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

/// Applies the ban-word and mute filters (§4.7). `Ok(true)` means the
/// message passes and should be broadcast; `Ok(false)` means it was
/// silently rejected (no reply to the sender, matching the source).
pub fn should_broadcast(msg: &ChatMessage, ban_words: &[String], mute: MuteStatus) -> bool {
    if ban_words.iter().any(|w| !w.is_empty() && msg.msg.contains(w.as_str())) {
        return false;
    }
    match mute {
        MuteStatus::Full => false,
        MuteStatus::NoCommands => !msg.msg.starts_with('$'),
        MuteStatus::None => true,
    }
}

/// The persistence seam for chat muting: `RoomManager` never touches SQL
/// directly, matching [`cardforge_session::registry::AccountStore`]'s
/// trait-at-the-seam pattern.
pub trait ChatStore: Send + Sync + 'static {
    async fn mute_status(&self, player_id: PlayerId) -> Result<MuteStatus, RoomError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(kind: i64, msg: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let map = ciborium::Value::Map(vec![
            (ciborium::Value::Text("type".into()), ciborium::Value::Integer(kind.into())),
            (ciborium::Value::Text("msg".into()), ciborium::Value::Text(msg.into())),
        ]);
        ciborium::into_writer(&map, &mut buf).unwrap();
        buf
    }

    #[test]
    fn decodes_room_chat() {
        let data = encode(2, "hello");
        let chat = decode_chat(PlayerId(1), &data).unwrap();
        assert_eq!(chat.scope, ChatScope::Room);
        assert_eq!(chat.msg, "hello");
    }

    #[test]
    fn truncates_long_messages() {
        let long = "x".repeat(400);
        let data = encode(1, &long);
        let chat = decode_chat(PlayerId(1), &data).unwrap();
        assert_eq!(chat.msg.len(), MAX_CHAT_BYTES);
    }

    #[test]
    fn rejects_unknown_scope() {
        let data = encode(9, "hello");
        assert!(decode_chat(PlayerId(1), &data).is_err());
    }

    #[test]
    fn ban_word_blocks_broadcast() {
        let msg = ChatMessage { scope: ChatScope::Room, sender: PlayerId(1), msg: "contains badword here".into() };
        let ban_words = vec!["badword".to_string()];
        assert!(!should_broadcast(&msg, &ban_words, MuteStatus::None));
    }

    #[test]
    fn full_mute_blocks_everything() {
        let msg = ChatMessage { scope: ChatScope::Room, sender: PlayerId(1), msg: "hello".into() };
        assert!(!should_broadcast(&msg, &[], MuteStatus::Full));
    }

    #[test]
    fn partial_mute_blocks_only_commands() {
        let cmd = ChatMessage { scope: ChatScope::Room, sender: PlayerId(1), msg: "$whisper".into() };
        let plain = ChatMessage { scope: ChatScope::Room, sender: PlayerId(1), msg: "hi".into() };
        assert!(!should_broadcast(&cmd, &[], MuteStatus::NoCommands));
        assert!(should_broadcast(&plain, &[], MuteStatus::NoCommands));
    }
}
