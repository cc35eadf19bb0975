//! Room capacity and the owner-supplied settings blob (§3 `Room.settings`).

use crate::error::RoomError;

pub const DEFAULT_CAPACITY: u32 = 5;
pub const MAX_CAPACITY: u32 = 8;

/// Clamps a client-requested capacity into `[1, MAX_CAPACITY]`, falling
/// back to [`DEFAULT_CAPACITY`] for anything non-positive.
pub fn clamp_capacity(requested: i64) -> u32 {
    if requested <= 0 {
        DEFAULT_CAPACITY
    } else {
        (requested as u32).min(MAX_CAPACITY)
    }
}

/// The settings an owner supplies on `CreateRoom`: an opaque blob plus the
/// two fields every room needs pulled out of it (§3, §4.6).
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub game_mode: String,
    pub password: String,
    pub raw: Vec<u8>,
}

impl RoomSettings {
    pub fn is_locked(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn password_matches(&self, attempt: &str) -> bool {
        !self.is_locked() || self.password == attempt
    }
}

/// Parses the owner-supplied settings blob: a CBOR map with at least
/// `gameMode` and `password` text entries.
pub fn parse_settings(raw: Vec<u8>) -> Result<RoomSettings, RoomError> {
    let value: ciborium::Value =
        ciborium::from_reader(raw.as_slice()).map_err(|_| RoomError::InvalidState("malformed room settings".into()))?;
    let ciborium::Value::Map(entries) = value else {
        return Err(RoomError::InvalidState("room settings must be a map".into()));
    };
    let mut game_mode = String::new();
    let mut password = String::new();
    for (k, v) in entries {
        match k.as_text() {
            Some("gameMode") => game_mode = v.as_text().unwrap_or_default().to_string(),
            Some("password") => password = v.as_text().unwrap_or_default().to_string(),
            _ => {}
        }
    }
    Ok(RoomSettings { game_mode, password, raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_settings(mode: &str, password: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let map = ciborium::Value::Map(vec![
            (ciborium::Value::Text("gameMode".into()), ciborium::Value::Text(mode.into())),
            (ciborium::Value::Text("password".into()), ciborium::Value::Text(password.into())),
        ]);
        ciborium::into_writer(&map, &mut buf).unwrap();
        buf
    }

    #[test]
    fn clamps_capacity_to_the_valid_range() {
        assert_eq!(clamp_capacity(0), DEFAULT_CAPACITY);
        assert_eq!(clamp_capacity(-5), DEFAULT_CAPACITY);
        assert_eq!(clamp_capacity(3), 3);
        assert_eq!(clamp_capacity(20), MAX_CAPACITY);
    }

    #[test]
    fn parses_game_mode_and_password() {
        let raw = encode_settings("m1", "secret");
        let settings = parse_settings(raw).unwrap();
        assert_eq!(settings.game_mode, "m1");
        assert!(settings.is_locked());
        assert!(settings.password_matches("secret"));
        assert!(!settings.password_matches("wrong"));
    }

    #[test]
    fn empty_password_is_unlocked() {
        let raw = encode_settings("m1", "");
        let settings = parse_settings(raw).unwrap();
        assert!(!settings.is_locked());
        assert!(settings.password_matches("anything"));
    }
}
