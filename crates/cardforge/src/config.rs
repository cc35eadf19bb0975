//! Server configuration, loaded from `freekill.server.config.json`.

use serde::Deserialize;

fn default_capacity() -> u32 {
    100
}

fn default_temp_ban_time() -> u32 {
    60
}

fn default_room_count_per_thread() -> u32 {
    200
}

fn default_max_players_per_device() -> u32 {
    3
}

/// Mirrors the config file keys the server reads at startup. Every field
/// has a fallback so a partial or stale config file never prevents boot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(rename = "banWords")]
    pub ban_words: Vec<String>,

    #[serde(rename = "hiddenPacks")]
    pub hidden_packs: Vec<String>,

    #[serde(rename = "disabledFeatures")]
    pub disabled_features: Vec<String>,

    pub description: String,

    #[serde(rename = "iconUrl")]
    pub icon_url: String,

    #[serde(default = "default_capacity")]
    pub capacity: u32,

    #[serde(rename = "tempBanTime", default = "default_temp_ban_time")]
    pub temp_ban_time: u32,

    pub motd: String,

    #[serde(rename = "roomCountPerThread", default = "default_room_count_per_thread")]
    pub room_count_per_thread: u32,

    #[serde(rename = "maxPlayersPerDevice", default = "default_max_players_per_device")]
    pub max_players_per_device: u32,

    #[serde(rename = "enableWhitelist")]
    pub enable_whitelist: bool,

    // Legacy toggles. Folded into `disabled_features` after load and never
    // read again; kept only so old config files still deserialize.
    #[serde(rename = "enableBots", default = "default_true")]
    enable_bots: bool,

    #[serde(rename = "enableChangeRoom", default = "default_true")]
    enable_change_room: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ban_words: Vec::new(),
            hidden_packs: Vec::new(),
            disabled_features: Vec::new(),
            description: String::new(),
            icon_url: String::new(),
            capacity: default_capacity(),
            temp_ban_time: default_temp_ban_time(),
            motd: String::new(),
            room_count_per_thread: default_room_count_per_thread(),
            max_players_per_device: default_max_players_per_device(),
            enable_whitelist: false,
            enable_bots: true,
            enable_change_room: true,
        }
    }
}

impl ServerConfig {
    /// Parses a config file's contents, applying the legacy boolean shim.
    ///
    /// A malformed file yields a fresh default config rather than an error —
    /// config parse failure must never stop the server from booting.
    pub fn parse(raw: &str) -> Self {
        let mut config: Self = match serde_json::from_str(raw) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse server config, using defaults");
                Self::default()
            }
        };
        config.apply_legacy_shim();
        config
    }

    fn apply_legacy_shim(&mut self) {
        if !self.enable_bots && !self.disabled_features.iter().any(|f| f == "AddRobot") {
            self.disabled_features.push("AddRobot".to_string());
        }
        if !self.enable_change_room
            && !self.disabled_features.iter().any(|f| f == "ChangeRoom")
        {
            self.disabled_features.push("ChangeRoom".to_string());
        }
    }

    pub fn feature_disabled(&self, feature: &str) -> bool {
        self.disabled_features.iter().any(|f| f == feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_field() {
        let config = ServerConfig::parse("{}");
        assert_eq!(config.capacity, 100);
        assert_eq!(config.temp_ban_time, 60);
        assert_eq!(config.room_count_per_thread, 200);
        assert_eq!(config.max_players_per_device, 3);
        assert!(!config.enable_whitelist);
    }

    #[test]
    fn malformed_json_falls_back_to_defaults() {
        let config = ServerConfig::parse("not json at all");
        assert_eq!(config.capacity, 100);
    }

    #[test]
    fn legacy_enable_bots_false_disables_add_robot() {
        let config = ServerConfig::parse(r#"{"enableBots": false}"#);
        assert!(config.feature_disabled("AddRobot"));
    }

    #[test]
    fn legacy_enable_change_room_false_disables_change_room() {
        let config = ServerConfig::parse(r#"{"enableChangeRoom": false}"#);
        assert!(config.feature_disabled("ChangeRoom"));
    }

    #[test]
    fn legacy_shim_does_not_duplicate_existing_entry() {
        let config = ServerConfig::parse(
            r#"{"enableBots": false, "disabledFeatures": ["AddRobot"]}"#,
        );
        assert_eq!(
            config.disabled_features.iter().filter(|f| *f == "AddRobot").count(),
            1
        );
    }
}
