use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::SessionConfig;
use crate::state_machine::{ReconnectPolicy, MAX_RECONNECT_ATTEMPTS};

const APP_DIR_NAME: &str = "voice-chat-client";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Chat backend WebSocket endpoint.
    pub ws_url: String,

    /// Reconnect attempts after an unexpected closure.
    pub max_reconnect_attempts: u32,

    /// First reconnect delay; doubles with every attempt.
    pub reconnect_base_delay_ms: u64,

    /// Base URL of the OpenAI-compatible speech-to-text API.
    pub stt_base_url: String,

    pub stt_model: String,

    /// Spoken language hint. `None` or `"auto"` lets the model detect it.
    pub stt_language: Option<String>,

    /// Where uploaded recordings are stored. Defaults to the XDG data dir.
    pub recordings_dir: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000/ws".to_string(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay_ms: 1000,
            stt_base_url: "https://api.openai.com/v1".to_string(),
            stt_model: "whisper-1".to_string(),
            stt_language: Some("pl".to_string()),
            recordings_dir: None,
        }
    }
}

impl ClientSettings {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_reconnect_attempts,
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            url: self.ws_url.clone(),
            reconnect: self.reconnect_policy(),
        }
    }

    /// Language hint to send, if any.
    pub fn language_hint(&self) -> Option<&str> {
        self.stt_language
            .as_deref()
            .filter(|l| !l.is_empty() && *l != "auto")
    }

    /// Override fields from environment-style variables.
    ///
    /// Recognised: `CHAT_WS_URL`, `STT_BASE_URL`, `STT_MODEL`, `STT_LANGUAGE`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get("CHAT_WS_URL") {
            self.ws_url = url;
        }
        if let Some(url) = get("STT_BASE_URL") {
            self.stt_base_url = url;
        }
        if let Some(model) = get("STT_MODEL") {
            self.stt_model = model;
        }
        if let Some(language) = get("STT_LANGUAGE") {
            self.stt_language = Some(language);
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }
}

/// Default settings file: <config_dir>/voice-chat-client/settings.json
pub fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

pub fn load_settings() -> ClientSettings {
    match settings_path() {
        Ok(path) => load_settings_from(&path),
        Err(e) => {
            log::warn!("Settings: {}", e);
            ClientSettings::default()
        }
    }
}

pub fn load_settings_from(path: &Path) -> ClientSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<ClientSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                ClientSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ClientSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            ClientSettings::default()
        }
    }
}

pub fn save_settings(settings: &ClientSettings) -> Result<(), String> {
    save_settings_to(&settings_path()?, settings)
}

pub fn save_settings_to(path: &Path, settings: &ClientSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write to a temp file in the same directory, then rename over the target.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // Windows rename fails if the destination exists
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}
