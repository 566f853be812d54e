//! Session settings.
//!
//! An explicitly constructed struct handed to
//! [`SessionConnection::connect`](crate::session::SessionConnection::connect);
//! there is no process-wide singleton. Persisted as JSON next to the
//! executable.

use crate::scheduler::Viewport;
use crate::transport::TlsMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

const DEFAULT_SETTINGS_PATH: &str = "settings.json";

/// Connection and session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// WebSocket URL of the world server.
    pub server_url: String,
    /// World to join after the captcha gate clears.
    pub world_name: String,
    /// `Origin` header value sent with the handshake.
    pub origin: String,
    /// Whether the session waits for a captcha before joining.
    pub require_captcha: bool,
    /// Loopback port for the captcha token server.
    pub captcha_port: u16,
    /// Viewport dimensions used for chunk demand calculation.
    pub viewport: Viewport,
    /// Certificate verification policy.
    pub tls: TlsMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "wss://ourworldofpixels.com".to_string(),
            world_name: "main".to_string(),
            origin: "https://ourworldofpixels.com".to_string(),
            require_captcha: true,
            captcha_port: 8081,
            viewport: Viewport::default(),
            tls: TlsMode::Verified,
        }
    }
}

impl Settings {
    /// Load settings from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(DEFAULT_SETTINGS_PATH))
    }

    /// Load settings from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    Settings::default()
                }
            },
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                }
                Settings::default()
            }
        }
    }

    /// Save settings to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to_path(Path::new(DEFAULT_SETTINGS_PATH))
    }

    /// Save settings as pretty-printed JSON.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("serialize settings")?;
        fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}
