//! User configuration loaded from `~/.config/linenote/config.toml`.
//!
//! Every field has a default, so a missing file or missing keys are fine. A
//! file that fails to parse is logged and ignored; configuration problems
//! never prevent startup.
//!
//! ```toml
//! theme = "catppuccin-mocha"
//! syntax_theme = "base16-ocean.dark"
//!
//! [remote]
//! base_url = "https://lms.example.org"
//! timeout_secs = 10
//!
//! [viewer]
//! user_id = 17
//! name = "Grace Hopper"
//! role = "staff"
//! comments_permitted = true
//! ```

use std::path::{Path, PathBuf};

use linenote_core::types::{Role, UserId};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UI color theme: `dark` or `catppuccin-mocha`.
    pub theme: String,
    /// syntect theme used to highlight the source.
    pub syntax_theme: String,
    pub remote: RemoteConfig,
    pub viewer: ViewerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "catppuccin-mocha".to_owned(),
            syntax_theme: linenote_core::highlight::DEFAULT_THEME.to_owned(),
            remote: RemoteConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Root of the course web application. Unset means the local database.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { base_url: None, timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
    pub comments_permitted: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            user_id: 1,
            name: std::env::var("USER").unwrap_or_else(|_| "reviewer".to_owned()),
            role: Role::Staff,
            comments_permitted: true,
        }
    }
}

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var(var)
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(fallback)))
        .unwrap_or_else(|| PathBuf::from(fallback))
        .join("linenote")
}

/// Returns the path to the linenote config file.
///
/// Prefers `$XDG_CONFIG_HOME/linenote/config.toml`; falls back to
/// `~/.config/linenote/config.toml` when the env var is absent.
pub fn config_path() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config").join("config.toml")
}

/// Directory for the local comment database and the log file.
pub fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// Loads the config at `path`, falling back to defaults.
pub fn load(path: &Path) -> Config {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Config::default(),
    };
    parse(&raw).unwrap_or_else(|err| {
        warn!(path = %path.display(), error = %err, "config parse error, using defaults");
        Config::default()
    })
}

pub fn parse(raw: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(raw)
}
