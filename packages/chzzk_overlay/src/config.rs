use anyhow::{Context, Result};
use chzzk_chat::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [chat]
//                    max_visible = 30
//
//   env var:         CHZZK_OVERLAY_CHAT__MAX_VISIBLE=30   (double underscore = nesting)

/// How visible chats are written to stdout.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Colored `[badge] nickname: message` lines
    #[default]
    Text,
    /// One JSON object per chat
    Json,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub chat: ChatFileConfig,
    #[serde(default)]
    pub display: DisplayFileConfig,
    #[serde(default)]
    pub api: ApiFileConfig,
    #[serde(default)]
    pub log: LogFileConfig,
}

/// Socket tunables (lives under `[chat]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatFileConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_max_visible")]
    pub max_visible: usize,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    /// 0 disables the post-ping liveness check.
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,
}

impl Default for ChatFileConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            max_visible: default_max_visible(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
        }
    }
}

/// Display pacing (lives under `[display]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisplayFileConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_catch_up_after_ms")]
    pub catch_up_after_ms: u64,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for DisplayFileConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            catch_up_after_ms: default_catch_up_after_ms(),
            format: OutputFormat::default(),
        }
    }
}

/// Credential lookup endpoints (lives under `[api]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiFileConfig {
    #[serde(default = "default_service_base_url")]
    pub service_base_url: String,
    #[serde(default = "default_game_base_url")]
    pub game_base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiFileConfig {
    fn default() -> Self {
        Self {
            service_base_url: default_service_base_url(),
            game_base_url: default_game_base_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Logging knobs (lives under `[log]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogFileConfig {
    /// Seconds between metrics log lines; 0 disables.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

fn default_server_url() -> String {
    chzzk_chat::config::DEFAULT_SERVER_URL.to_string()
}
fn default_max_visible() -> usize {
    chzzk_chat::config::DEFAULT_MAX_VISIBLE
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_keepalive_interval_secs() -> u64 {
    20
}
fn default_liveness_timeout_secs() -> u64 {
    10
}
fn default_tick_interval_ms() -> u64 {
    75
}
fn default_catch_up_after_ms() -> u64 {
    1000
}
fn default_service_base_url() -> String {
    "https://api.chzzk.naver.com".to_string()
}
fn default_game_base_url() -> String {
    "https://comm-api.game.naver.com".to_string()
}
fn default_user_agent() -> String {
    concat!("chzzk-overlay/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_stats_interval_secs() -> u64 {
    60
}

/// Build a figment that layers: defaults → config.toml → CHZZK_OVERLAY_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `CHZZK_OVERLAY_CHAT__MAX_VISIBLE=30`  →  `chat.max_visible = 30`
///   `CHZZK_OVERLAY_DISPLAY__FORMAT=json`  →  `display.format = "json"`
pub fn load_config(config_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_dir.join("config.toml")))
        .merge(Env::prefixed("CHZZK_OVERLAY_").split("__"))
}

impl FileConfig {
    /// Runtime view consumed by the chat pipeline.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            server_url: self.chat.server_url.clone(),
            max_visible: self.chat.max_visible.max(1),
            tick_interval: Duration::from_millis(self.display.tick_interval_ms.max(1)),
            catch_up_after: Duration::from_millis(self.display.catch_up_after_ms),
            keepalive_interval: Duration::from_secs(self.chat.keepalive_interval_secs.max(1)),
            reconnect_delay: Duration::from_millis(self.chat.reconnect_delay_ms),
            liveness_timeout: match self.chat.liveness_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            ..PipelineConfig::default()
        }
    }

    /// `None` when periodic stats logging is disabled.
    pub fn stats_interval(&self) -> Option<Duration> {
        match self.log.stats_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Where the overlay looks for `config.toml`.
#[derive(Clone, Debug)]
pub struct OverlayPaths {
    pub config_dir: PathBuf,
}

impl OverlayPaths {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .context("could not determine the user config directory")?
                .join("chzzk-overlay"),
        };

        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

        info!("Config directory: {}", config_dir.display());
        Ok(Self { config_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}
