use super::window::TimeWindow;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_MANIFEST_NAME: &str = "info.txt";
pub const DEFAULT_WORK_DIR: &str = "tmp";
pub const DEFAULT_NOTIFY_USERNAME: &str = "logharvest";
pub const DEFAULT_NOTIFY_CHANNEL: &str = "#notification";

/// Fully resolved run configuration. Built once at startup, never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub window: TimeWindow,
    pub harvest: HarvestConfig,
    pub staging: StagingConfig,
    pub output: OutputConfig,
    pub notify: NotifyConfig,
}

#[derive(Clone)]
pub struct ServiceConfig {
    pub token: String,
    pub account: String,
    pub base_url: String,
    pub request_timeout: Option<Duration>,
}

impl ServiceConfig {
    pub fn default_base_url(account: &str) -> String {
        format!("https://{}.loggly.com/apiv2", account)
    }

    /// Token as it may appear in logs.
    pub fn redacted_token(&self) -> String {
        let prefix: String = self.token.chars().take(4).collect();
        format!("{}…", prefix)
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("token", &self.redacted_token())
            .field("account", &self.account)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub page_size: u32,
    /// Upper bound on pages fetched for a single tag. `None` paginates until the
    /// service reports end of stream.
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingBackend {
    #[default]
    Files,
    Duckdb,
}

impl std::str::FromStr for StagingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "files" => Ok(StagingBackend::Files),
            "duckdb" => Ok(StagingBackend::Duckdb),
            other => Err(format!("unknown staging backend '{}', expected files or duckdb", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagingConfig {
    pub backend: StagingBackend,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Reset at startup; holds staging data, per-tag files and the manifest.
    pub work_dir: PathBuf,
    pub manifest_name: String,
}

impl OutputConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.work_dir.join(&self.manifest_name)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.work_dir.join("staging")
    }
}

#[derive(Clone)]
pub struct NotifyConfig {
    pub webhook_url: String,
    pub username: String,
    pub channel: String,
    pub icon_emoji: Option<String>,
    pub icon_url: Option<String>,
    /// Overrides the generated completion text.
    pub text: Option<String>,
}

impl NotifyConfig {
    /// Webhook URL as it may appear in logs: origin only, the path carries the secret.
    pub fn redacted_webhook(&self) -> String {
        match reqwest::Url::parse(&self.webhook_url) {
            Ok(url) if url.has_host() => format!("{}/…", url.origin().ascii_serialization()),
            _ => "…".to_string(),
        }
    }
}

impl std::fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyConfig")
            .field("webhook_url", &self.redacted_webhook())
            .field("username", &self.username)
            .field("channel", &self.channel)
            .field("icon_emoji", &self.icon_emoji)
            .field("icon_url", &self.icon_url)
            .field("text", &self.text)
            .finish()
    }
}

// ===== Config file shape =====

/// On-disk YAML. Every field is optional; command-line flags fill or override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub service: FileServiceConfig,
    pub window: FileWindowConfig,
    pub harvest: FileHarvestConfig,
    pub staging: FileStagingConfig,
    pub output: FileOutputConfig,
    pub notify: FileNotifyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileServiceConfig {
    pub token: Option<String>,
    pub account: Option<String>,
    pub base_url: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileWindowConfig {
    pub from: Option<String>,
    pub until: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileHarvestConfig {
    pub page_size: Option<u32>,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileStagingConfig {
    pub backend: Option<StagingBackend>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileOutputConfig {
    pub work_dir: Option<PathBuf>,
    pub manifest: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileNotifyConfig {
    pub webhook: Option<String>,
    pub username: Option<String>,
    pub channel: Option<String>,
    pub icon_emoji: Option<String>,
    pub icon_url: Option<String>,
    pub text: Option<String>,
}
