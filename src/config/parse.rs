use super::types::*;
use super::window::{parse_instant, parse_reference_zone, TimeWindow, DEFAULT_REFERENCE_ZONE};
use crate::config::{expand_env_vars, expand_tilde, unexpanded_env_vars};
use crate::harvest::WORK_DIR_MARKER;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML in '{path}': {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl ConfigError {
    /// One diagnostic per offending parameter.
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            ConfigError::ValidationList(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Values supplied on the command line (or their environment fallbacks).
/// Any field set here wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub token: Option<String>,
    pub account: Option<String>,
    pub from: Option<String>,
    pub until: Option<String>,
    pub timezone: Option<String>,
    pub webhook: Option<String>,
    pub base_url: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub page_size: Option<u32>,
    pub max_pages: Option<u32>,
    pub staging: Option<StagingBackend>,
    pub request_timeout: Option<Duration>,
}

/// Load the optional config file, merge command-line overrides and validate.
pub fn load_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Config, ConfigError> {
    let file_config = match path {
        Some(path) => read_file_config(path)?,
        None => FileConfig::default(),
    };
    build_config(file_config, overrides)
}

pub fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let yaml_string = expand_env_vars(&yaml_string);
    check_unexpanded_vars(&yaml_string)?;

    if yaml_string.trim().is_empty() {
        return Ok(FileConfig::default());
    }

    serde_yaml::from_str(&yaml_string).map_err(|source| ConfigError::YamlParse {
        path: path.display().to_string(),
        source,
    })
}

fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let vars = unexpanded_env_vars(yaml_string);
    if vars.is_empty() {
        return Ok(());
    }
    Err(ConfigError::Validation(format!(
        "environment variables referenced by the config file are not set: {}",
        vars.join(", ")
    )))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Merge file and command-line values into a validated [`Config`].
///
/// Every problem is collected before failing so the user sees all of them at once.
pub fn build_config(file: FileConfig, overrides: ConfigOverrides) -> Result<Config, ConfigError> {
    let mut errors = Vec::new();

    let token = non_empty(overrides.token.or(file.service.token));
    if token.is_none() {
        errors.push("token is empty".to_string());
    }

    let account = non_empty(overrides.account.or(file.service.account));
    if account.is_none() {
        errors.push("account is empty".to_string());
    }

    let zone_input = overrides
        .timezone
        .or(file.window.timezone)
        .unwrap_or_else(|| DEFAULT_REFERENCE_ZONE.to_string());
    let zone = match parse_reference_zone(&zone_input) {
        Ok(zone) => Some(zone),
        Err(e) => {
            errors.push(format!("timezone: {}", e));
            None
        }
    };

    let mut bound = |name: &str, value: Option<String>| -> Option<chrono::DateTime<chrono::Utc>> {
        let Some(value) = non_empty(value) else {
            errors.push(format!("{} is empty", name));
            return None;
        };
        let zone = zone.as_ref()?;
        match parse_instant(&value, zone) {
            Ok(instant) => Some(instant),
            Err(e) => {
                errors.push(format!("{} parse error: {}", name, e));
                None
            }
        }
    };
    let from = bound("fromDate", overrides.from.or(file.window.from));
    let until = bound("toDate", overrides.until.or(file.window.until));

    let window = match (from, until) {
        (Some(from), Some(until)) => match TimeWindow::new(from, until) {
            Ok(window) => Some(window),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        },
        _ => None,
    };

    let webhook = non_empty(overrides.webhook.or(file.notify.webhook));
    match &webhook {
        None => errors.push("webhook is empty".to_string()),
        Some(url) => {
            if let Err(e) = check_http_url(url) {
                errors.push(format!("webhook: {}", e));
            }
        }
    }

    let base_url = non_empty(overrides.base_url.or(file.service.base_url));
    if let Some(url) = &base_url {
        if let Err(e) = check_http_url(url) {
            errors.push(format!("base_url: {}", e));
        }
    }

    let page_size = overrides
        .page_size
        .or(file.harvest.page_size)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        errors.push("page_size must be greater than 0".to_string());
    }

    let max_pages = overrides.max_pages.or(file.harvest.max_pages);
    if max_pages == Some(0) {
        errors.push("max_pages must be greater than 0 when set".to_string());
    }

    let manifest_name = file
        .output
        .manifest
        .unwrap_or_else(|| DEFAULT_MANIFEST_NAME.to_string());
    if manifest_name.is_empty()
        || manifest_name == "."
        || manifest_name == ".."
        || manifest_name == WORK_DIR_MARKER
        || manifest_name.contains(['/', '\\'])
    {
        errors.push(format!("manifest '{}' must be a plain file name", manifest_name));
    }

    let (Some(token), Some(account), Some(window), Some(webhook_url)) =
        (token, account, window, webhook)
    else {
        return Err(ConfigError::ValidationList(errors));
    };
    if !errors.is_empty() {
        return Err(ConfigError::ValidationList(errors));
    }

    let work_dir = overrides
        .work_dir
        .or(file.output.work_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));

    Ok(Config {
        service: ServiceConfig {
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| ServiceConfig::default_base_url(&account)),
            token,
            account,
            request_timeout: overrides.request_timeout.or(file.service.request_timeout),
        },
        window,
        harvest: HarvestConfig {
            page_size,
            max_pages,
        },
        staging: StagingConfig {
            backend: overrides.staging.or(file.staging.backend).unwrap_or_default(),
        },
        output: OutputConfig {
            work_dir: expand_tilde(&work_dir),
            manifest_name,
        },
        notify: NotifyConfig {
            webhook_url,
            username: file
                .notify
                .username
                .unwrap_or_else(|| DEFAULT_NOTIFY_USERNAME.to_string()),
            channel: file
                .notify
                .channel
                .unwrap_or_else(|| DEFAULT_NOTIFY_CHANNEL.to_string()),
            icon_emoji: non_empty(file.notify.icon_emoji),
            icon_url: non_empty(file.notify.icon_url),
            text: non_empty(file.notify.text),
        },
    })
}

fn check_http_url(value: &str) -> Result<(), String> {
    let url = reqwest::Url::parse(value).map_err(|e| format!("'{}' is not a URL: {}", value, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(format!("'{}' has unsupported scheme '{}'", value, scheme)),
    }
}
