use crate::config::{load_config, resolve_config_path, Config, ConfigError, ConfigOverrides};
use crate::notify::{NotificationError, WebhookNotifier};
use crate::pipeline::{prepare_workspace, run_pipeline, PipelineError, RunSummary};
use crate::service::{LogServiceClient, RequestError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("service client error: {0}")]
    Client(#[from] RequestError),

    #[error("notifier setup error: {0}")]
    Notifier(#[from] NotificationError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl RunError {
    /// Lines to print before exiting; one per bad parameter for config errors.
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            RunError::Config(e) => e
                .diagnostics()
                .into_iter()
                .map(|line| format!("error: {}", line))
                .collect(),
            other => vec![format!("error: {}", other)],
        }
    }
}

fn log_parameters(config: &Config) {
    info!("token: {}", config.service.redacted_token());
    info!("account: {}", config.service.account);
    info!("fromDate: {}", config.window.from_param());
    info!("toDate: {}", config.window.until_param());
    info!("webhook: {}", config.notify.redacted_webhook());
    info!(
        base_url = %config.service.base_url,
        page_size = config.harvest.page_size,
        max_pages = ?config.harvest.max_pages,
        staging = ?config.staging.backend,
        work_dir = %config.output.work_dir.display(),
        "Resolved settings"
    );
}

pub async fn run(
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
) -> Result<RunSummary, RunError> {
    let config_path = resolve_config_path(config_path.as_deref());
    if let Some(path) = &config_path {
        info!(config_path = %path.display(), "Loading configuration");
    }

    let config = load_config(config_path.as_deref(), overrides)?;
    log_parameters(&config);

    let service = Arc::new(LogServiceClient::new(&config.service)?);
    let notifier = WebhookNotifier::new(&config.notify)?;

    let store = prepare_workspace(&config).await?;
    let summary = run_pipeline(&config, service, store, &notifier).await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_diagnostics_one_line_each() {
        let err = RunError::Config(ConfigError::ValidationList(vec![
            "token is empty".to_string(),
            "webhook is empty".to_string(),
        ]));
        assert_eq!(
            err.diagnostics(),
            vec!["error: token is empty", "error: webhook is empty"]
        );
    }

    #[tokio::test]
    async fn test_missing_flags_reported_together() {
        let dir = tempfile::TempDir::new().unwrap();
        let empty = dir.path().join("config.yml");
        std::fs::write(&empty, "").unwrap();

        let err = run(Some(empty), ConfigOverrides::default()).await.unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::ValidationList(_))));
        assert_eq!(err.diagnostics().len(), 5);
    }
}
