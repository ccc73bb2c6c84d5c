use clap::Parser;
use logharvest::config::{ConfigOverrides, StagingBackend};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logharvest")]
#[command(about = "Download a time window of tagged log events into per-tag files", long_about = None)]
struct Cli {
    /// YAML config file (default: ~/.config/logharvest/config.yml, then /etc/logharvest/config.yml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// API token sent as a bearer credential
    #[arg(long, env = "LOGHARVEST_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Account (subdomain) of the log service
    #[arg(long, env = "LOGHARVEST_ACCOUNT")]
    account: Option<String>,

    /// Window start, RFC 3339 or local time in --timezone
    #[arg(long = "from-date", alias = "fromDate", env = "LOGHARVEST_FROM")]
    from_date: Option<String>,

    /// Window end, RFC 3339 or local time in --timezone
    #[arg(long = "to-date", alias = "toDate", env = "LOGHARVEST_TO")]
    to_date: Option<String>,

    /// Webhook URL notified when the run finishes
    #[arg(long, env = "LOGHARVEST_WEBHOOK", hide_env_values = true)]
    webhook: Option<String>,

    /// Offset used for window bounds without one, e.g. +09:00
    #[arg(long)]
    timezone: Option<String>,

    /// Log service API root [default: https://<account>.loggly.com/apiv2]
    #[arg(long)]
    base_url: Option<String>,

    /// Directory for staging, per-tag files and the manifest [default: tmp]
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Events requested per page [default: 1000]
    #[arg(long)]
    page_size: Option<u32>,

    /// Abort if a single tag needs more pages than this
    #[arg(long)]
    max_pages: Option<u32>,

    /// Where raw pages are staged: files or duckdb [default: files]
    #[arg(long)]
    staging: Option<StagingBackend>,

    /// Per-request timeout, e.g. 30s
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    request_timeout: Option<Duration>,
}

impl From<Cli> for ConfigOverrides {
    fn from(cli: Cli) -> Self {
        ConfigOverrides {
            token: cli.token,
            account: cli.account,
            from: cli.from_date,
            until: cli.to_date,
            timezone: cli.timezone,
            webhook: cli.webhook,
            base_url: cli.base_url,
            work_dir: cli.work_dir,
            page_size: cli.page_size,
            max_pages: cli.max_pages,
            staging: cli.staging,
            request_timeout: cli.request_timeout,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logharvest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut cli = Cli::parse();
    let config_path = cli.config.take();

    match logharvest::cli::run::run(config_path, cli.into()).await {
        Ok(summary) => {
            info!(
                tags = summary.tags,
                pages = summary.pages,
                events = summary.events,
                notified = summary.notified,
                "Done"
            );
        }
        Err(e) => {
            for line in e.diagnostics() {
                error!("{}", line);
            }
            std::process::exit(1);
        }
    }
}
