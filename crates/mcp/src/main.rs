//! Satbot MCP server binary.
//!
//! ```bash
//! # Defaults, satbot.toml in the working directory and SATBOT_* overrides
//! satbot-mcp
//!
//! # Explicit config file
//! SATBOT_CONFIG=/etc/satbot.toml satbot-mcp
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use satbot_browser::ChromiumProvisioner;
use satbot_core::config::{AppConfig, LoadOptions, LogFormat};
use satbot_core::{BillingService, ConfigProvider, FailureLog, JsonFileCredentialStore};
use satbot_mcp::SatbotMcpServer;
use tracing::{info, Level};

/// stdout carries the protocol, so logs go to stderr.
fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_max_level(log_level);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var_os("SATBOT_CONFIG").map(PathBuf::from);
    let options = LoadOptions {
        require_file: config_path.is_some(),
        config_path,
        ..LoadOptions::default()
    };
    let config = AppConfig::load(options)?;
    init_logging(&config);

    info!(
        event_name = "satbot.mcp.bootstrap",
        portal = %config.urls.portal,
        credentials_path = %config.storage.credentials_path.display(),
        "configuration loaded"
    );

    let browser = Arc::new(ChromiumProvisioner::new(&config));
    let service = BillingService::new(
        ConfigProvider::new(config.clone()),
        Arc::new(JsonFileCredentialStore::new(config.storage.credentials_path.clone())),
        browser.clone(),
        FailureLog::new(),
    );

    let outcome = SatbotMcpServer::new(service).run_stdio().await;
    browser.shutdown().await;
    outcome
}
