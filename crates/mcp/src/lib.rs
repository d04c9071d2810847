//! Satbot MCP (Model Context Protocol) server.
//!
//! Exposes the two billing operations as MCP tools over stdio:
//!
//! - `config_bill_settings`: merge credential paths, password and RFC into
//!   the stored settings
//! - `generate_bill`: run the portal workflow for one bill and return the
//!   resulting screenshot as PNG image content
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use satbot_browser::ChromiumProvisioner;
//! use satbot_core::{AppConfig, BillingService, ConfigProvider, FailureLog, JsonFileCredentialStore};
//! use satbot_mcp::SatbotMcpServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let service = BillingService::new(
//!         ConfigProvider::new(config.clone()),
//!         Arc::new(JsonFileCredentialStore::new(config.storage.credentials_path.clone())),
//!         Arc::new(ChromiumProvisioner::new(&config)),
//!         FailureLog::new(),
//!     );
//!     SatbotMcpServer::new(service).run_stdio().await
//! }
//! ```

mod server;

pub use server::{ConfigBillSettingsInput, GenerateBillInput, SatbotMcpServer};
