pub mod config;
pub mod credentials;
pub mod generate;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use satbot_browser::ChromiumProvisioner;
use satbot_core::{
    AppConfig, BillingService, ConfigProvider, FailureLog, InterfaceError, InvoiceRecord,
    JsonFileCredentialStore, LoadOptions,
};
use serde::Serialize;
use tokio::runtime::Runtime;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_INPUT: u8 = 4;
pub const EXIT_BAD_REQUEST: u8 = 5;
pub const EXIT_UNAVAILABLE: u8 = 6;
pub const EXIT_INTERNAL: u8 = 7;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            correlation_id: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Failure reported by the billing service, keeping its class and
    /// correlation id.
    pub fn from_interface(command: &str, error: &InterfaceError) -> Self {
        let exit_code = match error {
            InterfaceError::BadRequest { .. } => EXIT_BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => EXIT_UNAVAILABLE,
            InterfaceError::Internal { .. } => EXIT_INTERNAL,
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error.class().to_string()),
            message: error.message().to_string(),
            correlation_id: Some(error.correlation_id().to_string()),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

pub(crate) fn load_config(command: &str, options: &LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// The service wired to the JSON credential file and a lazily started
/// Chromium. The provisioner is returned so the caller can shut it down.
pub(crate) fn billing_service(config: &AppConfig) -> (BillingService, Arc<ChromiumProvisioner>) {
    let browser = Arc::new(ChromiumProvisioner::new(config));
    let service = BillingService::new(
        ConfigProvider::new(config.clone()),
        Arc::new(JsonFileCredentialStore::new(config.storage.credentials_path.clone())),
        browser.clone(),
        FailureLog::new(),
    );
    (service, browser)
}

pub(crate) fn read_bill(command: &str, path: &Path) -> Result<InvoiceRecord, CommandResult> {
    let raw = std::fs::read_to_string(path).map_err(|error| {
        CommandResult::failure(
            command,
            "bill_input",
            format!("could not read bill `{}`: {error}", path.display()),
            EXIT_INPUT,
        )
    })?;
    serde_json::from_str(&raw).map_err(|error| {
        CommandResult::failure(
            command,
            "bill_input",
            format!("could not parse bill `{}`: {error}", path.display()),
            EXIT_INPUT,
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
