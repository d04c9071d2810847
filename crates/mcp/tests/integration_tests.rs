//! Tool-level tests for the Satbot MCP server, run against the scripted page
//! and the in-memory credential store.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::ServerHandler;
use satbot_core::{
    AppConfig, AutomationError, BillingService, BrowserProvisioner, ConfigProvider, FailureLog,
    InMemoryCredentialStore, PageDriver, ScriptedPage, StoredCredentials,
};
use satbot_mcp::{ConfigBillSettingsInput, GenerateBillInput, SatbotMcpServer};
use serde_json::{json, Value};

struct ScriptedProvisioner {
    page: ScriptedPage,
}

#[async_trait]
impl BrowserProvisioner for ScriptedProvisioner {
    async fn create_page(&self) -> Result<Box<dyn PageDriver>, AutomationError> {
        Ok(Box::new(self.page.clone()))
    }
}

fn server_with(store: InMemoryCredentialStore, page: ScriptedPage) -> SatbotMcpServer {
    let mut config = AppConfig::default();
    config.retries.base_delay_ms = 1;
    SatbotMcpServer::new(BillingService::new(
        ConfigProvider::new(config),
        Arc::new(store),
        Arc::new(ScriptedProvisioner { page }),
        FailureLog::new(),
    ))
}

fn first_content(result: &CallToolResult) -> Value {
    result
        .content
        .first()
        .and_then(|content| serde_json::to_value(content).ok())
        .unwrap_or(Value::Null)
}

fn text_payload(result: &CallToolResult) -> Value {
    let content = first_content(result);
    let text = content["text"].as_str().unwrap_or_default();
    serde_json::from_str(text).unwrap_or(Value::Null)
}

fn bill() -> Value {
    json!({
        "rfc": "GODE561231GR8",
        "codigoPostal": "06600",
        "regimenFiscal": "612",
        "usoCFDI": "G03",
        "concepto": [{
            "descripcion": "Servicios de consultoría",
            "producto": "80111600",
            "unidad": "E48",
            "cantidad": "1",
            "valor": "7200",
            "id": 1,
            "impuesto": "02",
            "iva": "576",
            "retIva": "0",
            "retIsr": "473.76"
        }],
        "subtotal": "7200",
        "impuestosTrasladados": "576",
        "impuestosRetenidos": "473.76",
        "total": "7302.24"
    })
}

#[test]
fn server_lists_exactly_the_two_billing_tools() {
    let server = server_with(InMemoryCredentialStore::default(), ScriptedPage::new());

    let mut names = server.tool_names();
    names.sort();

    assert_eq!(names, vec!["config_bill_settings".to_owned(), "generate_bill".to_owned()]);
}

#[test]
fn server_info_advertises_tools() {
    let server = server_with(InMemoryCredentialStore::default(), ScriptedPage::new());

    let info = server.get_info();

    assert!(info.capabilities.tools.is_some());
    assert!(info.instructions.is_some_and(|text| text.contains("generate_bill")));
}

#[tokio::test]
async fn config_bill_settings_merges_into_store() {
    let store = InMemoryCredentialStore::new(StoredCredentials {
        password: Some("Secreto123".to_owned()),
        ..StoredCredentials::default()
    });
    let server = server_with(store.clone(), ScriptedPage::new());

    let result = server
        .config_bill_settings(Parameters(ConfigBillSettingsInput {
            private_key: Some("/keys/fiel.key".to_owned()),
            certificate: Some("/keys/fiel.cer".to_owned()),
            password: Some("   ".to_owned()),
            rfc: Some("GODE561231GR8".to_owned()),
        }))
        .await;

    let result = match result {
        Ok(result) => result,
        Err(error) => panic!("tool call failed: {error:?}"),
    };
    assert_ne!(result.is_error, Some(true));
    assert_eq!(text_payload(&result)["passwordStored"], true);

    let stored = store.snapshot();
    assert_eq!(stored.private_key.as_deref(), Some("/keys/fiel.key"));
    assert_eq!(stored.password.as_deref(), Some("Secreto123"));
    assert_eq!(stored.rfc.as_deref(), Some("GODE561231GR8"));
}

#[tokio::test]
async fn generate_bill_without_credentials_returns_error_result() {
    let page = ScriptedPage::new();
    let server = server_with(InMemoryCredentialStore::default(), page.clone());

    let result = match server.generate_bill(Parameters(GenerateBillInput { bill: bill() })).await {
        Ok(result) => result,
        Err(error) => panic!("tool call failed: {error:?}"),
    };

    assert_eq!(result.is_error, Some(true));
    let payload = text_payload(&result);
    assert_eq!(payload["error_class"], "bad_request");
    assert_eq!(payload["message"], "missing stored credential: certificate");
    assert!(payload["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(page.calls().is_empty());
}

#[tokio::test]
async fn generate_bill_rejects_malformed_payload() {
    let server = server_with(InMemoryCredentialStore::default(), ScriptedPage::new());

    let result = match server
        .generate_bill(Parameters(GenerateBillInput { bill: json!({ "rfc": 42 }) }))
        .await
    {
        Ok(result) => result,
        Err(error) => panic!("tool call failed: {error:?}"),
    };

    assert_eq!(result.is_error, Some(true));
    let payload = text_payload(&result);
    assert_eq!(payload["error_class"], "bad_request");
    assert!(payload["message"].as_str().is_some_and(|m| m.starts_with("invalid bill payload")));
}

#[tokio::test]
async fn generate_bill_returns_png_image_content() {
    let dir = match tempfile::TempDir::new() {
        Ok(dir) => dir,
        Err(error) => panic!("temp dir: {error}"),
    };
    let certificate = dir.path().join("fiel.cer");
    let private_key = dir.path().join("fiel.key");
    for path in [&certificate, &private_key] {
        if let Err(error) = std::fs::write(path, b"credential bytes") {
            panic!("write {}: {error}", path.display());
        }
    }
    let store = InMemoryCredentialStore::new(StoredCredentials {
        private_key: Some(private_key.display().to_string()),
        certificate: Some(certificate.display().to_string()),
        password: Some("Secreto123".to_owned()),
        rfc: Some("GODE561231GR8".to_owned()),
    });
    let server = server_with(store, ScriptedPage::new());

    let result = match server.generate_bill(Parameters(GenerateBillInput { bill: bill() })).await {
        Ok(result) => result,
        Err(error) => panic!("tool call failed: {error:?}"),
    };

    assert_ne!(result.is_error, Some(true));
    let image = first_content(&result);
    assert_eq!(image["type"], "image");
    assert_eq!(image["mimeType"], "image/png");
    assert!(image["data"].as_str().is_some_and(|data| !data.is_empty()));
}
