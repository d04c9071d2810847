//! MCP server implementation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::schemars::JsonSchema;
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};
use satbot_core::{BillingService, InterfaceError, InvoiceRecord, StoredCredentials};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
#[serde(rename_all = "camelCase")]
pub struct ConfigBillSettingsInput {
    #[schemars(description = "Path to the e.firma private key file (.key)")]
    #[serde(default)]
    pub private_key: Option<String>,

    #[schemars(description = "Path to the e.firma certificate file (.cer)")]
    #[serde(default)]
    pub certificate: Option<String>,

    #[schemars(description = "Password protecting the private key")]
    #[serde(default)]
    pub password: Option<String>,

    #[schemars(description = "Issuer RFC")]
    #[serde(default)]
    pub rfc: Option<String>,
}

impl From<ConfigBillSettingsInput> for StoredCredentials {
    fn from(input: ConfigBillSettingsInput) -> Self {
        Self {
            private_key: input.private_key,
            certificate: input.certificate,
            password: input.password,
            rfc: input.rfc,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GenerateBillInput {
    #[schemars(
        description = "Bill payload: rfc, razonSocial, codigoPostal, regimenFiscal, usoCFDI, \
                       concepto (line items), subtotal, impuestosTrasladados, \
                       impuestosRetenidos, total"
    )]
    pub bill: Value,
}

/// MCP front end over a [`BillingService`].
#[derive(Clone)]
pub struct SatbotMcpServer {
    service: BillingService,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SatbotMcpServer {
    pub fn new(service: BillingService) -> Self {
        Self { service, tool_router: Self::tool_router() }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tool_router.list_all().into_iter().map(|tool| tool.name.to_string()).collect()
    }

    pub async fn run_stdio(self) -> anyhow::Result<()> {
        info!(event_name = "satbot.mcp.start", "starting MCP server on stdio");

        let running = self.serve(rmcp::transport::stdio()).await?;
        let reason = running.waiting().await?;

        info!(event_name = "satbot.mcp.stopped", reason = ?reason, "MCP server stopped");
        Ok(())
    }

    #[tool(description = "Store e.firma credential paths, password and issuer RFC. \
                          Blank or omitted fields keep their stored values.")]
    pub async fn config_bill_settings(
        &self,
        Parameters(input): Parameters<ConfigBillSettingsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        debug!(event_name = "satbot.mcp.config_bill_settings", "config_bill_settings called");

        match self.service.update_credentials(input.into()).await {
            Ok(saved) => {
                let summary = json!({
                    "status": "saved",
                    "privateKey": saved.private_key,
                    "certificate": saved.certificate,
                    "passwordStored": saved.password.as_deref().is_some_and(|p| !p.is_empty()),
                    "rfc": saved.rfc,
                });
                Ok(CallToolResult::success(vec![Content::text(summary.to_string())]))
            }
            Err(error) => Ok(failure_result(&error)),
        }
    }

    #[tool(description = "Sign in to the SAT invoicing portal with the stored e.firma, fill \
                          the bill and return a screenshot of the result.")]
    pub async fn generate_bill(
        &self,
        Parameters(input): Parameters<GenerateBillInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let bill: InvoiceRecord = match serde_json::from_value(input.bill) {
            Ok(bill) => bill,
            Err(error) => {
                return Ok(CallToolResult::error(vec![Content::text(
                    json!({
                        "error_class": "bad_request",
                        "message": format!("invalid bill payload: {error}"),
                    })
                    .to_string(),
                )]));
            }
        };

        match self.service.generate_bill(bill).await {
            Ok(artifact) => {
                info!(
                    event_name = "satbot.mcp.bill_generated",
                    correlation_id = %artifact.run_id,
                    bytes = artifact.png.len(),
                    "bill generated"
                );
                Ok(CallToolResult::success(vec![Content::image(
                    STANDARD.encode(&artifact.png),
                    "image/png",
                )]))
            }
            Err(error) => Ok(failure_result(&error)),
        }
    }
}

#[tool_handler]
impl ServerHandler for SatbotMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Satbot MCP Server - SAT invoicing portal automation. Store e.firma settings \
                 with config_bill_settings, then call generate_bill with the bill payload."
                    .to_owned(),
            ),
            ..Default::default()
        }
    }
}

fn failure_result(error: &InterfaceError) -> CallToolResult {
    warn!(
        event_name = "satbot.mcp.tool_failed",
        correlation_id = %error.correlation_id(),
        error_class = error.class(),
        message = %error.message(),
        "tool call failed"
    );
    CallToolResult::error(vec![Content::text(
        json!({
            "error_class": error.class(),
            "message": error.message(),
            "user_message": error.user_message(),
            "correlation_id": error.correlation_id(),
        })
        .to_string(),
    )])
}

#[cfg(test)]
mod tests {
    use satbot_core::StoredCredentials;

    use super::ConfigBillSettingsInput;

    #[test]
    fn settings_input_accepts_camel_case_and_missing_fields() {
        let input: ConfigBillSettingsInput =
            match serde_json::from_str(r#"{"privateKey":"/keys/fiel.key","rfc":"GODE561231GR8"}"#)
            {
                Ok(input) => input,
                Err(error) => panic!("parse: {error}"),
            };

        let stored = StoredCredentials::from(input);
        assert_eq!(stored.private_key.as_deref(), Some("/keys/fiel.key"));
        assert_eq!(stored.certificate, None);
        assert_eq!(stored.password, None);
        assert_eq!(stored.rfc.as_deref(), Some("GODE561231GR8"));
    }
}
