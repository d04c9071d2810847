use std::path::PathBuf;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::domain::credentials::CredentialBundle;
use crate::domain::invoice::InvoiceRecord;
use crate::errors::AutomationError;
use crate::form::FormInteractionEngine;
use crate::page::{id_prefix_selector, PageDriver};
use crate::retry::RetryOrchestrator;
use crate::validation::{CredentialFileMeta, PreflightInput, PreflightValidator};
use crate::workflow::resources::TempResourceSet;
use crate::workflow::steps::{fields, BillStep};

/// Result of a successful run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BillArtifact {
    #[serde(skip)]
    pub png: Vec<u8>,
    pub steps: Vec<BillStep>,
    pub run_id: String,
}

/// One invoice generation: sign in, optionally fill and verify the form,
/// optionally confirm the signature, then capture the page.
pub struct BillGenerationWorkflow {
    config: AppConfig,
    retry: RetryOrchestrator,
    validator: PreflightValidator,
}

struct CredentialPaths {
    certificate: PathBuf,
    private_key: PathBuf,
}

impl BillGenerationWorkflow {
    /// `config` is the snapshot the run uses from start to finish.
    pub fn new(config: AppConfig, retry: RetryOrchestrator) -> Self {
        Self { config, retry, validator: PreflightValidator::new() }
    }

    pub async fn run(
        &self,
        run_id: &str,
        page: Box<dyn PageDriver>,
        credentials: &CredentialBundle,
        invoice: &InvoiceRecord,
    ) -> Result<BillArtifact, AutomationError> {
        info!(
            event_name = "satbot.workflow.start",
            correlation_id = %run_id,
            plan = ?BillStep::plan(&self.config.workflow),
            "bill generation started"
        );

        let mut steps = Vec::new();
        let mut resources = TempResourceSet::new(self.retry.clone(), run_id);
        let engine = FormInteractionEngine::new(page, &self.config, self.retry.clone())
            .with_correlation_id(run_id);

        let outcome =
            self.execute(&engine, &mut resources, credentials, invoice, &mut steps).await;

        if let Err(close_error) = engine.close().await {
            warn!(
                event_name = "satbot.workflow.page_close_failed",
                correlation_id = %run_id,
                error = %close_error,
                "page could not be closed"
            );
        }
        let removed = resources.release();
        steps.push(BillStep::Cleanup);
        info!(
            event_name = "satbot.cleanup.completed",
            correlation_id = %run_id,
            removed,
            "temporary resources released"
        );

        match outcome {
            Ok(png) => {
                info!(
                    event_name = "satbot.workflow.completed",
                    correlation_id = %run_id,
                    bytes = png.len(),
                    "bill generation completed"
                );
                Ok(BillArtifact { png, steps, run_id: run_id.to_owned() })
            }
            Err(failure) => {
                let bill_data = serde_json::to_value(invoice).unwrap_or(Value::Null);
                self.retry.log_only(
                    &failure,
                    json!({ "run_id": run_id, "steps": steps, "bill_data": bill_data }),
                );
                error!(
                    event_name = "satbot.workflow.failed",
                    correlation_id = %run_id,
                    error = %failure,
                    "bill generation failed"
                );
                Err(failure.into_bill_generation())
            }
        }
    }

    async fn execute(
        &self,
        engine: &FormInteractionEngine,
        resources: &mut TempResourceSet,
        credentials: &CredentialBundle,
        invoice: &InvoiceRecord,
        steps: &mut Vec<BillStep>,
    ) -> Result<Vec<u8>, AutomationError> {
        let workflow = &self.config.workflow;

        if workflow.preflight {
            self.preflight(credentials, invoice).await?;
            steps.push(BillStep::Preflight);
        }

        let paths = self.register_resources(resources, credentials).await?;
        steps.push(BillStep::RegisterResources);

        let password = credentials.password();
        let paths = &paths;
        self.retry.run("sign_in", move |_| self.sign_in(engine, paths, password)).await?;
        steps.push(BillStep::SignIn);

        if workflow.fill_form {
            self.fill_form(engine, invoice).await?;
            steps.push(BillStep::FillForm);
            self.verify_totals(engine, invoice).await?;
            steps.push(BillStep::VerifyTotals);
        }

        if workflow.confirm_signature {
            self.confirm_signature(engine, paths, password).await?;
            steps.push(BillStep::ConfirmSignature);
        }

        let png = engine.capture_screenshot(true).await?;
        steps.push(BillStep::CaptureArtifact);
        Ok(png)
    }

    async fn preflight(
        &self,
        credentials: &CredentialBundle,
        invoice: &InvoiceRecord,
    ) -> Result<(), AutomationError> {
        let certificate = CredentialFileMeta::gather(&credentials.certificate_path).await?;
        let private_key = CredentialFileMeta::gather(&credentials.private_key_path).await?;

        self.validator.validate(PreflightInput {
            certificate: certificate.as_ref(),
            private_key: private_key.as_ref(),
            password: credentials.password(),
            invoice,
        })?;
        Ok(())
    }

    async fn register_resources(
        &self,
        resources: &mut TempResourceSet,
        credentials: &CredentialBundle,
    ) -> Result<CredentialPaths, AutomationError> {
        if !self.config.workflow.stage_credentials {
            resources.register(&credentials.certificate_path);
            resources.register(&credentials.private_key_path);
            return Ok(CredentialPaths {
                certificate: credentials.certificate_path.clone(),
                private_key: credentials.private_key_path.clone(),
            });
        }

        let certificate = resources.stage("certificate", &credentials.certificate_path).await?;
        let private_key = resources.stage("private_key", &credentials.private_key_path).await?;
        Ok(CredentialPaths { certificate, private_key })
    }

    async fn sign_in(
        &self,
        engine: &FormInteractionEngine,
        paths: &CredentialPaths,
        password: &str,
    ) -> Result<(), AutomationError> {
        let selectors = &self.config.selectors;

        engine.navigate(&self.config.urls.portal).await?;
        engine.click_element(&selectors.login_button).await?;
        engine.set_file_input(&selectors.certificate_input, &paths.certificate).await?;
        engine.set_file_input(&selectors.private_key_input, &paths.private_key).await?;
        engine.set_text_input(&selectors.password_input, password).await?;
        if self.config.workflow.submit_sign_in {
            engine.click_element(&selectors.submit_button).await?;
        }
        Ok(())
    }

    async fn fill_form(
        &self,
        engine: &FormInteractionEngine,
        invoice: &InvoiceRecord,
    ) -> Result<(), AutomationError> {
        let selectors = &self.config.selectors;

        engine.wait_for_element(&selectors.title_element, true).await?;
        engine.wait_for_page_load().await?;

        engine.set_autocomplete_input(fields::RFC, &invoice.rfc).await?;
        engine.set_autocomplete_input(fields::POSTAL_CODE, &invoice.postal_code).await?;
        engine.set_autocomplete_input(fields::FISCAL_REGIME, &invoice.fiscal_regime).await?;
        engine.set_autocomplete_input(fields::CFDI_USE, &invoice.cfdi_use).await?;

        let line = invoice.primary_line().ok_or_else(|| {
            AutomationError::Unknown("invoice has no line items".to_owned())
        })?;

        engine.click_element(&selectors.add_item_button).await?;
        engine.set_autocomplete_input(fields::DESCRIPTION, &line.description).await?;
        engine.set_autocomplete_input(fields::PRODUCT, &line.product_code).await?;
        engine.set_autocomplete_input(fields::UNIT, &line.unit_code).await?;

        let text_fields = [
            (fields::QUANTITY, line.quantity.to_string()),
            (fields::UNIT_VALUE, line.unit_value.to_string()),
            (fields::LINE_ID, line.line_id.to_string()),
        ];
        for (key, value) in &text_fields {
            engine.set_text_input(&id_prefix_selector(key), value).await?;
        }

        engine.set_select_input(fields::TAX, fields::FIXED_TAX_CODE).await?;
        engine.set_checkbox_input(fields::NO_TAX).await?;

        let tax_fields = [
            (fields::VAT, line.vat_amount.to_string()),
            (fields::VAT_WITHHELD, line.vat_withheld.to_string()),
            (fields::ISR_WITHHELD, line.isr_withheld.to_string()),
        ];
        for (key, value) in &tax_fields {
            engine.set_text_input(&id_prefix_selector(key), value).await?;
        }

        engine.click_element(&selectors.save_item_button).await?;
        Ok(())
    }

    /// Reads back all four totals and fails on the first that differs.
    async fn verify_totals(
        &self,
        engine: &FormInteractionEngine,
        invoice: &InvoiceRecord,
    ) -> Result<(), AutomationError> {
        let expected = invoice.expected_totals();
        let checks = [
            (fields::SUBTOTAL, expected.subtotal),
            (fields::TRANSFERRED_TOTAL, expected.transferred_taxes),
            (fields::WITHHELD_TOTAL, expected.withheld_taxes),
            (fields::TOTAL, expected.total),
        ];

        let mut mismatch = None;
        for (key, value) in checks {
            let matches = engine.check_result_input(key, &value).await;
            if !matches && mismatch.is_none() {
                mismatch = Some((key, value));
            }
        }

        match mismatch {
            None => Ok(()),
            Some((field, expected)) => {
                Err(AutomationError::TotalsMismatch { field: field.to_owned(), expected })
            }
        }
    }

    async fn confirm_signature(
        &self,
        engine: &FormInteractionEngine,
        paths: &CredentialPaths,
        password: &str,
    ) -> Result<(), AutomationError> {
        let selectors = &self.config.selectors;

        engine.click_element(&selectors.confirm_button).await?;
        engine.wait_for_element(&selectors.signature_form, true).await?;
        engine.wait_for_page_load().await?;

        engine.set_text_input(&selectors.password_input, password).await?;
        engine.set_file_input(&selectors.private_key_input, &paths.private_key).await?;
        engine.set_file_input(&selectors.certificate_input, &paths.certificate).await?;
        engine.click_element(&selectors.validate_ocsp_button).await?;

        engine.wait_for_page_load().await?;
        engine.click_element(&selectors.sign_button).await?;
        Ok(())
    }
}
