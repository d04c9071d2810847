use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ConfigProvider;
use crate::domain::credentials::{CredentialStore, StoredCredentials};
use crate::domain::invoice::InvoiceRecord;
use crate::errors::{AutomationError, InterfaceError};
use crate::failure_log::FailureLog;
use crate::page::BrowserProvisioner;
use crate::retry::RetryOrchestrator;
use crate::workflow::{BillArtifact, BillGenerationWorkflow};

/// The two operations exposed to callers: store credentials and generate a
/// bill. Errors come back as [`InterfaceError`] with a correlation id.
#[derive(Clone)]
pub struct BillingService {
    config: ConfigProvider,
    store: Arc<dyn CredentialStore>,
    browser: Arc<dyn BrowserProvisioner>,
    failures: FailureLog,
}

impl BillingService {
    pub fn new(
        config: ConfigProvider,
        store: Arc<dyn CredentialStore>,
        browser: Arc<dyn BrowserProvisioner>,
        failures: FailureLog,
    ) -> Self {
        Self { config, store, browser, failures }
    }

    pub fn config(&self) -> &ConfigProvider {
        &self.config
    }

    pub fn failure_log(&self) -> &FailureLog {
        &self.failures
    }

    /// Merges the non-blank fields of `update` into the stored record and
    /// persists it. Returns the record as saved.
    pub async fn update_credentials(
        &self,
        update: StoredCredentials,
    ) -> Result<StoredCredentials, InterfaceError> {
        let correlation_id = Uuid::new_v4().to_string();

        let mut stored = self
            .store
            .load()
            .await
            .map_err(|error| AutomationError::from(error).into_interface(&correlation_id))?;
        stored.merge(update);
        self.store
            .save(&stored)
            .await
            .map_err(|error| AutomationError::from(error).into_interface(&correlation_id))?;

        info!(
            event_name = "satbot.credentials.updated",
            correlation_id = %correlation_id,
            rfc = stored.rfc.as_deref().unwrap_or(""),
            "stored credentials updated"
        );
        Ok(stored)
    }

    pub async fn stored_credentials(&self) -> Result<StoredCredentials, InterfaceError> {
        let correlation_id = Uuid::new_v4().to_string();
        self.store
            .load()
            .await
            .map_err(|error| AutomationError::from(error).into_interface(correlation_id))
    }

    pub async fn generate_bill(&self, invoice: InvoiceRecord) -> Result<BillArtifact, InterfaceError> {
        let run_id = Uuid::new_v4().to_string();
        self.generate(&run_id, &invoice).await.map_err(|error| {
            warn!(
                event_name = "satbot.service.generate_failed",
                correlation_id = %run_id,
                error = %error,
                "generate bill request failed"
            );
            error.into_interface(&run_id)
        })
    }

    async fn generate(
        &self,
        run_id: &str,
        invoice: &InvoiceRecord,
    ) -> Result<BillArtifact, AutomationError> {
        let snapshot = self.config.get();
        let credentials = self.store.load().await?.to_bundle()?;
        let page = self.browser.create_page().await?;

        let retry = RetryOrchestrator::new(&snapshot.retries, self.failures.clone());
        BillGenerationWorkflow::new(snapshot, retry).run(run_id, page, &credentials, invoice).await
    }
}
