pub mod config;
pub mod domain;
pub mod errors;
pub mod failure_log;
pub mod form;
pub mod page;
pub mod retry;
pub mod service;
pub mod validation;
pub mod workflow;

pub use config::{AppConfig, ConfigError, ConfigProvider, LoadOptions, LogFormat, SnapshotUpdate};
pub use domain::credentials::{
    CredentialBundle, CredentialStore, CredentialStoreError, InMemoryCredentialStore,
    JsonFileCredentialStore, StoredCredentials,
};
pub use domain::invoice::{ExpectedTotals, InvoiceRecord, LineItem};
pub use errors::{AutomationError, InterfaceError, ValidationFailure};
pub use failure_log::{FailureLog, FailureLogEntry};
pub use form::FormInteractionEngine;
pub use page::{BrowserProvisioner, DomScript, ElementRef, PageDriver, PageError, ScriptedPage};
pub use retry::RetryOrchestrator;
pub use service::BillingService;
pub use validation::{CredentialFileMeta, PreflightInput, PreflightValidator};
pub use workflow::{BillArtifact, BillGenerationWorkflow, BillStep, TempResourceSet};
