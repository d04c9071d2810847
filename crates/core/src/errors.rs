use std::path::PathBuf;

use thiserror::Error;

use crate::domain::credentials::CredentialStoreError;
use crate::page::PageError;

/// Every preflight violation found in one pass, in check order.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("validation failed: {}", .errors.join("; "))]
pub struct ValidationFailure {
    pub errors: Vec<String>,
}

impl ValidationFailure {
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }
}

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("element `{selector}` not found within {timeout_ms} ms")]
    ElementNotFound { selector: String, timeout_ms: u64 },
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error("total `{field}` does not match expected value `{expected}`")]
    TotalsMismatch { field: String, expected: String },
    #[error("missing stored credential: {0}")]
    MissingCredential(&'static str),
    #[error("browser connection failed: {0}")]
    BrowserConnection(String),
    #[error("failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    CredentialStore(#[from] CredentialStoreError),
    #[error("i/o failure on `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("failed to generate the bill: {source}")]
    BillGeneration { source: Box<AutomationError> },
    #[error("{0}")]
    Unknown(String),
}

impl AutomationError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Wraps a run failure in the generic bill-generation error. Validation
    /// failures pass through untouched.
    pub fn into_bill_generation(self) -> Self {
        match self {
            Self::Validation(_) | Self::BillGeneration { .. } => self,
            other => Self::BillGeneration { source: Box::new(other) },
        }
    }

    pub fn root_cause(&self) -> &AutomationError {
        match self {
            Self::BillGeneration { source } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self.root_cause() {
            Self::Validation(_)
            | Self::TotalsMismatch { .. }
            | Self::MissingCredential(_) => InterfaceError::BadRequest { message, correlation_id },
            Self::ElementNotFound { .. }
            | Self::BrowserConnection(_)
            | Self::RetriesExhausted { .. }
            | Self::Page(_) => InterfaceError::ServiceUnavailable { message, correlation_id },
            Self::CredentialStore(_)
            | Self::Io { .. }
            | Self::BillGeneration { .. }
            | Self::Unknown(_) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The invoicing portal did not respond as expected. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{AutomationError, InterfaceError, ValidationFailure};

    #[test]
    fn validation_failure_survives_bill_generation_wrapping() {
        let error = AutomationError::from(ValidationFailure::new(vec![
            "RFC inválido".to_owned(),
            "Código postal inválido".to_owned(),
        ]))
        .into_bill_generation();

        assert!(error.is_validation());
        assert_eq!(error.to_string(), "validation failed: RFC inválido; Código postal inválido");
    }

    #[test]
    fn wrapped_error_keeps_root_cause() {
        let error = AutomationError::ElementNotFound {
            selector: "#buttonFiel".to_owned(),
            timeout_ms: 10_000,
        }
        .into_bill_generation();

        assert!(error.to_string().starts_with("failed to generate the bill: "));
        assert!(matches!(error.root_cause(), AutomationError::ElementNotFound { .. }));
    }

    #[test]
    fn totals_mismatch_maps_to_bad_request() {
        let interface = AutomationError::TotalsMismatch {
            field: "total".to_owned(),
            expected: "7,302.24".to_owned(),
        }
        .into_bill_generation()
        .into_interface("run-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "run-1"
        ));
        assert!(interface.message().contains("7,302.24"));
    }

    #[test]
    fn exhausted_retries_map_to_service_unavailable() {
        let interface = AutomationError::RetriesExhausted {
            attempts: 3,
            message: "click intercepted".to_owned(),
        }
        .into_interface("run-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.class(), "service_unavailable");
        assert_eq!(
            interface.user_message(),
            "The invoicing portal did not respond as expected. Please retry shortly."
        );
    }

    #[test]
    fn unknown_error_maps_to_internal() {
        let interface = AutomationError::Unknown("boom".to_owned()).into_interface("run-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
