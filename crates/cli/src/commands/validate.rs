use std::path::{Path, PathBuf};

use satbot_core::{
    AutomationError, CredentialFileMeta, CredentialStore, JsonFileCredentialStore, LoadOptions,
    PreflightInput, PreflightValidator,
};

use crate::commands::{
    load_config, read_bill, runtime, CommandResult, EXIT_BAD_REQUEST, EXIT_INPUT,
};

/// Runs the preflight checks against the stored credentials without
/// opening a browser.
pub fn run(options: &LoadOptions, bill_path: &Path) -> CommandResult {
    let config = match load_config("validate", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let bill = match read_bill("validate", bill_path) {
        Ok(bill) => bill,
        Err(result) => return result,
    };
    let runtime = match runtime("validate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let store = JsonFileCredentialStore::new(config.storage.credentials_path.clone());
    let gathered = runtime.block_on(async {
        let stored = store.load().await?;
        let certificate = gather(stored.certificate.as_deref()).await?;
        let private_key = gather(stored.private_key.as_deref()).await?;
        Ok::<_, AutomationError>((stored, certificate, private_key))
    });
    let (stored, certificate, private_key) = match gathered {
        Ok(gathered) => gathered,
        Err(error) => {
            return CommandResult::failure(
                "validate",
                "credential_store",
                error.to_string(),
                EXIT_INPUT,
            );
        }
    };

    let outcome = PreflightValidator::new().validate(PreflightInput {
        certificate: certificate.as_ref(),
        private_key: private_key.as_ref(),
        password: stored.password.as_deref().unwrap_or_default(),
        invoice: &bill,
    });

    match outcome {
        Ok(()) => CommandResult::success("validate", format!("preflight passed for {}", bill.rfc)),
        Err(failure) => {
            CommandResult::failure("validate", "preflight", failure.to_string(), EXIT_BAD_REQUEST)
        }
    }
}

async fn gather(path: Option<&str>) -> Result<Option<CredentialFileMeta>, AutomationError> {
    match path.map(str::trim).filter(|path| !path.is_empty()) {
        Some(path) => CredentialFileMeta::gather(&PathBuf::from(path)).await,
        None => Ok(None),
    }
}
