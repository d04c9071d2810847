use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::AutomationError;

/// Certificate, key and password for one sign-in. Their validity is only
/// established by the portal accepting them.
#[derive(Debug)]
pub struct CredentialBundle {
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
    pub password: SecretString,
}

impl CredentialBundle {
    pub fn new(
        certificate_path: impl Into<PathBuf>,
        private_key_path: impl Into<PathBuf>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            certificate_path: certificate_path.into(),
            private_key_path: private_key_path.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// The persisted record behind the "update stored credentials" operation.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfc: Option<String>,
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("private_key", &self.private_key)
            .field("certificate", &self.certificate)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("rfc", &self.rfc)
            .finish()
    }
}

impl StoredCredentials {
    /// Fields of `update` that are present and non-blank win.
    pub fn merge(&mut self, update: StoredCredentials) {
        fn take(target: &mut Option<String>, value: Option<String>) {
            if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
                *target = Some(value);
            }
        }

        take(&mut self.private_key, update.private_key);
        take(&mut self.certificate, update.certificate);
        take(&mut self.password, update.password);
        take(&mut self.rfc, update.rfc);
    }

    /// Requires certificate, private key and password to be stored.
    pub fn to_bundle(&self) -> Result<CredentialBundle, AutomationError> {
        let certificate = non_blank(&self.certificate)
            .ok_or(AutomationError::MissingCredential("certificate"))?;
        let private_key = non_blank(&self.private_key)
            .ok_or(AutomationError::MissingCredential("privateKey"))?;
        let password =
            non_blank(&self.password).ok_or(AutomationError::MissingCredential("password"))?;

        Ok(CredentialBundle::new(certificate, private_key, password))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("could not read credentials file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not write credentials file `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("credentials file `{path}` is not valid JSON: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("could not encode credentials: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<StoredCredentials, CredentialStoreError>;
    async fn save(&self, credentials: &StoredCredentials) -> Result<(), CredentialStoreError>;
}

/// Pretty-printed JSON at a fixed path. A missing file loads as empty.
#[derive(Clone, Debug)]
pub struct JsonFileCredentialStore {
    path: PathBuf,
}

impl JsonFileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for JsonFileCredentialStore {
    async fn load(&self) -> Result<StoredCredentials, CredentialStoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                return Ok(StoredCredentials::default())
            }
            Err(source) => {
                return Err(CredentialStoreError::Read { path: self.path.clone(), source })
            }
        };

        if raw.trim().is_empty() {
            return Ok(StoredCredentials::default());
        }

        serde_json::from_str(&raw)
            .map_err(|source| CredentialStoreError::Parse { path: self.path.clone(), source })
    }

    async fn save(&self, credentials: &StoredCredentials) -> Result<(), CredentialStoreError> {
        let encoded = serde_json::to_string_pretty(credentials)?;
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|source| CredentialStoreError::Write { path: self.path.clone(), source })
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCredentialStore {
    stored: Arc<Mutex<StoredCredentials>>,
}

impl InMemoryCredentialStore {
    pub fn new(initial: StoredCredentials) -> Self {
        Self { stored: Arc::new(Mutex::new(initial)) }
    }

    pub fn snapshot(&self) -> StoredCredentials {
        match self.stored.lock() {
            Ok(stored) => stored.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self) -> Result<StoredCredentials, CredentialStoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, credentials: &StoredCredentials) -> Result<(), CredentialStoreError> {
        match self.stored.lock() {
            Ok(mut stored) => *stored = credentials.clone(),
            Err(poisoned) => *poisoned.into_inner() = credentials.clone(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{CredentialStore, JsonFileCredentialStore, StoredCredentials};
    use crate::errors::AutomationError;

    fn stored(
        private_key: Option<&str>,
        certificate: Option<&str>,
        password: Option<&str>,
        rfc: Option<&str>,
    ) -> StoredCredentials {
        StoredCredentials {
            private_key: private_key.map(str::to_owned),
            certificate: certificate.map(str::to_owned),
            password: password.map(str::to_owned),
            rfc: rfc.map(str::to_owned),
        }
    }

    #[test]
    fn merge_ignores_absent_and_blank_fields() {
        let mut current =
            stored(Some("/keys/a.key"), Some("/keys/a.cer"), Some("secreto123"), Some("AAA"));

        current.merge(stored(None, Some("  "), Some("nuevoSecreto1"), Some("")));

        assert_eq!(
            current,
            stored(Some("/keys/a.key"), Some("/keys/a.cer"), Some("nuevoSecreto1"), Some("AAA"))
        );
    }

    #[test]
    fn debug_output_redacts_password() {
        let credentials = stored(None, None, Some("secreto123"), None);
        let rendered = format!("{credentials:?}");

        assert!(!rendered.contains("secreto123"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn bundle_requires_certificate_key_and_password() {
        let missing_key = stored(None, Some("/keys/a.cer"), Some("secreto123"), None);
        assert!(matches!(
            missing_key.to_bundle(),
            Err(AutomationError::MissingCredential("privateKey"))
        ));

        let complete = stored(Some("/keys/a.key"), Some("/keys/a.cer"), Some("secreto123"), None);
        match complete.to_bundle() {
            Ok(bundle) => {
                assert_eq!(bundle.password(), "secreto123");
                assert!(!format!("{bundle:?}").contains("secreto123"));
            }
            Err(error) => panic!("bundle should build: {error}"),
        }
    }

    #[tokio::test]
    async fn json_store_round_trips_with_camel_case_keys() -> Result<(), String> {
        let dir = TempDir::new().map_err(|error| error.to_string())?;
        let path = dir.path().join(".contabilizate-config.json");
        let store = JsonFileCredentialStore::new(&path);

        let empty = store.load().await.map_err(|error| error.to_string())?;
        assert_eq!(empty, StoredCredentials::default());

        let credentials = stored(Some("/keys/a.key"), Some("/keys/a.cer"), None, Some("AAA"));
        store.save(&credentials).await.map_err(|error| error.to_string())?;

        let raw = std::fs::read_to_string(&path).map_err(|error| error.to_string())?;
        assert!(raw.contains("\"privateKey\": \"/keys/a.key\""));
        assert!(!raw.contains("password"));

        let loaded = store.load().await.map_err(|error| error.to_string())?;
        assert_eq!(loaded, credentials);
        Ok(())
    }
}
