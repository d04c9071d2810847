use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::errors::AutomationError;
use crate::retry::RetryOrchestrator;

/// Files one run created or took ownership of. Released exactly once, either
/// explicitly or when the set is dropped.
#[derive(Debug)]
pub struct TempResourceSet {
    paths: Vec<PathBuf>,
    staging_dir: Option<TempDir>,
    retry: RetryOrchestrator,
    correlation_id: String,
    released: bool,
}

impl TempResourceSet {
    pub fn new(retry: RetryOrchestrator, correlation_id: impl Into<String>) -> Self {
        Self {
            paths: Vec::new(),
            staging_dir: None,
            retry,
            correlation_id: correlation_id.into(),
            released: false,
        }
    }

    pub fn register(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Copies `source` into this run's owner-only staging directory as
    /// `<role>-<file name>` and registers the copy.
    pub async fn stage(&mut self, role: &str, source: &Path) -> Result<PathBuf, AutomationError> {
        let dir = match &self.staging_dir {
            Some(dir) => dir.path().to_path_buf(),
            None => {
                let created = create_staging_dir()?;
                let dir = created.path().to_path_buf();
                debug!(
                    event_name = "satbot.cleanup.staging_dir",
                    correlation_id = %self.correlation_id,
                    path = %dir.display(),
                    "staging directory created"
                );
                self.staging_dir = Some(created);
                dir
            }
        };

        let file_name = source.file_name().ok_or_else(|| {
            AutomationError::io(
                source,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;
        let mut staged_name = std::ffi::OsString::from(format!("{role}-"));
        staged_name.push(file_name);
        let target = dir.join(staged_name);

        tokio::fs::copy(source, &target)
            .await
            .map_err(|error| AutomationError::io(source, error))?;
        self.register(target.clone());
        restrict_to_owner(&target, 0o600)?;

        Ok(target)
    }

    /// Deletes every registered path and returns how many deletions were
    /// issued. Failures are logged, never raised. Later calls are no-ops.
    pub fn release(&mut self) -> usize {
        if self.released {
            return 0;
        }
        self.released = true;

        let issued = self.paths.len();
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(
                    event_name = "satbot.cleanup.removed",
                    correlation_id = %self.correlation_id,
                    path = %path.display(),
                    "temporary file removed"
                ),
                Err(error) => {
                    warn!(
                        event_name = "satbot.cleanup.failed",
                        correlation_id = %self.correlation_id,
                        path = %path.display(),
                        error = %error,
                        "temporary file could not be removed"
                    );
                    self.retry.log_only(&error, json!({ "file_path": path.display().to_string() }));
                }
            }
        }

        if let Some(dir) = self.staging_dir.take() {
            let path = dir.path().display().to_string();
            if let Err(error) = dir.close() {
                self.retry.log_only(&error, json!({ "file_path": path }));
            }
        }

        issued
    }
}

fn create_staging_dir() -> Result<TempDir, AutomationError> {
    let dir = tempfile::Builder::new()
        .prefix("satbot-")
        .tempdir()
        .map_err(|error| AutomationError::io(std::env::temp_dir(), error))?;
    restrict_to_owner(dir.path(), 0o700)?;
    Ok(dir)
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path, mode: u32) -> Result<(), AutomationError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|error| AutomationError::io(path, error))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path, _mode: u32) -> Result<(), AutomationError> {
    Ok(())
}

impl Drop for TempResourceSet {
    fn drop(&mut self) {
        self.release();
    }
}
