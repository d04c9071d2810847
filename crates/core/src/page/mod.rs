//! Contract for the remote page the automation drives.
//!
//! The core never talks to a browser directly. Everything goes through
//! [`PageDriver`], implemented by the Chromium adapter in `satbot-browser` and
//! by [`ScriptedPage`] in tests.

mod script;
mod scripted;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::errors::AutomationError;

pub use script::DomScript;
pub use scripted::{PageCall, ScriptedPage};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("timed out after {timeout_ms} ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },
    #[error("navigation to `{url}` failed: {message}")]
    Navigation { url: String, message: String },
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("page protocol error: {0}")]
    Protocol(String),
}

/// A resolved element, addressed by the selector that found it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementRef {
    pub selector: String,
}

impl ElementRef {
    pub fn new(selector: impl Into<String>) -> Self {
        Self { selector: selector.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitOptions {
    pub visible: bool,
    pub timeout: Duration,
}

/// `[id^="key"]`, the portal's field addressing scheme.
pub fn id_prefix_selector(key: &str) -> String {
    format!("[id^=\"{key}\"]")
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), PageError>;

    /// `Ok(None)` when the page settled without a match.
    async fn wait_for_selector(
        &self,
        selector: &str,
        options: WaitOptions,
    ) -> Result<Option<ElementRef>, PageError>;

    async fn evaluate(&self, script: &DomScript) -> Result<Value, PageError>;

    async fn focus(&self, element: &ElementRef) -> Result<(), PageError>;

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), PageError>;

    async fn click(&self, element: &ElementRef) -> Result<(), PageError>;

    async fn press(&self, element: &ElementRef, key: &str) -> Result<(), PageError>;

    async fn select(&self, element: &ElementRef, value: &str) -> Result<(), PageError>;

    async fn upload_file(&self, element: &ElementRef, path: &Path) -> Result<(), PageError>;

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, PageError>;

    async fn close(&self) -> Result<(), PageError> {
        Ok(())
    }

    /// Polls `script` until it evaluates to `true`.
    async fn wait_for_function(
        &self,
        script: &DomScript,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), PageError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.evaluate(script).await? == Value::Bool(true) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PageError::Timeout {
                    what: script.describe(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            sleep(poll_interval).await;
        }
    }
}

/// Hands out one fresh page per workflow run.
#[async_trait]
pub trait BrowserProvisioner: Send + Sync {
    async fn create_page(&self) -> Result<Box<dyn PageDriver>, AutomationError>;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::page::{id_prefix_selector, DomScript, PageDriver, PageError, ScriptedPage};

    #[test]
    fn id_prefix_selector_quotes_key() {
        assert_eq!(id_prefix_selector("concepto_cantidad"), "[id^=\"concepto_cantidad\"]");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_function_times_out_when_predicate_stays_false() {
        let page = ScriptedPage::new();
        page.set_body_class("pace-running");

        let result = page
            .wait_for_function(
                &DomScript::BodyClassEquals { class: "pace-done".to_owned() },
                Duration::from_millis(500),
                Duration::from_millis(100),
            )
            .await;

        assert!(matches!(result, Err(PageError::Timeout { timeout_ms: 500, .. })));
    }

    #[tokio::test]
    async fn wait_for_function_returns_once_predicate_holds() {
        let page = ScriptedPage::new();

        let result = page
            .wait_for_function(
                &DomScript::BodyClassEquals { class: "pace-done".to_owned() },
                Duration::from_millis(500),
                Duration::from_millis(100),
            )
            .await;

        assert!(result.is_ok());
    }
}
