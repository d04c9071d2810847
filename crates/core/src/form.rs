//! Primitive DOM operations against the one page of a workflow run.
//!
//! Each primitive is attempted once directly. If that fails, the same
//! operation is handed to the [`RetryOrchestrator`], so a primitive makes up to
//! `1 + max_attempts` physical attempts before its step fails.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::config::{AppConfig, SelectorConfig, TimeoutConfig};
use crate::errors::AutomationError;
use crate::page::{id_prefix_selector, DomScript, ElementRef, PageDriver, PageError, WaitOptions};
use crate::retry::RetryOrchestrator;

pub struct FormInteractionEngine {
    page: Box<dyn PageDriver>,
    retry: RetryOrchestrator,
    timeouts: TimeoutConfig,
    selectors: SelectorConfig,
    correlation_id: String,
}

impl FormInteractionEngine {
    pub fn new(page: Box<dyn PageDriver>, config: &AppConfig, retry: RetryOrchestrator) -> Self {
        Self {
            page,
            retry,
            timeouts: config.timeouts.clone(),
            selectors: config.selectors.clone(),
            correlation_id: String::from("unassigned"),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    async fn with_policy<T, F, Fut>(&self, operation: &str, mut action: F) -> Result<T, AutomationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AutomationError>>,
    {
        match action().await {
            Ok(value) => Ok(value),
            Err(error) => {
                debug!(
                    event_name = "satbot.form.direct_attempt_failed",
                    correlation_id = %self.correlation_id,
                    operation,
                    error = %error,
                    "direct attempt failed, handing over to retry policy"
                );
                self.retry.run(operation, |_| action()).await
            }
        }
    }

    /// Waits up to the element timeout for `selector` to resolve.
    pub async fn wait_for_element(
        &self,
        selector: &str,
        visible: bool,
    ) -> Result<ElementRef, AutomationError> {
        let limit = self.timeouts.element();
        let options = WaitOptions { visible, timeout: limit };

        let error = match timeout(limit, self.page.wait_for_selector(selector, options)).await {
            Ok(Ok(Some(element))) => return Ok(element),
            Ok(Ok(None)) | Ok(Err(PageError::Timeout { .. })) | Err(_) => {
                AutomationError::ElementNotFound {
                    selector: selector.to_owned(),
                    timeout_ms: self.timeouts.element_ms,
                }
            }
            Ok(Err(other)) => AutomationError::Page(other),
        };

        self.retry.log_only(&error, json!({ "selector": selector, "visible": visible }));
        Err(error)
    }

    pub async fn click_element(&self, selector: &str) -> Result<(), AutomationError> {
        self.with_policy("click_element", move || async move {
            let element = self.wait_for_element(selector, true).await?;
            sleep(self.retry.base_delay()).await;
            self.page.click(&element).await?;
            Ok(())
        })
        .await
    }

    pub async fn set_text_input(&self, selector: &str, value: &str) -> Result<(), AutomationError> {
        self.with_policy("set_text_input", move || self.type_into(selector, value)).await
    }

    pub async fn set_file_input(&self, selector: &str, path: &Path) -> Result<(), AutomationError> {
        self.with_policy("set_file_input", move || async move {
            let element = self.wait_for_element(selector, true).await?;
            self.page.upload_file(&element, path).await?;
            Ok(())
        })
        .await
    }

    /// Types into the field whose id starts with `key`, then picks the first
    /// suggestion from the autocomplete menu.
    pub async fn set_autocomplete_input(&self, key: &str, value: &str) -> Result<(), AutomationError> {
        let selector = id_prefix_selector(key);
        let selector = selector.as_str();

        self.with_policy("set_autocomplete_input", move || async move {
            self.type_into(selector, value).await?;
            self.wait_for_autocomplete_menu().await?;
            let element = self.wait_for_element(selector, true).await?;
            self.page.press(&element, "ArrowDown").await?;
            self.page.press(&element, "Enter").await?;
            self.run_element_script(DomScript::DispatchChange { selector: selector.to_owned() })
                .await
        })
        .await
    }

    pub async fn set_select_input(&self, key: &str, value: &str) -> Result<(), AutomationError> {
        let selector = id_prefix_selector(key);
        let selector = selector.as_str();

        self.with_policy("set_select_input", move || async move {
            let element = self.wait_for_element(selector, true).await?;
            self.page.select(&element, value).await?;
            Ok(())
        })
        .await
    }

    /// Toggles by an in-page click. Does not wait for the element first.
    pub async fn set_checkbox_input(&self, key: &str) -> Result<(), AutomationError> {
        let selector = id_prefix_selector(key);
        let selector = selector.as_str();

        self.with_policy("set_checkbox_input", move || {
            self.run_element_script(DomScript::Click { selector: selector.to_owned() })
        })
        .await
    }

    /// Exact string comparison of the field's current value. Read failures
    /// are logged and count as a mismatch.
    pub async fn check_result_input(&self, key: &str, expected: &str) -> bool {
        let selector = id_prefix_selector(key);

        let failure = match self.page.evaluate(&DomScript::ReadValue { selector: selector.clone() }).await {
            Ok(Value::String(actual)) => {
                let matches = actual == expected;
                if !matches {
                    debug!(
                        event_name = "satbot.form.result_mismatch",
                        correlation_id = %self.correlation_id,
                        key,
                        expected,
                        actual = %actual,
                        "result field differs from expected value"
                    );
                }
                return matches;
            }
            Ok(_) => AutomationError::ElementNotFound { selector, timeout_ms: 0 },
            Err(error) => AutomationError::Page(error),
        };

        self.retry.log_only(&failure, json!({ "key": key, "expected_value": expected }));
        false
    }

    /// Waits until the body carries exactly the load-complete class.
    pub async fn wait_for_page_load(&self) -> Result<(), AutomationError> {
        let script = DomScript::BodyClassEquals { class: self.selectors.page_loaded_class.clone() };
        self.page
            .wait_for_function(&script, self.timeouts.page(), self.timeouts.poll_interval())
            .await?;
        Ok(())
    }

    pub async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        let limit = self.timeouts.navigation();
        debug!(event_name = "satbot.form.navigate", correlation_id = %self.correlation_id, url);

        match timeout(limit, self.page.goto(url, limit)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AutomationError::Page(PageError::Timeout {
                what: format!("navigation to `{url}`"),
                timeout_ms: self.timeouts.navigation_ms,
            })),
        }
    }

    pub async fn capture_screenshot(&self, full_page: bool) -> Result<Vec<u8>, AutomationError> {
        Ok(self.page.screenshot(full_page).await?)
    }

    pub async fn close(&self) -> Result<(), AutomationError> {
        Ok(self.page.close().await?)
    }

    async fn type_into(&self, selector: &str, value: &str) -> Result<(), AutomationError> {
        let element = self.wait_for_element(selector, true).await?;
        self.page.focus(&element).await?;
        self.run_element_script(DomScript::ClearValue { selector: selector.to_owned() }).await?;
        self.page.type_text(&element, value).await?;
        Ok(())
    }

    /// Polls until a menu is visible, bounded by the element timeout.
    async fn wait_for_autocomplete_menu(&self) -> Result<(), AutomationError> {
        let menu = &self.selectors.autocomplete_menu;
        let script = DomScript::AnyVisible { selector: menu.clone() };

        match self
            .page
            .wait_for_function(&script, self.timeouts.element(), self.poll_interval())
            .await
        {
            Ok(()) => Ok(()),
            Err(PageError::Timeout { .. }) => Err(AutomationError::ElementNotFound {
                selector: menu.clone(),
                timeout_ms: self.timeouts.element_ms,
            }),
            Err(other) => Err(AutomationError::Page(other)),
        }
    }

    async fn run_element_script(&self, script: DomScript) -> Result<(), AutomationError> {
        match self.page.evaluate(&script).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(AutomationError::Page(PageError::Script(format!(
                "{} matched no element",
                script.describe()
            )))),
        }
    }

    fn poll_interval(&self) -> Duration {
        self.timeouts.poll_interval()
    }
}
