use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use satbot_core::page::WaitOptions;
use satbot_core::{DomScript, ElementRef, PageDriver, PageError};
use serde_json::Value;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

/// One browser tab. Elements are looked up again by selector on every call,
/// so an [`ElementRef`] survives re-renders of the node it points at.
pub struct ChromiumPage {
    page: Page,
    poll_interval: Duration,
}

impl ChromiumPage {
    pub fn new(page: Page, poll_interval: Duration) -> Self {
        Self { page, poll_interval }
    }

    async fn element(&self, element: &ElementRef) -> Result<Element, PageError> {
        self.page
            .find_element(element.selector.as_str())
            .await
            .map_err(|error| PageError::Protocol(format!("`{}`: {error}", element.selector)))
    }

    async fn evaluate_js(&self, script: String) -> Result<Value, PageError> {
        let result =
            self.page.evaluate(script).await.map_err(|error| PageError::Script(error.to_string()))?;
        result.into_value::<Value>().map_err(|error| PageError::Script(error.to_string()))
    }

    async fn is_visible(&self, selector: &str) -> bool {
        visible_or_pending(selector, self.evaluate_js(visibility_script(selector)).await)
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str, limit: Duration) -> Result<(), PageError> {
        match timeout(limit, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(error)) => {
                Err(PageError::Navigation { url: url.to_owned(), message: error.to_string() })
            }
            Err(_) => Err(PageError::Timeout {
                what: format!("navigation to `{url}`"),
                timeout_ms: millis(limit),
            }),
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        options: WaitOptions,
    ) -> Result<Option<ElementRef>, PageError> {
        let deadline = Instant::now() + options.timeout;
        loop {
            let found = self.page.find_element(selector).await.is_ok();
            if found && (!options.visible || self.is_visible(selector).await) {
                return Ok(Some(ElementRef::new(selector)));
            }
            if Instant::now() >= deadline {
                debug!(
                    event_name = "satbot.browser.selector_absent",
                    selector,
                    visible = options.visible,
                    "selector did not match before the deadline"
                );
                return Ok(None);
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn evaluate(&self, script: &DomScript) -> Result<Value, PageError> {
        self.evaluate_js(script.to_js()).await
    }

    async fn focus(&self, element: &ElementRef) -> Result<(), PageError> {
        self.element(element)
            .await?
            .focus()
            .await
            .map(|_| ())
            .map_err(|error| PageError::Protocol(error.to_string()))
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), PageError> {
        self.element(element)
            .await?
            .type_str(text)
            .await
            .map(|_| ())
            .map_err(|error| PageError::Protocol(error.to_string()))
    }

    async fn click(&self, element: &ElementRef) -> Result<(), PageError> {
        self.element(element)
            .await?
            .click()
            .await
            .map(|_| ())
            .map_err(|error| PageError::Protocol(error.to_string()))
    }

    async fn press(&self, element: &ElementRef, key: &str) -> Result<(), PageError> {
        self.element(element)
            .await?
            .press_key(key)
            .await
            .map(|_| ())
            .map_err(|error| PageError::Protocol(format!("key `{key}`: {error}")))
    }

    async fn select(&self, element: &ElementRef, value: &str) -> Result<(), PageError> {
        match self.evaluate_js(select_script(&element.selector, value)).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(PageError::Script(format!(
                "`{}` is not a select or has no option `{value}`",
                element.selector
            ))),
        }
    }

    async fn upload_file(&self, element: &ElementRef, path: &Path) -> Result<(), PageError> {
        let node = self.element(element).await?;
        let params = SetFileInputFilesParams::builder()
            .file(path.display().to_string())
            .backend_node_id(node.backend_node_id)
            .build()
            .map_err(PageError::Protocol)?;
        self.page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|error| PageError::Protocol(error.to_string()))
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, PageError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        self.page.screenshot(params).await.map_err(|error| PageError::Protocol(error.to_string()))
    }

    async fn close(&self) -> Result<(), PageError> {
        self.page.clone().close().await.map_err(|error| PageError::Protocol(error.to_string()))
    }
}

fn js_string(raw: &str) -> String {
    Value::String(raw.to_owned()).to_string()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn visibility_script(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
         const style = window.getComputedStyle(el); \
         return style.display !== 'none' && style.visibility !== 'hidden' \
         && el.getClientRects().length > 0; }})()",
        sel = js_string(selector)
    )
}

/// Picks the option whose value matches and fires `input` then `change`.
fn select_script(selector: &str, value: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         if (!el || !el.options) return false; \
         const option = Array.from(el.options).find(o => o.value === {val}); \
         if (!option) return false; \
         el.value = option.value; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
         return true; }})()",
        sel = js_string(selector),
        val = js_string(value)
    )
}

/// A failed visibility check (e.g. the execution context was replaced by a
/// navigation) counts as not visible yet.
fn visible_or_pending(selector: &str, outcome: Result<Value, PageError>) -> bool {
    match outcome {
        Ok(value) => value == Value::Bool(true),
        Err(error) => {
            debug!(
                event_name = "satbot.browser.visibility_pending",
                selector,
                error = %error,
                "visibility check failed, polling again"
            );
            false
        }
    }
}
