use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::page::{DomScript, ElementRef, PageDriver, PageError, WaitOptions};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageCall {
    Goto(String),
    WaitForSelector(String),
    Evaluate(DomScript),
    Focus(String),
    TypeText { selector: String, text: String },
    Click(String),
    Press { selector: String, key: String },
    Select { selector: String, value: String },
    UploadFile { selector: String, path: PathBuf },
    Screenshot { full_page: bool },
    Close,
}

#[derive(Debug)]
struct ScriptedState {
    calls: Vec<PageCall>,
    values: HashMap<String, String>,
    missing: HashSet<String>,
    failures: HashMap<String, u32>,
    goto_failures: u32,
    body_class: String,
    menu_visible: bool,
    screenshot: Vec<u8>,
}

impl Default for ScriptedState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            values: HashMap::new(),
            missing: HashSet::new(),
            failures: HashMap::new(),
            goto_failures: 0,
            body_class: "pace-done".to_owned(),
            menu_visible: true,
            screenshot: PNG_SIGNATURE.to_vec(),
        }
    }
}

impl ScriptedState {
    fn take_failure(&mut self, selector: &str) -> Result<(), PageError> {
        match self.failures.get_mut(selector) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(PageError::Protocol(format!("injected failure on `{selector}`")))
            }
            _ => Ok(()),
        }
    }

    fn present(&self, selector: &str) -> bool {
        !self.missing.contains(selector)
    }
}

/// In-memory page that records every call and answers from canned state.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another. Every selector resolves unless marked missing; operations on a
/// selector can be made to fail a fixed number of times.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPage {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptedState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_value(&self, selector: impl Into<String>, value: impl Into<String>) {
        self.state().values.insert(selector.into(), value.into());
    }

    pub fn value(&self, selector: &str) -> Option<String> {
        self.state().values.get(selector).cloned()
    }

    pub fn set_missing(&self, selector: impl Into<String>) {
        self.state().missing.insert(selector.into());
    }

    /// The next `times` operations touching `selector` fail.
    pub fn fail_next(&self, selector: impl Into<String>, times: u32) {
        self.state().failures.insert(selector.into(), times);
    }

    pub fn fail_next_goto(&self, times: u32) {
        self.state().goto_failures = times;
    }

    pub fn set_body_class(&self, class: impl Into<String>) {
        self.state().body_class = class.into();
    }

    pub fn set_menu_visible(&self, visible: bool) {
        self.state().menu_visible = visible;
    }

    pub fn set_screenshot(&self, bytes: Vec<u8>) {
        self.state().screenshot = bytes;
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.state().calls.clone()
    }

    pub fn clicks(&self, selector: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| match call {
                PageCall::Click(clicked) => clicked == selector,
                PageCall::Evaluate(DomScript::Click { selector: clicked }) => clicked == selector,
                _ => false,
            })
            .count()
    }

    fn element_op(&self, call: PageCall, selector: &str) -> Result<(), PageError> {
        let mut state = self.state();
        state.calls.push(call);
        state.take_failure(selector)
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), PageError> {
        let mut state = self.state();
        state.calls.push(PageCall::Goto(url.to_owned()));
        if state.goto_failures > 0 {
            state.goto_failures -= 1;
            return Err(PageError::Navigation {
                url: url.to_owned(),
                message: "net::ERR_CONNECTION_RESET".to_owned(),
            });
        }
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _options: WaitOptions,
    ) -> Result<Option<ElementRef>, PageError> {
        let mut state = self.state();
        state.calls.push(PageCall::WaitForSelector(selector.to_owned()));
        state.take_failure(selector)?;
        Ok(state.present(selector).then(|| ElementRef::new(selector)))
    }

    async fn evaluate(&self, script: &DomScript) -> Result<Value, PageError> {
        let mut state = self.state();
        state.calls.push(PageCall::Evaluate(script.clone()));

        let result = match script {
            DomScript::ClearValue { selector } => {
                state.take_failure(selector)?;
                if !state.present(selector) {
                    return Ok(Value::Bool(false));
                }
                state.values.insert(selector.clone(), String::new());
                Value::Bool(true)
            }
            DomScript::DispatchChange { selector } | DomScript::Click { selector } => {
                state.take_failure(selector)?;
                Value::Bool(state.present(selector))
            }
            DomScript::ReadValue { selector } => {
                state.take_failure(selector)?;
                if !state.present(selector) {
                    return Ok(Value::Null);
                }
                Value::String(state.values.get(selector).cloned().unwrap_or_default())
            }
            DomScript::BodyClassEquals { class } => Value::Bool(state.body_class.trim() == class),
            DomScript::AnyVisible { .. } => Value::Bool(state.menu_visible),
        };

        Ok(result)
    }

    async fn focus(&self, element: &ElementRef) -> Result<(), PageError> {
        self.element_op(PageCall::Focus(element.selector.clone()), &element.selector)
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), PageError> {
        self.element_op(
            PageCall::TypeText { selector: element.selector.clone(), text: text.to_owned() },
            &element.selector,
        )?;
        self.state().values.entry(element.selector.clone()).or_default().push_str(text);
        Ok(())
    }

    async fn click(&self, element: &ElementRef) -> Result<(), PageError> {
        self.element_op(PageCall::Click(element.selector.clone()), &element.selector)
    }

    async fn press(&self, element: &ElementRef, key: &str) -> Result<(), PageError> {
        self.element_op(
            PageCall::Press { selector: element.selector.clone(), key: key.to_owned() },
            &element.selector,
        )
    }

    async fn select(&self, element: &ElementRef, value: &str) -> Result<(), PageError> {
        self.element_op(
            PageCall::Select { selector: element.selector.clone(), value: value.to_owned() },
            &element.selector,
        )?;
        self.state().values.insert(element.selector.clone(), value.to_owned());
        Ok(())
    }

    async fn upload_file(&self, element: &ElementRef, path: &Path) -> Result<(), PageError> {
        self.element_op(
            PageCall::UploadFile { selector: element.selector.clone(), path: path.to_path_buf() },
            &element.selector,
        )
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, PageError> {
        let mut state = self.state();
        state.calls.push(PageCall::Screenshot { full_page });
        Ok(state.screenshot.clone())
    }

    async fn close(&self) -> Result<(), PageError> {
        self.state().calls.push(PageCall::Close);
        Ok(())
    }
}
