use serde_json::Value;

/// In-page scripts the engine needs, rendered to JavaScript by [`to_js`].
///
/// Scripts that act on an element evaluate to `true` on success and `false`
/// when the selector matched nothing.
///
/// [`to_js`]: DomScript::to_js
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomScript {
    /// Assigns an empty value and fires `change`.
    ClearValue { selector: String },
    DispatchChange { selector: String },
    Click { selector: String },
    /// Evaluates to the element's `value`, or `null`.
    ReadValue { selector: String },
    BodyClassEquals { class: String },
    /// True when any match is not hidden with `display: none`.
    AnyVisible { selector: String },
}

impl DomScript {
    pub fn to_js(&self) -> String {
        match self {
            Self::ClearValue { selector } => format!(
                "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
                 el.value = ''; el.dispatchEvent(new Event('change')); return true; }})()",
                sel = js_string(selector)
            ),
            Self::DispatchChange { selector } => format!(
                "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
                 el.dispatchEvent(new Event('change')); return true; }})()",
                sel = js_string(selector)
            ),
            Self::Click { selector } => format!(
                "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
                 el.click(); return true; }})()",
                sel = js_string(selector)
            ),
            Self::ReadValue { selector } => format!(
                "(() => {{ const el = document.querySelector({sel}); \
                 return el ? el.value : null; }})()",
                sel = js_string(selector)
            ),
            Self::BodyClassEquals { class } => {
                format!("document.body.className.trim() === {}", js_string(class))
            }
            Self::AnyVisible { selector } => format!(
                "Array.from(document.querySelectorAll({sel})).some(el => el.style.display !== 'none')",
                sel = js_string(selector)
            ),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::ClearValue { selector } => format!("clear value of `{selector}`"),
            Self::DispatchChange { selector } => format!("change event on `{selector}`"),
            Self::Click { selector } => format!("click on `{selector}`"),
            Self::ReadValue { selector } => format!("value of `{selector}`"),
            Self::BodyClassEquals { class } => format!("body class `{class}`"),
            Self::AnyVisible { selector } => format!("visible `{selector}`"),
        }
    }
}

fn js_string(raw: &str) -> String {
    Value::String(raw.to_owned()).to_string()
}

#[cfg(test)]
mod tests {
    use super::DomScript;

    #[test]
    fn selectors_are_embedded_as_string_literals() {
        let script = DomScript::ReadValue { selector: "[id^=\"total\"]".to_owned() };
        assert!(script.to_js().contains(r#"document.querySelector("[id^=\"total\"]")"#));
    }

    #[test]
    fn body_class_check_trims_class_name() {
        let script = DomScript::BodyClassEquals { class: "pace-done".to_owned() };
        assert_eq!(script.to_js(), r#"document.body.className.trim() === "pace-done""#);
    }
}
