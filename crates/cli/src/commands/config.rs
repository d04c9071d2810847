use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use satbot_core::config::resolve_config_path;
use satbot_core::{AppConfig, CredentialStore, JsonFileCredentialStore, LoadOptions};
use toml::Value;

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    overridden: bool,
    value: String,
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string(),
    ];
    for field in fields(&config, options) {
        let source = if field.overridden {
            "override (command line)".to_string()
        } else {
            field_source(
                field.key_path,
                field.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            )
        };
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.extend(stored_credential_lines(&config.storage.credentials_path));
    lines.join("\n")
}

fn field(
    key_path: &'static str,
    env_keys: &'static [&'static str],
    overridden: bool,
    value: String,
) -> Field {
    Field { key_path, env_keys, overridden, value }
}

fn fields(config: &AppConfig, options: &LoadOptions) -> Vec<Field> {
    let overrides = &options.overrides;
    let optional_path = |path: Option<&PathBuf>| {
        path.map(|path| path.display().to_string()).unwrap_or_else(|| "<unset>".to_string())
    };

    vec![
        field(
            "urls.portal",
            &["SATBOT_PORTAL_URL"],
            overrides.portal_url.is_some(),
            config.urls.portal.clone(),
        ),
        field(
            "timeouts.page_ms",
            &["SATBOT_TIMEOUT_PAGE_MS"],
            false,
            config.timeouts.page_ms.to_string(),
        ),
        field(
            "timeouts.element_ms",
            &["SATBOT_TIMEOUT_ELEMENT_MS"],
            false,
            config.timeouts.element_ms.to_string(),
        ),
        field(
            "timeouts.navigation_ms",
            &["SATBOT_TIMEOUT_NAVIGATION_MS"],
            false,
            config.timeouts.navigation_ms.to_string(),
        ),
        field(
            "retries.max_attempts",
            &["SATBOT_RETRY_MAX_ATTEMPTS"],
            overrides.max_attempts.is_some(),
            config.retries.max_attempts.to_string(),
        ),
        field(
            "retries.base_delay_ms",
            &["SATBOT_RETRY_BASE_DELAY_MS"],
            overrides.base_delay_ms.is_some(),
            config.retries.base_delay_ms.to_string(),
        ),
        field(
            "browser.headless",
            &["SATBOT_BROWSER_HEADLESS"],
            overrides.headless.is_some(),
            config.browser.headless.to_string(),
        ),
        field(
            "browser.executable_path",
            &["SATBOT_BROWSER_EXECUTABLE"],
            false,
            optional_path(config.browser.executable_path.as_ref()),
        ),
        field(
            "browser.websocket_url",
            &["SATBOT_BROWSER_WS_URL"],
            false,
            config.browser.websocket_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        field(
            "workflow.preflight",
            &["SATBOT_WORKFLOW_PREFLIGHT"],
            overrides.preflight.is_some(),
            config.workflow.preflight.to_string(),
        ),
        field(
            "workflow.fill_form",
            &["SATBOT_WORKFLOW_FILL_FORM"],
            overrides.fill_form.is_some(),
            config.workflow.fill_form.to_string(),
        ),
        field(
            "workflow.confirm_signature",
            &["SATBOT_WORKFLOW_CONFIRM_SIGNATURE"],
            overrides.confirm_signature.is_some(),
            config.workflow.confirm_signature.to_string(),
        ),
        field(
            "workflow.stage_credentials",
            &["SATBOT_WORKFLOW_STAGE_CREDENTIALS"],
            false,
            config.workflow.stage_credentials.to_string(),
        ),
        field(
            "storage.credentials_path",
            &["SATBOT_CREDENTIALS_PATH"],
            overrides.credentials_path.is_some(),
            config.storage.credentials_path.display().to_string(),
        ),
        field(
            "logging.level",
            &["SATBOT_LOGGING_LEVEL", "SATBOT_LOG_LEVEL"],
            overrides.log_level.is_some(),
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["SATBOT_LOGGING_FORMAT", "SATBOT_LOG_FORMAT"],
            false,
            format!("{:?}", config.logging.format),
        ),
    ]
}

/// Stored settings, with the password never printed.
fn stored_credential_lines(path: &Path) -> Vec<String> {
    let source = format!("store ({})", path.display());
    let store = JsonFileCredentialStore::new(path);
    let loaded = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| error.to_string())
        .and_then(|runtime| {
            runtime.block_on(store.load()).map_err(|error| error.to_string())
        });

    let stored = match loaded {
        Ok(stored) => stored,
        Err(error) => return vec![format!("- credentials unavailable: {error}")],
    };

    let shown = |value: Option<&str>| match value {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => "<unset>".to_string(),
    };
    let password = match stored.password.as_deref() {
        Some(value) if !value.is_empty() => "<redacted>".to_string(),
        _ => "<unset>".to_string(),
    };

    vec![
        render_line("credentials.certificate", &shown(stored.certificate.as_deref()), source.clone()),
        render_line("credentials.private_key", &shown(stored.private_key.as_deref()), source.clone()),
        render_line("credentials.password", &password, source.clone()),
        render_line("credentials.rfc", &shown(stored.rfc.as_deref()), source),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use super::contains_path;

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: toml::Value = match "[browser]\nheadless = true\n".parse() {
            Ok(doc) => doc,
            Err(error) => panic!("parse: {error}"),
        };

        assert!(contains_path(&doc, "browser.headless"));
        assert!(!contains_path(&doc, "browser.executable_path"));
        assert!(!contains_path(&doc, "urls.portal"));
    }
}
