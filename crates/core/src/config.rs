use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub timeouts: TimeoutConfig,
    pub retries: RetryConfig,
    pub urls: UrlConfig,
    pub selectors: SelectorConfig,
    pub browser: BrowserConfig,
    pub workflow: WorkflowConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// All values are milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub page_ms: u64,
    pub element_ms: u64,
    pub navigation_ms: u64,
    pub poll_interval_ms: u64,
}

impl TimeoutConfig {
    pub fn page(&self) -> Duration {
        Duration::from_millis(self.page_ms)
    }

    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlConfig {
    pub portal: String,
}

/// CSS selectors for the invoicing portal. These are constants of one
/// specific site, not discovered at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub login_button: String,
    pub certificate_input: String,
    pub private_key_input: String,
    pub password_input: String,
    pub submit_button: String,
    pub title_element: String,
    pub add_item_button: String,
    pub save_item_button: String,
    pub confirm_button: String,
    pub signature_form: String,
    pub validate_ocsp_button: String,
    pub sign_button: String,
    pub autocomplete_menu: String,
    pub page_loaded_class: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub executable_path: Option<PathBuf>,
    pub websocket_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub preflight: bool,
    pub fill_form: bool,
    pub confirm_signature: bool,
    pub submit_sign_in: bool,
    pub stage_credentials: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub credentials_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub portal_url: Option<String>,
    pub log_level: Option<String>,
    pub headless: Option<bool>,
    pub credentials_path: Option<PathBuf>,
    pub preflight: Option<bool>,
    pub fill_form: Option<bool>,
    pub confirm_signature: Option<bool>,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig {
                page_ms: 30_000,
                element_ms: 10_000,
                navigation_ms: 15_000,
                poll_interval_ms: 100,
            },
            retries: RetryConfig { max_attempts: 3, base_delay_ms: 1_000 },
            urls: UrlConfig { portal: "https://portal.facturaelectronica.sat.gob.mx/".to_string() },
            selectors: SelectorConfig {
                login_button: "#buttonFiel".to_string(),
                certificate_input: "#fileCertificate".to_string(),
                private_key_input: "#filePrivateKey".to_string(),
                password_input: "#privateKeyPassword".to_string(),
                submit_button: "#submit".to_string(),
                title_element: "#tituloFI".to_string(),
                add_item_button: ".btnNewItem[entidad=\"1350001\"]".to_string(),
                save_item_button: ".btnAddItem[entidad='1350001']".to_string(),
                confirm_button: ".btn-sellar-factura[tabindex=\"2002\"]".to_string(),
                signature_form: "#formCFD".to_string(),
                validate_ocsp_button: "#btnValidaOSCP".to_string(),
                sign_button: "#btnFirmar".to_string(),
                autocomplete_menu: ".ui-menu.ui-widget.ui-widget-content.ui-autocomplete.ui-front"
                    .to_string(),
                page_loaded_class: "pace-done".to_string(),
            },
            browser: BrowserConfig {
                headless: false,
                window_width: 1080,
                window_height: 1024,
                executable_path: None,
                websocket_url: None,
            },
            workflow: WorkflowConfig {
                preflight: true,
                fill_form: false,
                confirm_signature: false,
                submit_sign_in: false,
                stage_credentials: true,
            },
            storage: StorageConfig { credentials_path: default_credentials_path() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn default_credentials_path() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".contabilizate-config.json")
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("satbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(timeouts) = patch.timeouts {
            if let Some(page_ms) = timeouts.page_ms {
                self.timeouts.page_ms = page_ms;
            }
            if let Some(element_ms) = timeouts.element_ms {
                self.timeouts.element_ms = element_ms;
            }
            if let Some(navigation_ms) = timeouts.navigation_ms {
                self.timeouts.navigation_ms = navigation_ms;
            }
            if let Some(poll_interval_ms) = timeouts.poll_interval_ms {
                self.timeouts.poll_interval_ms = poll_interval_ms;
            }
        }

        if let Some(retries) = patch.retries {
            if let Some(max_attempts) = retries.max_attempts {
                self.retries.max_attempts = max_attempts;
            }
            if let Some(base_delay_ms) = retries.base_delay_ms {
                self.retries.base_delay_ms = base_delay_ms;
            }
        }

        if let Some(urls) = patch.urls {
            if let Some(portal) = urls.portal {
                self.urls.portal = portal;
            }
        }

        if let Some(selectors) = patch.selectors {
            selectors.apply_to(&mut self.selectors);
        }

        if let Some(browser) = patch.browser {
            if let Some(headless) = browser.headless {
                self.browser.headless = headless;
            }
            if let Some(window_width) = browser.window_width {
                self.browser.window_width = window_width;
            }
            if let Some(window_height) = browser.window_height {
                self.browser.window_height = window_height;
            }
            if let Some(executable_path) = browser.executable_path {
                self.browser.executable_path = Some(executable_path);
            }
            if let Some(websocket_url) = browser.websocket_url {
                self.browser.websocket_url = Some(websocket_url);
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(preflight) = workflow.preflight {
                self.workflow.preflight = preflight;
            }
            if let Some(fill_form) = workflow.fill_form {
                self.workflow.fill_form = fill_form;
            }
            if let Some(confirm_signature) = workflow.confirm_signature {
                self.workflow.confirm_signature = confirm_signature;
            }
            if let Some(submit_sign_in) = workflow.submit_sign_in {
                self.workflow.submit_sign_in = submit_sign_in;
            }
            if let Some(stage_credentials) = workflow.stage_credentials {
                self.workflow.stage_credentials = stage_credentials;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(credentials_path) = storage.credentials_path {
                self.storage.credentials_path = credentials_path;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SATBOT_PORTAL_URL") {
            self.urls.portal = value;
        }

        if let Some(value) = read_env("SATBOT_TIMEOUT_PAGE_MS") {
            self.timeouts.page_ms = parse_u64("SATBOT_TIMEOUT_PAGE_MS", &value)?;
        }
        if let Some(value) = read_env("SATBOT_TIMEOUT_ELEMENT_MS") {
            self.timeouts.element_ms = parse_u64("SATBOT_TIMEOUT_ELEMENT_MS", &value)?;
        }
        if let Some(value) = read_env("SATBOT_TIMEOUT_NAVIGATION_MS") {
            self.timeouts.navigation_ms = parse_u64("SATBOT_TIMEOUT_NAVIGATION_MS", &value)?;
        }

        if let Some(value) = read_env("SATBOT_RETRY_MAX_ATTEMPTS") {
            self.retries.max_attempts = parse_u32("SATBOT_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("SATBOT_RETRY_BASE_DELAY_MS") {
            self.retries.base_delay_ms = parse_u64("SATBOT_RETRY_BASE_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("SATBOT_BROWSER_HEADLESS") {
            self.browser.headless = parse_bool("SATBOT_BROWSER_HEADLESS", &value)?;
        }
        if let Some(value) = read_env("SATBOT_BROWSER_EXECUTABLE") {
            self.browser.executable_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("SATBOT_BROWSER_WS_URL") {
            self.browser.websocket_url = Some(value);
        }

        if let Some(value) = read_env("SATBOT_WORKFLOW_PREFLIGHT") {
            self.workflow.preflight = parse_bool("SATBOT_WORKFLOW_PREFLIGHT", &value)?;
        }
        if let Some(value) = read_env("SATBOT_WORKFLOW_FILL_FORM") {
            self.workflow.fill_form = parse_bool("SATBOT_WORKFLOW_FILL_FORM", &value)?;
        }
        if let Some(value) = read_env("SATBOT_WORKFLOW_CONFIRM_SIGNATURE") {
            self.workflow.confirm_signature =
                parse_bool("SATBOT_WORKFLOW_CONFIRM_SIGNATURE", &value)?;
        }
        if let Some(value) = read_env("SATBOT_WORKFLOW_STAGE_CREDENTIALS") {
            self.workflow.stage_credentials =
                parse_bool("SATBOT_WORKFLOW_STAGE_CREDENTIALS", &value)?;
        }

        if let Some(value) = read_env("SATBOT_CREDENTIALS_PATH") {
            self.storage.credentials_path = PathBuf::from(value);
        }

        let log_level = read_env("SATBOT_LOGGING_LEVEL").or_else(|| read_env("SATBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SATBOT_LOGGING_FORMAT").or_else(|| read_env("SATBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(portal_url) = overrides.portal_url {
            self.urls.portal = portal_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(headless) = overrides.headless {
            self.browser.headless = headless;
        }
        if let Some(credentials_path) = overrides.credentials_path {
            self.storage.credentials_path = credentials_path;
        }
        if let Some(preflight) = overrides.preflight {
            self.workflow.preflight = preflight;
        }
        if let Some(fill_form) = overrides.fill_form {
            self.workflow.fill_form = fill_form;
        }
        if let Some(confirm_signature) = overrides.confirm_signature {
            self.workflow.confirm_signature = confirm_signature;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.retries.max_attempts = max_attempts;
        }
        if let Some(base_delay_ms) = overrides.base_delay_ms {
            self.retries.base_delay_ms = base_delay_ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_timeouts(&self.timeouts)?;
        validate_retries(&self.retries)?;
        validate_urls(&self.urls)?;
        validate_selectors(&self.selectors)?;
        validate_browser(&self.browser)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Shallow, section-level replacement applied by [`ConfigProvider::update`].
/// A present section replaces the canonical one wholesale.
#[derive(Clone, Debug, Default)]
pub struct SnapshotUpdate {
    pub timeouts: Option<TimeoutConfig>,
    pub retries: Option<RetryConfig>,
    pub urls: Option<UrlConfig>,
    pub selectors: Option<SelectorConfig>,
    pub browser: Option<BrowserConfig>,
    pub workflow: Option<WorkflowConfig>,
    pub storage: Option<StorageConfig>,
    pub logging: Option<LoggingConfig>,
}

/// Holds the one canonical configuration of the process.
///
/// `get` hands out an owned copy, so in-flight work keeps the snapshot it
/// captured even if `update` runs afterwards. `update` performs no
/// validation.
#[derive(Clone, Debug)]
pub struct ConfigProvider {
    canonical: Arc<RwLock<AppConfig>>,
}

impl ConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self { canonical: Arc::new(RwLock::new(config)) }
    }

    pub fn get(&self) -> AppConfig {
        match self.canonical.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, update: SnapshotUpdate) {
        let mut config = match self.canonical.write() {
            Ok(config) => config,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(timeouts) = update.timeouts {
            config.timeouts = timeouts;
        }
        if let Some(retries) = update.retries {
            config.retries = retries;
        }
        if let Some(urls) = update.urls {
            config.urls = urls;
        }
        if let Some(selectors) = update.selectors {
            config.selectors = selectors;
        }
        if let Some(browser) = update.browser {
            config.browser = browser;
        }
        if let Some(workflow) = update.workflow {
            config.workflow = workflow;
        }
        if let Some(storage) = update.storage {
            config.storage = storage;
        }
        if let Some(logging) = update.logging {
            config.logging = logging;
        }
    }
}

impl Default for ConfigProvider {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

/// The file `load` would read: the explicit path when it exists, otherwise the
/// first of `satbot.toml` and `config/satbot.toml` found.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("satbot.toml"), PathBuf::from("config/satbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_timeouts(timeouts: &TimeoutConfig) -> Result<(), ConfigError> {
    let fields = [
        ("timeouts.page_ms", timeouts.page_ms),
        ("timeouts.element_ms", timeouts.element_ms),
        ("timeouts.navigation_ms", timeouts.navigation_ms),
        ("timeouts.poll_interval_ms", timeouts.poll_interval_ms),
    ];
    for (name, value) in fields {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{name} must be greater than zero")));
        }
    }
    Ok(())
}

fn validate_retries(retries: &RetryConfig) -> Result<(), ConfigError> {
    if retries.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "retries.max_attempts must be at least 1".to_string(),
        ));
    }
    if retries.base_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "retries.base_delay_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_urls(urls: &UrlConfig) -> Result<(), ConfigError> {
    let portal = urls.portal.trim();
    if !portal.starts_with("http://") && !portal.starts_with("https://") {
        return Err(ConfigError::Validation(
            "urls.portal must start with http:// or https://".to_string(),
        ));
    }
    Ok(())
}

fn validate_selectors(selectors: &SelectorConfig) -> Result<(), ConfigError> {
    let fields = [
        ("selectors.login_button", &selectors.login_button),
        ("selectors.certificate_input", &selectors.certificate_input),
        ("selectors.private_key_input", &selectors.private_key_input),
        ("selectors.password_input", &selectors.password_input),
        ("selectors.submit_button", &selectors.submit_button),
        ("selectors.title_element", &selectors.title_element),
        ("selectors.add_item_button", &selectors.add_item_button),
        ("selectors.save_item_button", &selectors.save_item_button),
        ("selectors.confirm_button", &selectors.confirm_button),
        ("selectors.signature_form", &selectors.signature_form),
        ("selectors.validate_ocsp_button", &selectors.validate_ocsp_button),
        ("selectors.sign_button", &selectors.sign_button),
        ("selectors.autocomplete_menu", &selectors.autocomplete_menu),
        ("selectors.page_loaded_class", &selectors.page_loaded_class),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{name} must not be empty")));
        }
    }
    Ok(())
}

fn validate_browser(browser: &BrowserConfig) -> Result<(), ConfigError> {
    if browser.window_width == 0 || browser.window_height == 0 {
        return Err(ConfigError::Validation(
            "browser.window_width and browser.window_height must be greater than zero"
                .to_string(),
        ));
    }
    if let Some(url) = &browser.websocket_url {
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(ConfigError::Validation(
                "browser.websocket_url must start with ws:// or wss://".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    timeouts: Option<TimeoutPatch>,
    retries: Option<RetryPatch>,
    urls: Option<UrlPatch>,
    selectors: Option<SelectorPatch>,
    browser: Option<BrowserPatch>,
    workflow: Option<WorkflowPatch>,
    storage: Option<StoragePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TimeoutPatch {
    page_ms: Option<u64>,
    element_ms: Option<u64>,
    navigation_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct UrlPatch {
    portal: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SelectorPatch {
    login_button: Option<String>,
    certificate_input: Option<String>,
    private_key_input: Option<String>,
    password_input: Option<String>,
    submit_button: Option<String>,
    title_element: Option<String>,
    add_item_button: Option<String>,
    save_item_button: Option<String>,
    confirm_button: Option<String>,
    signature_form: Option<String>,
    validate_ocsp_button: Option<String>,
    sign_button: Option<String>,
    autocomplete_menu: Option<String>,
    page_loaded_class: Option<String>,
}

impl SelectorPatch {
    fn apply_to(self, selectors: &mut SelectorConfig) {
        let pairs = [
            (self.login_button, &mut selectors.login_button),
            (self.certificate_input, &mut selectors.certificate_input),
            (self.private_key_input, &mut selectors.private_key_input),
            (self.password_input, &mut selectors.password_input),
            (self.submit_button, &mut selectors.submit_button),
            (self.title_element, &mut selectors.title_element),
            (self.add_item_button, &mut selectors.add_item_button),
            (self.save_item_button, &mut selectors.save_item_button),
            (self.confirm_button, &mut selectors.confirm_button),
            (self.signature_form, &mut selectors.signature_form),
            (self.validate_ocsp_button, &mut selectors.validate_ocsp_button),
            (self.sign_button, &mut selectors.sign_button),
            (self.autocomplete_menu, &mut selectors.autocomplete_menu),
            (self.page_loaded_class, &mut selectors.page_loaded_class),
        ];
        for (patch, target) in pairs {
            if let Some(value) = patch {
                *target = value;
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct BrowserPatch {
    headless: Option<bool>,
    window_width: Option<u32>,
    window_height: Option<u32>,
    executable_path: Option<PathBuf>,
    websocket_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    preflight: Option<bool>,
    fill_form: Option<bool>,
    confirm_signature: Option<bool>,
    submit_sign_in: Option<bool>,
    stage_credentials: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    credentials_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, ConfigProvider, LoadOptions, LogFormat,
        RetryConfig, SnapshotUpdate,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_portal_constants() {
        let config = AppConfig::default();
        assert_eq!(config.timeouts.page_ms, 30_000);
        assert_eq!(config.timeouts.element_ms, 10_000);
        assert_eq!(config.timeouts.navigation_ms, 15_000);
        assert_eq!(config.retries.max_attempts, 3);
        assert_eq!(config.retries.base_delay_ms, 1_000);
        assert_eq!(config.selectors.login_button, "#buttonFiel");
        assert_eq!(config.selectors.page_loaded_class, "pace-done");
        assert!(!config.workflow.fill_form);
        assert!(!config.workflow.confirm_signature);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SATBOT_PORTAL", "https://portal.example.test/");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("satbot.toml");
            fs::write(
                &path,
                r##"
[urls]
portal = "${TEST_SATBOT_PORTAL}"

[selectors]
login_button = "#otherLogin"
"##,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.urls.portal == "https://portal.example.test/",
                "portal url should be interpolated from the environment",
            )?;
            ensure(
                config.selectors.login_button == "#otherLogin",
                "file selector should replace the default",
            )?;
            ensure(
                config.selectors.certificate_input == "#fileCertificate",
                "selectors absent from the file keep their defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SATBOT_PORTAL"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SATBOT_RETRY_MAX_ATTEMPTS", "5");
        env::set_var("SATBOT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("satbot.toml");
            fs::write(
                &path,
                r#"
[retries]
max_attempts = 2
base_delay_ms = 250

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.retries.max_attempts == 5, "env max attempts should win over file")?;
            ensure(config.retries.base_delay_ms == 250, "file base delay should win over default")?;
            ensure(config.logging.level == "debug", "override log level should win")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "env log format alias should be honored",
            )?;
            Ok(())
        })();

        clear_vars(&["SATBOT_RETRY_MAX_ATTEMPTS", "SATBOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn validation_rejects_zero_attempts() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { max_attempts: Some(0), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".into()),
            Err(error) => error,
        };

        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("max_attempts")),
            "validation failure should mention retries.max_attempts",
        )
    }

    #[test]
    fn invalid_env_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SATBOT_TIMEOUT_PAGE_MS", "soon");
        let result = AppConfig::load(LoadOptions::default());
        clear_vars(&["SATBOT_TIMEOUT_PAGE_MS"]);

        ensure(
            matches!(
                result,
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "SATBOT_TIMEOUT_PAGE_MS"
            ),
            "non-numeric timeout should be rejected",
        )
    }

    #[test]
    fn provider_hands_out_isolated_copies() {
        let provider = ConfigProvider::default();

        let mut copy = provider.get();
        copy.retries.max_attempts = 42;
        copy.urls.portal = "https://mutated.example/".to_string();

        let fresh = provider.get();
        assert_eq!(fresh.retries.max_attempts, 3);
        assert_eq!(fresh.urls.portal, "https://portal.facturaelectronica.sat.gob.mx/");
    }

    #[test]
    fn provider_update_replaces_whole_sections_without_validation() {
        let provider = ConfigProvider::default();
        let captured = provider.get();

        provider.update(SnapshotUpdate {
            retries: Some(RetryConfig { max_attempts: 0, base_delay_ms: 5 }),
            ..SnapshotUpdate::default()
        });

        let updated = provider.get();
        assert_eq!(updated.retries, RetryConfig { max_attempts: 0, base_delay_ms: 5 });
        assert_eq!(updated.timeouts, captured.timeouts);
        assert_eq!(captured.retries.max_attempts, 3, "earlier snapshot is unaffected");
        assert!(updated.validate().is_err(), "malformed values surface only when consumed");
    }
}
