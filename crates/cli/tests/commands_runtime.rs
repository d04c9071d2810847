use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use satbot_cli::commands::{config, credentials, generate, validate};
use satbot_core::config::ConfigOverrides;
use satbot_core::{LoadOptions, StoredCredentials};
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn config_attributes_sources_and_redacts_password() {
    let dir = temp_dir();
    let store_path = dir.path().join("settings.json");
    write(
        &store_path,
        r#"{"privateKey":"/keys/fiel.key","certificate":"/keys/fiel.cer","password":"Secreto123"}"#,
    );

    with_env(
        &[
            ("SATBOT_PORTAL_URL", "https://portal.example.test/"),
            ("SATBOT_CREDENTIALS_PATH", &store_path.display().to_string()),
        ],
        || {
            let output = config::run(&LoadOptions::default());

            assert!(output.contains(
                "- urls.portal = https://portal.example.test/ (source: env (SATBOT_PORTAL_URL))"
            ));
            assert!(output.contains("- retries.max_attempts = 3 (source: default)"));
            assert!(output.contains("- credentials.password = <redacted>"));
            assert!(output.contains("- credentials.rfc = <unset>"));
            assert!(!output.contains("Secreto123"));
        },
    );
}

#[test]
fn config_reports_command_line_overrides() {
    let dir = temp_dir();
    with_env(&[], || {
        let options = LoadOptions {
            overrides: ConfigOverrides {
                portal_url: Some("https://override.example.test/".to_string()),
                credentials_path: Some(dir.path().join("absent.json")),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        };

        let output = config::run(&options);

        assert!(output.contains(
            "- urls.portal = https://override.example.test/ (source: override (command line))"
        ));
        assert!(output.contains("- credentials.password = <unset>"));
    });
}

#[test]
fn credentials_merges_updates_into_the_store_file() {
    let dir = temp_dir();
    let store_path = dir.path().join("settings.json");

    with_env(&[("SATBOT_CREDENTIALS_PATH", &store_path.display().to_string())], || {
        let first = credentials::run(
            &LoadOptions::default(),
            StoredCredentials {
                private_key: Some("/keys/fiel.key".to_string()),
                certificate: Some("/keys/fiel.cer".to_string()),
                password: Some("Secreto123".to_string()),
                rfc: None,
            },
        );
        assert_eq!(first.exit_code, 0, "expected first update to succeed");

        let second = credentials::run(
            &LoadOptions::default(),
            StoredCredentials {
                private_key: Some(String::new()),
                certificate: None,
                password: None,
                rfc: Some("GODE561231GR8".to_string()),
            },
        );
        assert_eq!(second.exit_code, 0, "expected second update to succeed");

        let payload = parse_payload(&second.output);
        assert_eq!(payload["command"], "credentials");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("password=<redacted>"));
        assert!(!message.contains("Secreto123"));

        let stored = parse_payload(&read(&store_path));
        assert_eq!(stored["privateKey"], "/keys/fiel.key");
        assert_eq!(stored["certificate"], "/keys/fiel.cer");
        assert_eq!(stored["password"], "Secreto123");
        assert_eq!(stored["rfc"], "GODE561231GR8");
    });
}

#[test]
fn validate_passes_with_stored_credentials_and_valid_bill() {
    let dir = temp_dir();
    let certificate = dir.path().join("fiel.cer");
    let private_key = dir.path().join("fiel.key");
    write(&certificate, "certificate");
    write(&private_key, "private key");
    let store_path = dir.path().join("settings.json");
    write(
        &store_path,
        &json!({
            "privateKey": private_key.display().to_string(),
            "certificate": certificate.display().to_string(),
            "password": "Secreto123",
        })
        .to_string(),
    );
    let bill_path = dir.path().join("bill.json");
    write(&bill_path, &bill("GODE561231GR8").to_string());

    with_env(&[("SATBOT_CREDENTIALS_PATH", &store_path.display().to_string())], || {
        let result = validate::run(&LoadOptions::default(), &bill_path);
        assert_eq!(result.exit_code, 0, "expected preflight to pass: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "validate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn validate_reports_every_preflight_violation() {
    let dir = temp_dir();
    let bill_path = dir.path().join("bill.json");
    write(&bill_path, &bill("ABC123456XYZ").to_string());
    let store_path = dir.path().join("absent.json");

    with_env(&[("SATBOT_CREDENTIALS_PATH", &store_path.display().to_string())], || {
        let result = validate::run(&LoadOptions::default(), &bill_path);
        assert_eq!(result.exit_code, 5, "expected preflight failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "preflight");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("validation failed: "));
        assert!(message.contains("Archivo de certificado es requerido"));
        assert!(message.contains("La contraseña es requerida"));
        assert!(message.contains("RFC inválido"));
    });
}

#[test]
fn validate_rejects_unparseable_bill() {
    let dir = temp_dir();
    let bill_path = dir.path().join("bill.json");
    write(&bill_path, "{ not json");

    with_env(&[], || {
        let result = validate::run(&LoadOptions::default(), &bill_path);
        assert_eq!(result.exit_code, 4, "expected bill input failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "bill_input");
    });
}

#[test]
fn generate_without_stored_credentials_is_a_bad_request() {
    let dir = temp_dir();
    let bill_path = dir.path().join("bill.json");
    write(&bill_path, &bill("GODE561231GR8").to_string());
    let out_path = dir.path().join("bill.png");
    let store_path = dir.path().join("absent.json");

    with_env(&[("SATBOT_CREDENTIALS_PATH", &store_path.display().to_string())], || {
        let result = generate::run(&LoadOptions::default(), &bill_path, &out_path);
        assert_eq!(result.exit_code, 5, "expected bad request code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "generate");
        assert_eq!(payload["error_class"], "bad_request");
        assert_eq!(payload["message"], "missing stored credential: certificate");
        assert!(payload["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(!out_path.exists());
    });
}

#[test]
fn generate_returns_config_failure_for_invalid_env() {
    let dir = temp_dir();
    let bill_path = dir.path().join("bill.json");
    write(&bill_path, &bill("GODE561231GR8").to_string());

    with_env(&[("SATBOT_RETRY_MAX_ATTEMPTS", "0")], || {
        let result =
            generate::run(&LoadOptions::default(), &bill_path, &dir.path().join("bill.png"));
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

fn bill(rfc: &str) -> Value {
    json!({
        "rfc": rfc,
        "codigoPostal": "06600",
        "regimenFiscal": "612",
        "usoCFDI": "G03",
        "concepto": [{
            "descripcion": "Servicios de consultoría",
            "producto": "80111600",
            "unidad": "E48",
            "cantidad": "1",
            "valor": "7200",
            "id": 1,
            "impuesto": "02",
            "iva": "576",
            "retIva": "0",
            "retIsr": "473.76"
        }],
        "subtotal": "7200",
        "impuestosTrasladados": "576",
        "impuestosRetenidos": "473.76",
        "total": "7302.24"
    })
}

fn temp_dir() -> TempDir {
    TempDir::new().expect("temp dir should be creatable")
}

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).expect("fixture should be writable");
}

fn read(path: &PathBuf) -> String {
    std::fs::read_to_string(path).expect("store file should exist")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SATBOT_PORTAL_URL",
        "SATBOT_TIMEOUT_PAGE_MS",
        "SATBOT_TIMEOUT_ELEMENT_MS",
        "SATBOT_TIMEOUT_NAVIGATION_MS",
        "SATBOT_RETRY_MAX_ATTEMPTS",
        "SATBOT_RETRY_BASE_DELAY_MS",
        "SATBOT_BROWSER_HEADLESS",
        "SATBOT_BROWSER_EXECUTABLE",
        "SATBOT_BROWSER_WS_URL",
        "SATBOT_WORKFLOW_PREFLIGHT",
        "SATBOT_WORKFLOW_FILL_FORM",
        "SATBOT_WORKFLOW_CONFIRM_SIGNATURE",
        "SATBOT_WORKFLOW_STAGE_CREDENTIALS",
        "SATBOT_CREDENTIALS_PATH",
        "SATBOT_LOGGING_LEVEL",
        "SATBOT_LOGGING_FORMAT",
        "SATBOT_LOG_LEVEL",
        "SATBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
