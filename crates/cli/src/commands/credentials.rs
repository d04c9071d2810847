use satbot_core::{LoadOptions, StoredCredentials};

use crate::commands::{billing_service, load_config, runtime, CommandResult};

pub fn run(options: &LoadOptions, update: StoredCredentials) -> CommandResult {
    let config = match load_config("credentials", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("credentials") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let (service, _browser) = billing_service(&config);
    match runtime.block_on(service.update_credentials(update)) {
        Ok(saved) => CommandResult::success(
            "credentials",
            format!(
                "stored credentials updated at {}: {}",
                config.storage.credentials_path.display(),
                summarize(&saved)
            ),
        ),
        Err(error) => CommandResult::from_interface("credentials", &error),
    }
}

fn summarize(stored: &StoredCredentials) -> String {
    let shown = |value: Option<&str>| value.unwrap_or("<unset>").to_string();
    let password = if stored.password.as_deref().is_some_and(|value| !value.is_empty()) {
        "<redacted>"
    } else {
        "<unset>"
    };
    format!(
        "certificate={} private_key={} password={} rfc={}",
        shown(stored.certificate.as_deref()),
        shown(stored.private_key.as_deref()),
        password,
        shown(stored.rfc.as_deref())
    )
}
