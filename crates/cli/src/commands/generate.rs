use std::path::Path;

use satbot_core::LoadOptions;
use tracing::info;

use crate::commands::{
    billing_service, load_config, read_bill, runtime, CommandResult, EXIT_INPUT,
};

pub fn run(options: &LoadOptions, bill_path: &Path, out_path: &Path) -> CommandResult {
    let config = match load_config("generate", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let bill = match read_bill("generate", bill_path) {
        Ok(bill) => bill,
        Err(result) => return result,
    };
    let runtime = match runtime("generate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let (service, browser) = billing_service(&config);
    let outcome = runtime.block_on(async {
        let outcome = service.generate_bill(bill).await;
        browser.shutdown().await;
        outcome
    });

    let artifact = match outcome {
        Ok(artifact) => artifact,
        Err(error) => return CommandResult::from_interface("generate", &error),
    };

    if let Err(error) = std::fs::write(out_path, &artifact.png) {
        return CommandResult::failure(
            "generate",
            "artifact_write",
            format!("could not write `{}`: {error}", out_path.display()),
            EXIT_INPUT,
        );
    }

    info!(
        event_name = "satbot.cli.artifact_written",
        correlation_id = %artifact.run_id,
        path = %out_path.display(),
        bytes = artifact.png.len(),
        "bill screenshot written"
    );
    CommandResult::success(
        "generate",
        format!("bill screenshot written to {} (run {})", out_path.display(), artifact.run_id),
    )
}
