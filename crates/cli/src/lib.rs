pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use satbot_core::config::ConfigOverrides;
use satbot_core::{AppConfig, LoadOptions, LogFormat, StoredCredentials};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(
    name = "satbot",
    about = "Satbot operator CLI",
    long_about = "Inspect configuration, store e.firma settings, preflight bills, and generate \
                  bills on the SAT invoicing portal.",
    after_help = "Examples:\n  satbot config\n  satbot credentials --certificate fiel.cer \
                  --private-key fiel.key --password '...'\n  satbot validate --bill bill.json\n  \
                  satbot generate --bill bill.json --out bill.png"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Config file to load instead of satbot.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the portal URL")]
    portal_url: Option<String>,
    #[arg(long, global = true, help = "Override the log level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override the credentials file location")]
    credentials_path: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Merge credential paths, password and RFC into the stored settings")]
    Credentials {
        #[arg(long, help = "Path to the e.firma certificate (.cer)")]
        certificate: Option<String>,
        #[arg(long, help = "Path to the e.firma private key (.key)")]
        private_key: Option<String>,
        #[arg(long, help = "Password protecting the private key")]
        password: Option<String>,
        #[arg(long, help = "Issuer RFC")]
        rfc: Option<String>,
    },
    #[command(about = "Run preflight validation for a bill without opening a browser")]
    Validate {
        #[arg(long, help = "Bill JSON file")]
        bill: PathBuf,
    },
    #[command(about = "Generate a bill on the portal and save the final screenshot")]
    Generate {
        #[arg(long, help = "Bill JSON file")]
        bill: PathBuf,
        #[arg(long, default_value = "bill.png", help = "Where to write the PNG screenshot")]
        out: PathBuf,
        #[arg(long, help = "Run the browser without a window")]
        headless: bool,
        #[arg(long, help = "Fill the invoice form and verify totals")]
        fill_form: bool,
        #[arg(long, requires = "fill_form", help = "Confirm and sign the invoice")]
        confirm_signature: bool,
        #[arg(long, help = "Skip preflight validation")]
        skip_preflight: bool,
    },
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                portal_url: self.portal_url.clone(),
                log_level: self.log_level.clone(),
                credentials_path: self.credentials_path.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let mut options = cli.global.load_options();
    init_logging(&options);

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Credentials { certificate, private_key, password, rfc } => {
            commands::credentials::run(
                &options,
                StoredCredentials { private_key, certificate, password, rfc },
            )
        }
        Command::Validate { bill } => commands::validate::run(&options, &bill),
        Command::Generate {
            bill,
            out,
            headless,
            fill_form,
            confirm_signature,
            skip_preflight,
        } => {
            let overrides = &mut options.overrides;
            overrides.headless = headless.then_some(true);
            overrides.fill_form = fill_form.then_some(true);
            overrides.confirm_signature = confirm_signature.then_some(true);
            overrides.preflight = skip_preflight.then_some(false);
            commands::generate::run(&options, &bill, &out)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON outcome.
fn init_logging(options: &LoadOptions) {
    let Ok(config) = AppConfig::load(options.clone()) else {
        return;
    };
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(log_level);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
