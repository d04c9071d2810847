use std::process::ExitCode;

fn main() -> ExitCode {
    satbot_cli::run()
}
