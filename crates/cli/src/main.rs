use std::process::ExitCode;

fn main() -> ExitCode {
    marginscout_cli::run()
}
