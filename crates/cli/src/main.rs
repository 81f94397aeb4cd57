use std::process::ExitCode;

fn main() -> ExitCode {
    tariffsim_cli::run()
}
