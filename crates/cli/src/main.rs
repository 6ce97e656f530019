use std::process::ExitCode;

fn main() -> ExitCode {
    guichet_cli::run()
}
