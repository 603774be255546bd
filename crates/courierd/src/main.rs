use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match courierd::run_node() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Telemetry may not be installed yet, so report directly.
            let _ = writeln!(io::stderr(), "courierd: {error}");
            ExitCode::FAILURE
        }
    }
}
