//! SmartDrive CLI entry point
//!
//! This is a minimal entrypoint that:
//! 1. Parses CLI arguments and dispatches (via cli::run)
//! 2. Reports errors on stderr and as a JSON error on stdout
//! 3. Exits with the code of the command's outcome
//!
//! All logic is delegated to the CLI module.

use smartdrive::cli;

fn main() {
    match cli::run() {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            eprintln!("{}", e);
            // stdout may already be gone; the exit code still reports the failure
            let _ = cli::write_error(e.code_str(), e.message());
            std::process::exit(e.exit_code());
        }
    }
}
