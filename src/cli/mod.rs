//! CLI module for SmartDrive
//!
//! Provides the command-line surface the orchestrator calls:
//! - generate-recovery-kit: create the one-time recovery kit
//! - recover: unlock the payload volume with the recovery phrase
//! - reconstruct: rebuild the container from paper chunks
//! - validate-target, check-layout, status: read-only checks
//!
//! Every command writes one JSON object to stdout and exits with the code
//! of its `RecoveryOutcome`.

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    check_layout, generate_recovery_kit, reconstruct, recover, run, run_command, status,
    validate_target, CommandReport, GenerateOptions, RecoverOptions,
};
pub use errors::{CliError, CliErrorCode, CliResult, USAGE_EXIT_CODE};
pub use io::{read_secret_line, write_error, write_outcome, write_response};
