//! stdin/stdout handling for the CLI
//!
//! - Input: secrets, one per line, on stdin
//! - Output: a single JSON object on stdout
//! - Diagnostics go to stderr through the logger, never stdout

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};
use zeroize::Zeroizing;

use super::errors::{CliError, CliResult};
use crate::observability::RecoveryOutcome;

/// Read one secret line from stdin. End of input counts as the operator
/// backing out.
pub fn read_secret_line(what: &str) -> CliResult<Zeroizing<String>> {
    read_secret_from(&mut io::stdin().lock(), what)
}

fn read_secret_from<R: BufRead>(reader: &mut R, what: &str) -> CliResult<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    if reader.read_line(&mut line)? == 0 {
        return Err(CliError::aborted(what));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    if line.is_empty() {
        return Err(CliError::usage(format!("{} must not be empty", what)));
    }
    Ok(line)
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_json(&json!({
        "status": "ok",
        "data": data
    }))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_json(&json!({
        "status": "error",
        "code": code,
        "message": message
    }))
}

/// Write the response for a command that ran to an outcome.
pub fn write_outcome(outcome: RecoveryOutcome, data: Value) -> CliResult<()> {
    if outcome.is_success() {
        return write_response(data);
    }
    write_json(&json!({
        "status": "error",
        "code": outcome.as_str(),
        "message": outcome.message(),
        "retry_safe": outcome.is_retry_safe(),
        "data": data
    }))
}

fn write_json(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_secret_line_strips_newline() {
        let mut input = Cursor::new("Sup3rSecret!\r\nignored\n");
        let secret = read_secret_from(&mut input, "password").unwrap();
        assert_eq!(secret.as_str(), "Sup3rSecret!");
    }

    #[test]
    fn test_eof_is_abort() {
        let mut input = Cursor::new("");
        let err = read_secret_from(&mut input, "recovery phrase").unwrap_err();
        assert_eq!(err.outcome(), Some(RecoveryOutcome::UserAbort));
    }

    #[test]
    fn test_blank_line_is_usage_error() {
        let mut input = Cursor::new("\n");
        let err = read_secret_from(&mut input, "password").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_secret_keeps_inner_spaces() {
        let mut input = Cursor::new(" two words \n");
        let secret = read_secret_from(&mut input, "password").unwrap();
        assert_eq!(secret.as_str(), " two words ");
    }
}
