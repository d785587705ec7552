//! Diagnostic log lines on stderr
//!
//! Each line is a JSON object: `event`, `severity`, then the fields sorted
//! by key. Fields whose key names secret material are written as
//! `"[redacted]"`. stdout is never touched; it carries the CLI response.
//!
//! `SMARTDRIVE_LOG` sets the lowest severity written (default `INFO`).

use std::env;
use std::fmt;
use std::io::{self, Write};
use std::sync::OnceLock;

use super::is_secret_key;

/// Environment variable holding the minimum severity
pub const LOG_LEVEL_ENV: &str = "SMARTDRIVE_LOG";

const REDACTED: &str = "[redacted]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Info,
    /// Refusals, drift and failed attempts that leave state intact
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    /// Parse a level name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Some(Severity::Trace),
            "INFO" => Some(Severity::Info),
            "WARN" | "WARNING" => Some(Severity::Warn),
            "ERROR" => Some(Severity::Error),
            "FATAL" => Some(Severity::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn threshold() -> Severity {
    static THRESHOLD: OnceLock<Severity> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|v| Severity::parse(&v))
            .unwrap_or(Severity::Info)
    })
}

pub struct Logger;

impl Logger {
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < threshold() {
            return;
        }
        let line = render(severity, event, fields);
        // A single write keeps lines from concurrent processes whole.
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}

/// One complete log line including the trailing newline.
fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<(&str, &str)> = fields.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut line = String::with_capacity(64 + fields.len() * 32);
    line.push('{');
    push_pair(&mut line, "event", event);
    line.push(',');
    push_pair(&mut line, "severity", severity.as_str());
    for (key, value) in sorted {
        line.push(',');
        let value = if is_secret_key(key) { REDACTED } else { value };
        push_pair(&mut line, key, value);
    }
    line.push_str("}\n");
    line
}

fn push_pair(line: &mut String, key: &str, value: &str) {
    push_quoted(line, key);
    line.push(':');
    push_quoted(line, value);
}

fn push_quoted(line: &mut String, s: &str) {
    line.push('"');
    for c in s.chars() {
        match c {
            '"' => line.push_str("\\\""),
            '\\' => line.push_str("\\\\"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            '\t' => line.push_str("\\t"),
            c if c.is_control() => line.push_str(&format!("\\u{:04x}", c as u32)),
            c => line.push(c),
        }
    }
    line.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(line: &str) -> Value {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_event_and_severity_lead_then_sorted_fields() {
        let line = render(
            Severity::Info,
            "KIT_GENERATED",
            &[("volume_identity", "ab"), ("container", "/r/c.bin")],
        );
        let keys: Vec<usize> = ["\"event\"", "\"severity\"", "\"container\"", "\"volume_identity\""]
            .iter()
            .map(|k| line.find(k).unwrap())
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(parse(&line)["severity"], "INFO");
    }

    #[test]
    fn test_control_characters_stay_on_one_line() {
        let line = render(
            Severity::Error,
            "TOOL_FAILED",
            &[("stderr", "line one\nline \"two\"\u{1}")],
        );
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(parse(&line)["stderr"], "line one\nline \"two\"\u{1}");
    }

    #[test]
    fn test_secret_fields_are_redacted() {
        let line = render(
            Severity::Warn,
            "RECOVERY_FAILED",
            &[("password", "hunter2"), ("recovery_phrase", "abandon art"), ("code", "X")],
        );
        assert!(!line.contains("hunter2"));
        assert!(!line.contains("abandon"));
        assert_eq!(parse(&line)["password"], REDACTED);
        assert_eq!(parse(&line)["code"], "X");
    }

    #[test]
    fn test_level_names() {
        assert_eq!(Severity::parse(" warning "), Some(Severity::Warn));
        assert_eq!(Severity::parse("trace"), Some(Severity::Trace));
        assert_eq!(Severity::parse("loud"), None);
        assert!(Severity::Warn < Severity::Error);
    }
}
