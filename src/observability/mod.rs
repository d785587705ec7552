//! Audit and outcome layer
//!
//! - JSON diagnostic lines on stderr (`Logger`)
//! - Closed event vocabulary (`Event`)
//! - Retry classification (`RecoveryOutcome`)
//! - Append-only recovery audit log (`AuditLog`)
//!
//! Diagnostic logging never fails an operation. The audit log can: a
//! recovery attempt is not reported back until its entry is durable.

mod audit;
mod errors;
mod events;
mod logger;
mod outcome;

pub use audit::{AuditLog, AuditLogEntry, FileAuditLog, MemoryAuditLog};
pub use errors::{AuditError, AuditErrorCode, AuditResult};
pub use events::Event;
pub use logger::{Logger, Severity, LOG_LEVEL_ENV};
pub use outcome::RecoveryOutcome;

/// Key fragments that mark a field as secret, matched case-insensitively.
const SECRET_KEY_MARKERS: &[&str] = &[
    "password",
    "passphrase",
    "mnemonic",
    "phrase",
    "keyfile",
    "credential",
    "secret",
];

/// Whether a log or audit field key names secret material.
pub(crate) fn is_secret_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SECRET_KEY_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Log an event at WARN when it records a failure, INFO otherwise.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}
