//! Error taxonomy shared by the bridge client, the shell transport and the
//! workspace orchestrator.
//!
//! Nothing here is fatal: every variant ends up as a status message or a
//! log line. The classifier mirrors the patterns the shell host uses to tell
//! a dead backend apart from a transient hiccup.

use std::fmt;

/// Broad class of a failure, used to decide how it is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bridge or transport absent. Surfaced as a non-blocking toast.
    Unreachable,
    /// Backend answered with a non-ok status. Surfaced with its message.
    Rejected,
    /// Transport dropped. Retried automatically up to the budget.
    Transient,
    /// Impossible UI state (unknown tab id, missing widget). Logged only.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Transient => "transient",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Failure of a file-system bridge call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The host process could not be reached (or answered garbage).
    Unreachable(String),
    /// The host answered with a status other than `ok`/`success`.
    Rejected(String),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Unreachable(_) => ErrorKind::Unreachable,
            BridgeError::Rejected(_) => ErrorKind::Rejected,
        }
    }

    /// Text shown in the status bar. Rejections carry the backend's own
    /// message; an empty one falls back to `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            BridgeError::Unreachable(_) => "Backend not connected".to_string(),
            BridgeError::Rejected(msg) if msg.trim().is_empty() => fallback.to_string(),
            BridgeError::Rejected(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Unreachable(detail) => write!(f, "bridge unreachable: {detail}"),
            BridgeError::Rejected(msg) => write!(f, "bridge rejected request: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Classify a transport-level error message.
///
/// Refused connections and DNS failures mean the shell proxy is not running
/// (`Unreachable`); everything else (resets, protocol errors, abrupt closes)
/// is `Transient`. Both are retried by the shell session; the distinction
/// only changes the wording of the final status message.
pub fn classify_transport_error(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("connection refused")
        || lower.contains("econnrefused")
        || lower.contains("failed to lookup address")
        || lower.contains("no such host")
        || lower.contains("actively refused")
    {
        return ErrorKind::Unreachable;
    }

    {
        lazy_static::lazy_static! {
            static ref OS_REFUSED: regex::Regex =
                regex::Regex::new(r"\bos error (61|111|10061)\b").unwrap();
        }
        if OS_REFUSED.is_match(&lower) {
            return ErrorKind::Unreachable;
        }
    }

    ErrorKind::Transient
}
