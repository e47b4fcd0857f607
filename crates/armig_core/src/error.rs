use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape used across all pipeline layers.
///
/// `is_fatal` separates setup failures that abort a phase (override file
/// unreadable, environment table query failed, invalid canonical name) from
/// per-item failures that callers log and skip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub is_fatal: bool,
}

impl MigrateError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            is_fatal: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn fatal(mut self) -> Self {
        self.is_fatal = true;
        self
    }
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for MigrateError {}
