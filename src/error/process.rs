//! External command and HTTP errors

use super::ChainrollError;

/// Creates a command timed out error
pub fn timed_out(command: impl Into<String>, timeout_secs: u64) -> ChainrollError {
    ChainrollError::CommandTimedOut {
        command: command.into(),
        timeout_secs,
    }
}

/// Creates a command failed error
pub fn failed(command: impl Into<String>, reason: impl Into<String>) -> ChainrollError {
    ChainrollError::CommandFailed {
        command: command.into(),
        reason: reason.into(),
    }
}

/// Creates an HTTP request failed error
pub fn http_failed(url: impl Into<String>, reason: impl Into<String>) -> ChainrollError {
    ChainrollError::HttpRequestFailed {
        url: url.into(),
        reason: reason.into(),
    }
}
