//! Ledger network and resource gate errors

use super::ChainrollError;

/// Creates a network unreachable error listing the missing core processes
pub fn unreachable<I, S>(missing: I) -> ChainrollError
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let missing: Vec<String> = missing
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .collect();
    ChainrollError::NetworkUnreachable {
        missing: missing.join(", "),
    }
}

/// Creates a resource exhausted error for a guard checkpoint
pub fn exhausted(checkpoint: impl Into<String>, memory_percent: f64) -> ChainrollError {
    ChainrollError::ResourceExhausted {
        checkpoint: checkpoint.into(),
        memory_percent,
    }
}

/// Creates a probe failed error
pub fn probe_failed(reason: impl Into<String>) -> ChainrollError {
    ChainrollError::ProbeFailed {
        reason: reason.into(),
    }
}
