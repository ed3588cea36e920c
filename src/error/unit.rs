//! Per-unit errors
//!
//! None of these cancel a run: they are recorded against the unit (or the
//! assertion) and the scheduler moves on.

use super::ChainrollError;

/// Creates a deployment timeout error
pub fn deploy_timeout(unit: impl Into<String>, timeout_secs: u64) -> ChainrollError {
    ChainrollError::DeploymentTimeout {
        unit: unit.into(),
        timeout_secs,
    }
}

/// Creates a deployment failed error
pub fn deploy_failed(unit: impl Into<String>, reason: impl Into<String>) -> ChainrollError {
    ChainrollError::DeploymentFailed {
        unit: unit.into(),
        reason: reason.into(),
    }
}

/// Creates a unit already exists error (replace declined)
pub fn already_exists(unit: impl Into<String>) -> ChainrollError {
    ChainrollError::UnitAlreadyExists { unit: unit.into() }
}

/// Creates a removal failed error
pub fn remove_failed(unit: impl Into<String>, reason: impl Into<String>) -> ChainrollError {
    ChainrollError::RemovalFailed {
        unit: unit.into(),
        reason: reason.into(),
    }
}

/// Creates an API start failed error
pub fn api_start_failed(unit: impl Into<String>, reason: impl Into<String>) -> ChainrollError {
    ChainrollError::ApiStartFailed {
        unit: unit.into(),
        reason: reason.into(),
    }
}

/// Creates a teardown failed error
pub fn teardown_failed(unit: impl Into<String>, reason: impl Into<String>) -> ChainrollError {
    ChainrollError::TeardownFailed {
        unit: unit.into(),
        reason: reason.into(),
    }
}

/// Creates an assertion failed error
pub fn assertion_failed(
    test: impl Into<String>,
    condition: impl Into<String>,
    detail: impl Into<String>,
) -> ChainrollError {
    ChainrollError::TestAssertionFailed {
        test: test.into(),
        condition: condition.into(),
        detail: detail.into(),
    }
}

/// Creates an invalid state transition error
pub fn invalid_transition(
    unit: impl Into<String>,
    from: impl ToString,
    to: impl ToString,
) -> ChainrollError {
    ChainrollError::InvalidTransition {
        unit: unit.into(),
        from: from.to_string(),
        to: to.to_string(),
    }
}
