//! Deployment unit domain types
//!
//! A unit is one independently versioned ledger service module. Its identity
//! is `(name, version, sequence)`; the state machine below is the only way a
//! unit's state changes during a run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, config, unit};

/// Endorsement policy used when a unit does not declare its own
pub const DEFAULT_POLICY: &str = "OR('Org1MSP.peer','Org2MSP.peer')";

/// Lifecycle state of a unit within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    #[default]
    Pending,
    Deploying,
    Deployed,
    Failed,
    Skipped,
    Testing,
    Tested,
    TestFailed,
}

impl UnitState {
    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: UnitState) -> bool {
        use UnitState::{
            Deployed, Deploying, Failed, Pending, Skipped, TestFailed, Tested, Testing,
        };
        matches!(
            (self, next),
            (Pending, Deploying | Skipped)
                | (Deploying, Deployed | Failed)
                | (Deployed, Testing)
                | (Testing, Tested | TestFailed)
        )
    }

    /// Whether a unit in this state has a cycle in progress
    pub fn is_in_flight(self) -> bool {
        matches!(self, UnitState::Deploying | UnitState::Testing)
    }

    /// Whether the unit's cycle is over (nothing more will happen to it)
    pub fn is_finished(self) -> bool {
        !matches!(self, UnitState::Pending) && !self.is_in_flight()
    }

    /// Whether the unit failed its cycle
    pub fn is_failure(self) -> bool {
        matches!(self, UnitState::Failed | UnitState::TestFailed)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnitState::Pending => "PENDING",
            UnitState::Deploying => "DEPLOYING",
            UnitState::Deployed => "DEPLOYED",
            UnitState::Failed => "FAILED",
            UnitState::Skipped => "SKIPPED",
            UnitState::Testing => "TESTING",
            UnitState::Tested => "TESTED",
            UnitState::TestFailed => "TEST_FAILED",
        };
        f.pad(label)
    }
}

/// HTTP method of a test request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        };
        f.pad(label)
    }
}

/// A JSON value expected at a JSON pointer in the response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonExpectation {
    /// RFC 6901 pointer, e.g. `/data/name`
    pub pointer: String,
    pub equals: serde_json::Value,
}

/// What a test asserts about its response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonExpectation>,
}

impl Expectation {
    /// Whether the expectation checks anything at all
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.contains.is_none() && self.json.is_none()
    }

    /// Human-readable asserted condition, e.g. `status == 201 and body contains "P001"`
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(status) = self.status {
            parts.push(format!("status == {status}"));
        }
        if let Some(ref needle) = self.contains {
            parts.push(format!("body contains {needle:?}"));
        }
        if let Some(ref json) = self.json {
            parts.push(format!("json {} == {}", json.pointer, json.equals));
        }
        if parts.is_empty() {
            return "nothing".to_string();
        }
        parts.join(" and ")
    }
}

/// One request/assert pair of a unit's test battery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,

    #[serde(default)]
    pub method: HttpMethod,

    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    pub expect: Expectation,
}

impl TestCase {
    pub fn new(name: impl Into<String>, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            body: None,
            expect: Expectation::default(),
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Get, path)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Post, path)
    }

    pub fn put(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Put, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expect.status = Some(status);
        self
    }

    #[must_use]
    pub fn expect_contains(mut self, needle: impl Into<String>) -> Self {
        self.expect.contains = Some(needle.into());
        self
    }

    #[must_use]
    pub fn expect_json(mut self, pointer: impl Into<String>, equals: serde_json::Value) -> Self {
        self.expect.json = Some(JsonExpectation {
            pointer: pointer.into(),
            equals,
        });
        self
    }

    /// Validate the test definition
    pub fn validate(&self, unit_name: &str) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(config::invalid(format!(
                "unit '{unit_name}' has a test without a name"
            )));
        }
        if !self.path.starts_with('/') {
            return Err(config::invalid(format!(
                "test '{}' of unit '{unit_name}' must use a path starting with '/', got '{}'",
                self.name, self.path
            )));
        }
        if self.expect.is_empty() {
            return Err(config::invalid(format!(
                "test '{}' of unit '{unit_name}' has no expectation",
                self.name
            )));
        }
        Ok(())
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_sequence() -> u32 {
    1
}

fn default_policy() -> String {
    DEFAULT_POLICY.to_string()
}

/// A ledger service unit and its place in the rollout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentUnit {
    pub name: String,

    /// Artifact source path handed to the deploy command
    pub path: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default = "default_sequence")]
    pub sequence: u32,

    #[serde(default = "default_policy")]
    pub policy: String,

    /// Ordered test battery run by `chainroll test`
    #[serde(default)]
    pub tests: Vec<TestCase>,

    #[serde(skip)]
    state: UnitState,
}

impl DeploymentUnit {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            version: default_version(),
            sequence: default_sequence(),
            policy: default_policy(),
            tests: Vec::new(),
            state: UnitState::Pending,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = policy.into();
        self
    }

    #[must_use]
    pub fn with_test(mut self, test: TestCase) -> Self {
        self.tests.push(test);
        self
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    /// `name@version#sequence`, the unit's identity as one string
    pub fn label(&self) -> String {
        format!("{}@{}#{}", self.name, self.version, self.sequence)
    }

    /// Move the unit to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: UnitState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(unit::invalid_transition(&self.name, self.state, next));
        }
        self.state = next;
        Ok(())
    }

    /// Validate the unit definition
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(config::invalid("unit name cannot be empty"));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(config::invalid(format!(
                "unit name '{}' cannot contain whitespace",
                self.name
            )));
        }
        if self.path.trim().is_empty() {
            return Err(config::invalid(format!(
                "unit '{}' has an empty artifact path",
                self.name
            )));
        }
        if self.version.trim().is_empty() {
            return Err(config::invalid(format!(
                "unit '{}' has an empty version",
                self.name
            )));
        }
        if self.sequence == 0 {
            return Err(config::invalid(format!(
                "unit '{}' must use a sequence number of at least 1",
                self.name
            )));
        }
        for test in &self.tests {
            test.validate(&self.name)?;
        }
        Ok(())
    }
}
