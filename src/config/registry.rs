//! Unit registry
//!
//! The registry is the fixed rollout order. Later units may rely on ledger
//! state written by earlier ones, so the order is never changed at runtime.

use std::collections::HashSet;

use serde_json::json;

use crate::domain::{DeploymentUnit, TestCase};
use crate::error::{Result, config};

/// Ordered, validated list of deployment units
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRegistry {
    units: Vec<DeploymentUnit>,
}

impl UnitRegistry {
    /// Build a registry, rejecting duplicates and invalid units
    pub fn new(units: Vec<DeploymentUnit>) -> Result<Self> {
        if units.is_empty() {
            return Err(config::invalid("the unit registry is empty"));
        }

        let mut names = HashSet::new();
        let mut identities = HashSet::new();
        for unit in &units {
            unit.validate()?;
            if !identities.insert((unit.name.as_str(), unit.version.as_str(), unit.sequence)) {
                return Err(config::invalid(format!(
                    "unit {} is registered twice",
                    unit.label()
                )));
            }
            if !names.insert(unit.name.as_str()) {
                return Err(config::invalid(format!(
                    "unit name '{}' is registered twice; live instances are looked up by name",
                    unit.name
                )));
            }
        }

        Ok(Self { units })
    }

    /// The built-in healthcare registry
    pub fn builtin() -> Self {
        Self {
            units: default_units(),
        }
    }

    pub fn units(&self) -> &[DeploymentUnit] {
        &self.units
    }

    pub fn into_units(self) -> Vec<DeploymentUnit> {
        self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Built-in units in rollout order
///
/// Batteries exercise create/read/update/query through the API fronting the unit.
pub fn default_units() -> Vec<DeploymentUnit> {
    vec![
        DeploymentUnit::new("patient", "../chaincode/patient")
            .with_test(
                TestCase::post("create patient", "/api/patients")
                    .with_body(json!({"patientId": "P001", "name": "Ada Lovelace", "dob": "1990-12-10"}))
                    .expect_status(201)
                    .expect_contains("P001"),
            )
            .with_test(
                TestCase::get("read patient", "/api/patients/P001")
                    .expect_status(200)
                    .expect_json("/data/name", json!("Ada Lovelace")),
            )
            .with_test(
                TestCase::put("update patient", "/api/patients/P001")
                    .with_body(json!({"phone": "+1-555-0100"}))
                    .expect_status(200),
            )
            .with_test(
                TestCase::get("query patients", "/api/patients")
                    .expect_status(200)
                    .expect_contains("P001"),
            ),
        DeploymentUnit::new("doctor", "../chaincode/doctor")
            .with_test(
                TestCase::post("register doctor", "/api/doctors")
                    .with_body(json!({"doctorId": "D001", "name": "Dr. Grace Hopper", "specialty": "cardiology"}))
                    .expect_status(201)
                    .expect_contains("D001"),
            )
            .with_test(
                TestCase::get("read doctor", "/api/doctors/D001")
                    .expect_status(200)
                    .expect_json("/data/specialty", json!("cardiology")),
            )
            .with_test(
                TestCase::put("update doctor", "/api/doctors/D001")
                    .with_body(json!({"specialty": "cardiothoracic surgery"}))
                    .expect_status(200),
            )
            .with_test(
                TestCase::get("query doctors by specialty", "/api/doctors?specialty=cardiothoracic%20surgery")
                    .expect_status(200)
                    .expect_contains("D001"),
            )
            .with_test(TestCase::get("read missing doctor", "/api/doctors/D999").expect_status(404)),
        DeploymentUnit::new("medical-record", "../chaincode/medical-record")
            .with_test(
                TestCase::post("create record", "/api/records")
                    .with_body(json!({"recordId": "R001", "patientId": "P001", "doctorId": "D001", "diagnosis": "hypertension"}))
                    .expect_status(201)
                    .expect_contains("R001"),
            )
            .with_test(
                TestCase::get("read record", "/api/records/R001")
                    .expect_status(200)
                    .expect_json("/data/diagnosis", json!("hypertension")),
            )
            .with_test(
                TestCase::put("update record", "/api/records/R001")
                    .with_body(json!({"diagnosis": "stage 1 hypertension"}))
                    .expect_status(200),
            )
            .with_test(
                TestCase::get("query records by patient", "/api/records?patientId=P001")
                    .expect_status(200)
                    .expect_contains("R001"),
            )
            .with_test(
                TestCase::get("record history", "/api/records/R001/history")
                    .expect_status(200)
                    .expect_contains("stage 1 hypertension"),
            ),
        DeploymentUnit::new("consent", "../chaincode/consent")
            .with_test(
                TestCase::post("grant consent", "/api/consents")
                    .with_body(json!({"consentId": "C001", "patientId": "P001", "granteeId": "D001"}))
                    .expect_status(201),
            )
            .with_test(
                TestCase::get("read consent", "/api/consents/C001")
                    .expect_status(200)
                    .expect_json("/data/status", json!("ACTIVE")),
            )
            .with_test(
                TestCase::put("revoke consent", "/api/consents/C001")
                    .with_body(json!({"status": "REVOKED"}))
                    .expect_status(200),
            )
            .with_test(
                TestCase::get("query consents by patient", "/api/consents?patientId=P001")
                    .expect_status(200)
                    .expect_contains("REVOKED"),
            ),
        DeploymentUnit::new("audit", "../chaincode/audit")
            .with_test(
                TestCase::post("append audit entry", "/api/audit")
                    .with_body(json!({"entryId": "A001", "actor": "D001", "action": "READ_RECORD", "target": "R001"}))
                    .expect_status(201),
            )
            .with_test(
                TestCase::get("read audit entry", "/api/audit/A001")
                    .expect_status(200)
                    .expect_json("/data/action", json!("READ_RECORD")),
            )
            .with_test(
                TestCase::put("annotate audit entry", "/api/audit/A001")
                    .with_body(json!({"note": "routine review"}))
                    .expect_status(200),
            )
            .with_test(
                TestCase::get("query audit by actor", "/api/audit?actor=D001")
                    .expect_status(200)
                    .expect_contains("A001"),
            ),
    ]
}
