//! Corrections, physical verifications and maintenance entries.
//!
//! None of these records changes custody. A correction annotates an earlier
//! ledger event without touching it; a verification attests that someone saw
//! the item; a maintenance entry notes work done on it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{CustodyError, CustodyResult};
use super::types::{ActorId, CorrectionId, EventId, PropertyId, VerificationId};

/// Request to amend an earlier ledger event.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCorrection {
    pub original_event_id: EventId,
    pub reason: String,
    pub corrected_payload: Value,
    pub corrected_by: ActorId,
}

impl NewCorrection {
    pub fn new(
        original_event_id: EventId,
        reason: impl Into<String>,
        corrected_payload: Value,
        corrected_by: ActorId,
    ) -> Self {
        Self {
            original_event_id,
            reason: reason.into(),
            corrected_payload,
            corrected_by,
        }
    }

    pub fn validate(&self) -> CustodyResult<()> {
        if self.reason.trim().is_empty() {
            return Err(CustodyError::InvalidInput(
                "correction reason must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A persisted correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEvent {
    pub id: CorrectionId,
    pub original_event_id: EventId,
    /// The `correction` ledger event that records this amendment.
    pub ledger_event_id: EventId,
    pub reason: String,
    pub corrected_payload: Value,
    pub corrected_by: ActorId,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a physical inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationResult {
    Confirmed,
    Discrepant,
}

impl VerificationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Discrepant => "discrepant",
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "discrepant" => Ok(Self::Discrepant),
            other => Err(other.to_string()),
        }
    }
}

/// Request to record a physical verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVerification {
    pub property_id: PropertyId,
    pub verifier_id: ActorId,
    pub result: VerificationResult,
    pub notes: Option<String>,
}

impl NewVerification {
    pub fn new(property_id: PropertyId, verifier_id: ActorId, result: VerificationResult) -> Self {
        Self {
            property_id,
            verifier_id,
            result,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// A persisted verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEvent {
    pub id: VerificationId,
    pub property_id: PropertyId,
    pub verifier_id: ActorId,
    pub result: VerificationResult,
    pub notes: Option<String>,
    pub ledger_event_id: EventId,
    pub created_at: DateTime<Utc>,
}

/// Step of a maintenance job being logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStage {
    Requested,
    Started,
    Completed,
    Cancelled,
}

impl MaintenanceStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MaintenanceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaintenanceStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(other.to_string()),
        }
    }
}

/// Maintenance work to log against an item.
///
/// The maintenance record itself lives with the maintenance workflow; the
/// ledger keeps a tamper-evident trace of each step. Anyone may log one,
/// since the technician is rarely the holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMaintenance {
    pub property_id: PropertyId,
    /// Id of the maintenance record in the workflow that owns it.
    pub record_id: String,
    pub initiated_by: ActorId,
    pub performed_by: Option<ActorId>,
    pub stage: MaintenanceStage,
    pub maintenance_type: Option<String>,
    pub description: String,
}

impl NewMaintenance {
    pub fn new(
        property_id: PropertyId,
        record_id: impl Into<String>,
        initiated_by: ActorId,
        stage: MaintenanceStage,
        description: impl Into<String>,
    ) -> Self {
        Self {
            property_id,
            record_id: record_id.into(),
            initiated_by,
            performed_by: None,
            stage,
            maintenance_type: None,
            description: description.into(),
        }
    }

    pub fn performed_by(mut self, actor: ActorId) -> Self {
        self.performed_by = Some(actor);
        self
    }

    pub fn of_type(mut self, maintenance_type: impl Into<String>) -> Self {
        self.maintenance_type = Some(maintenance_type.into());
        self
    }

    pub fn validate(&self) -> CustodyResult<()> {
        if self.record_id.trim().is_empty() {
            return Err(CustodyError::InvalidInput(
                "maintenance record id must not be empty".to_string(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(CustodyError::InvalidInput(
                "maintenance description must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    NeverVerified,
    Current,
    Overdue,
}

/// Where a property stands in its verification cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStatus {
    pub property_id: PropertyId,
    pub state: VerificationState,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_result: Option<VerificationResult>,
    pub last_verifier: Option<ActorId>,
    pub due_at: Option<DateTime<Utc>>,
}

impl VerificationStatus {
    /// Derive status from the most recent verification.
    ///
    /// A verification is current until `interval` has elapsed since it was
    /// recorded; at exactly `due_at` it is overdue.
    pub fn derive(
        property_id: PropertyId,
        latest: Option<&VerificationEvent>,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> Self {
        let Some(latest) = latest else {
            return Self {
                property_id,
                state: VerificationState::NeverVerified,
                last_verified_at: None,
                last_result: None,
                last_verifier: None,
                due_at: None,
            };
        };

        let due_at = latest.created_at + interval;
        let state = if now < due_at {
            VerificationState::Current
        } else {
            VerificationState::Overdue
        };

        Self {
            property_id,
            state,
            last_verified_at: Some(latest.created_at),
            last_result: Some(latest.result),
            last_verifier: Some(latest.verifier_id),
            due_at: Some(due_at),
        }
    }

    /// True when the item needs attention: never seen, overdue, or last seen
    /// with a discrepancy.
    pub fn needs_attention(&self) -> bool {
        self.state != VerificationState::Current
            || self.last_result == Some(VerificationResult::Discrepant)
    }
}

#[cfg(test)]
mod tests;
