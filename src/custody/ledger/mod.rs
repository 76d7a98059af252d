//! Append-only custody ledger.
//!
//! Every event carries the hash of the event before it (by id, across all
//! properties) and its own hash over that link plus its content. Altering,
//! removing or reordering a stored event breaks the chain at that point.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::types::{format_timestamp, ActorId, EventId, PropertyId, TransferId};

/// `prev_hash` of the first event in the chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Kind of custody-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventType {
    Create,
    StatusChange,
    CredentialIssue,
    CredentialDeactivate,
    TransferRequest,
    TransferApprove,
    TransferReject,
    TransferCancel,
    Verification,
    Correction,
    Maintenance,
    ComponentAttach,
    ComponentDetach,
}

impl LedgerEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::StatusChange => "status_change",
            Self::CredentialIssue => "credential_issue",
            Self::CredentialDeactivate => "credential_deactivate",
            Self::TransferRequest => "transfer_request",
            Self::TransferApprove => "transfer_approve",
            Self::TransferReject => "transfer_reject",
            Self::TransferCancel => "transfer_cancel",
            Self::Verification => "verification",
            Self::Correction => "correction",
            Self::Maintenance => "maintenance",
            Self::ComponentAttach => "component_attach",
            Self::ComponentDetach => "component_detach",
        }
    }
}

impl fmt::Display for LedgerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "status_change" => Ok(Self::StatusChange),
            "credential_issue" => Ok(Self::CredentialIssue),
            "credential_deactivate" => Ok(Self::CredentialDeactivate),
            "transfer_request" => Ok(Self::TransferRequest),
            "transfer_approve" => Ok(Self::TransferApprove),
            "transfer_reject" => Ok(Self::TransferReject),
            "transfer_cancel" => Ok(Self::TransferCancel),
            "verification" => Ok(Self::Verification),
            "correction" => Ok(Self::Correction),
            "maintenance" => Ok(Self::Maintenance),
            "component_attach" => Ok(Self::ComponentAttach),
            "component_detach" => Ok(Self::ComponentDetach),
            other => Err(other.to_string()),
        }
    }
}

/// An event ready to be appended. The store assigns id and chain link.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEvent {
    pub event_type: LedgerEventType,
    pub property_id: PropertyId,
    pub transfer_id: Option<TransferId>,
    pub actor_id: ActorId,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl NewLedgerEvent {
    pub fn new(
        event_type: LedgerEventType,
        property_id: PropertyId,
        actor_id: ActorId,
        payload: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            property_id,
            transfer_id: None,
            actor_id,
            payload,
            created_at,
        }
    }

    pub fn with_transfer(mut self, transfer_id: TransferId) -> Self {
        self.transfer_id = Some(transfer_id);
        self
    }

    /// Link this event after `prev_hash` and compute its hash.
    pub fn seal(self, prev_hash: String) -> SealedEvent {
        let hash = compute_hash(
            &prev_hash,
            self.event_type,
            self.property_id,
            self.transfer_id,
            self.actor_id,
            &self.created_at,
            &self.payload,
        );
        SealedEvent {
            event: self,
            prev_hash,
            hash,
        }
    }
}

/// An event with its chain link, about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedEvent {
    pub event: NewLedgerEvent,
    pub prev_hash: String,
    pub hash: String,
}

impl SealedEvent {
    pub fn into_event(self, id: EventId) -> LedgerEvent {
        LedgerEvent {
            id,
            event_type: self.event.event_type,
            property_id: self.event.property_id,
            transfer_id: self.event.transfer_id,
            actor_id: self.event.actor_id,
            payload: self.event.payload,
            created_at: self.event.created_at,
            prev_hash: self.prev_hash,
            hash: self.hash,
        }
    }
}

/// A persisted ledger event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: EventId,
    pub event_type: LedgerEventType,
    pub property_id: PropertyId,
    pub transfer_id: Option<TransferId>,
    pub actor_id: ActorId,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

impl LedgerEvent {
    /// Hash recomputed from the stored content and link.
    pub fn computed_hash(&self) -> String {
        compute_hash(
            &self.prev_hash,
            self.event_type,
            self.property_id,
            self.transfer_id,
            self.actor_id,
            &self.created_at,
            &self.payload,
        )
    }

    pub fn content_intact(&self) -> bool {
        self.computed_hash() == self.hash
    }
}

fn compute_hash(
    prev_hash: &str,
    event_type: LedgerEventType,
    property_id: PropertyId,
    transfer_id: Option<TransferId>,
    actor_id: ActorId,
    created_at: &DateTime<Utc>,
    payload: &Value,
) -> String {
    let transfer = transfer_id.map(|t| t.to_string()).unwrap_or_default();
    let input = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        prev_hash,
        event_type,
        property_id,
        transfer,
        actor_id,
        format_timestamp(created_at),
        payload
    );
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// A single defect found while walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityProblem {
    /// Stored hash does not match the stored content.
    HashMismatch {
        event: EventId,
        stored: String,
        computed: String,
    },
    /// `prev_hash` does not match the hash of the preceding event.
    BrokenLink {
        event: EventId,
        expected: String,
        found: String,
    },
}

impl IntegrityProblem {
    pub fn event(&self) -> EventId {
        match self {
            Self::HashMismatch { event, .. } | Self::BrokenLink { event, .. } => *event,
        }
    }
}

/// Outcome of a chain walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub events_checked: u64,
    pub head: Option<EventId>,
    pub head_hash: String,
    pub problems: Vec<IntegrityProblem>,
}

impl IntegrityReport {
    pub fn is_intact(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Incremental chain checker. Feed events in ascending id order.
#[derive(Debug)]
pub struct ChainVerifier {
    expected_prev: String,
    head: Option<EventId>,
    checked: u64,
    problems: Vec<IntegrityProblem>,
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainVerifier {
    /// Start from genesis.
    pub fn new() -> Self {
        Self::resume(GENESIS_HASH.to_string())
    }

    /// Start after an event whose hash is already trusted.
    pub fn resume(prev_hash: String) -> Self {
        Self {
            expected_prev: prev_hash,
            head: None,
            checked: 0,
            problems: Vec::new(),
        }
    }

    pub fn observe(&mut self, event: &LedgerEvent) {
        self.checked += 1;
        if event.prev_hash != self.expected_prev {
            self.problems.push(IntegrityProblem::BrokenLink {
                event: event.id,
                expected: self.expected_prev.clone(),
                found: event.prev_hash.clone(),
            });
        }
        let computed = event.computed_hash();
        if computed != event.hash {
            self.problems.push(IntegrityProblem::HashMismatch {
                event: event.id,
                stored: event.hash.clone(),
                computed,
            });
        }
        // Continue from the stored hash so one bad event is reported once.
        self.expected_prev = event.hash.clone();
        self.head = Some(event.id);
    }

    pub fn finish(self) -> IntegrityReport {
        IntegrityReport {
            events_checked: self.checked,
            head: self.head,
            head_hash: self.expected_prev,
            problems: self.problems,
        }
    }
}
