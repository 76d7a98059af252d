//! Row shapes for the SQL backends and their conversion into domain types.
//!
//! Identifiers and timestamps are stored as text so both backends share one
//! row layout.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

use crate::custody::types::parse_timestamp;
use crate::custody::{
    ActorId, ComponentAttachment, CorrectionEvent, CorrectionId, Credential, CredentialId, CredentialPayload, EventId,
    LedgerEvent, Property, PropertyId, Transfer, TransferId, VerificationEvent, VerificationId,
};
use crate::storage::{Result, StorageError};

fn uuid(value: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(value)?)
}

fn timestamp(value: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value).map_err(|e| StorageError::InvalidTimestamp(format!("{}: {}", value, e)))
}

fn opt_timestamp(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(timestamp).transpose()
}

fn parsed<T: FromStr>(column: &'static str, value: String) -> Result<T> {
    value
        .parse()
        .map_err(|_| StorageError::InvalidValue { column, value })
}

#[derive(sqlx::FromRow)]
pub struct PropertyRecord {
    id: String,
    serial_number: String,
    name: String,
    status: String,
    holder_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PropertyRecord> for Property {
    type Error = StorageError;

    fn try_from(r: PropertyRecord) -> Result<Self> {
        Ok(Self {
            id: PropertyId(uuid(&r.id)?),
            serial_number: r.serial_number,
            name: r.name,
            status: parsed("status", r.status)?,
            holder_id: r.holder_id.map(ActorId),
            created_at: timestamp(&r.created_at)?,
            updated_at: timestamp(&r.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct CredentialRecord {
    id: String,
    property_id: String,
    serial_number: String,
    holder_id: i64,
    issued_at: String,
    hash: String,
    issued_by: i64,
    active: bool,
    created_at: String,
    deactivated_at: Option<String>,
    deactivation_reason: Option<String>,
}

impl TryFrom<CredentialRecord> for Credential {
    type Error = StorageError;

    fn try_from(r: CredentialRecord) -> Result<Self> {
        let property_id = PropertyId(uuid(&r.property_id)?);
        Ok(Self {
            id: CredentialId(uuid(&r.id)?),
            property_id,
            payload: CredentialPayload {
                property_id,
                serial_number: r.serial_number,
                holder_id: ActorId(r.holder_id),
                issued_at: timestamp(&r.issued_at)?,
            },
            hash: r.hash,
            issued_by: ActorId(r.issued_by),
            active: r.active,
            created_at: timestamp(&r.created_at)?,
            deactivated_at: opt_timestamp(r.deactivated_at.as_deref())?,
            deactivation_reason: r.deactivation_reason,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct TransferRecord {
    id: String,
    property_id: String,
    from_holder: i64,
    to_holder: i64,
    status: String,
    requested_at: String,
    decided_at: Option<String>,
    decided_by: Option<i64>,
    credential_id: String,
    note: Option<String>,
}

impl TryFrom<TransferRecord> for Transfer {
    type Error = StorageError;

    fn try_from(r: TransferRecord) -> Result<Self> {
        Ok(Self {
            id: TransferId(uuid(&r.id)?),
            property_id: PropertyId(uuid(&r.property_id)?),
            from_holder: ActorId(r.from_holder),
            to_holder: ActorId(r.to_holder),
            status: parsed("status", r.status)?,
            requested_at: timestamp(&r.requested_at)?,
            decided_at: opt_timestamp(r.decided_at.as_deref())?,
            decided_by: r.decided_by.map(ActorId),
            credential_id: CredentialId(uuid(&r.credential_id)?),
            note: r.note,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct LedgerEventRecord {
    id: i64,
    event_type: String,
    property_id: String,
    transfer_id: Option<String>,
    actor_id: i64,
    payload: String,
    created_at: String,
    prev_hash: String,
    hash: String,
}

impl TryFrom<LedgerEventRecord> for LedgerEvent {
    type Error = StorageError;

    fn try_from(r: LedgerEventRecord) -> Result<Self> {
        Ok(Self {
            id: EventId(r.id),
            event_type: parsed("event_type", r.event_type)?,
            property_id: PropertyId(uuid(&r.property_id)?),
            transfer_id: r
                .transfer_id
                .as_deref()
                .map(uuid)
                .transpose()?
                .map(TransferId),
            actor_id: ActorId(r.actor_id),
            payload: serde_json::from_str(&r.payload)?,
            created_at: timestamp(&r.created_at)?,
            prev_hash: r.prev_hash,
            hash: r.hash,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct CorrectionRecord {
    id: String,
    original_event_id: i64,
    ledger_event_id: i64,
    reason: String,
    corrected_payload: String,
    corrected_by: i64,
    created_at: String,
}

impl TryFrom<CorrectionRecord> for CorrectionEvent {
    type Error = StorageError;

    fn try_from(r: CorrectionRecord) -> Result<Self> {
        Ok(Self {
            id: CorrectionId(uuid(&r.id)?),
            original_event_id: EventId(r.original_event_id),
            ledger_event_id: EventId(r.ledger_event_id),
            reason: r.reason,
            corrected_payload: serde_json::from_str(&r.corrected_payload)?,
            corrected_by: ActorId(r.corrected_by),
            created_at: timestamp(&r.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct VerificationRecord {
    id: String,
    property_id: String,
    verifier_id: i64,
    result: String,
    notes: Option<String>,
    ledger_event_id: i64,
    created_at: String,
}

impl TryFrom<VerificationRecord> for VerificationEvent {
    type Error = StorageError;

    fn try_from(r: VerificationRecord) -> Result<Self> {
        Ok(Self {
            id: VerificationId(uuid(&r.id)?),
            property_id: PropertyId(uuid(&r.property_id)?),
            verifier_id: ActorId(r.verifier_id),
            result: parsed("result", r.result)?,
            notes: r.notes,
            ledger_event_id: EventId(r.ledger_event_id),
            created_at: timestamp(&r.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct AttachmentRecord {
    component_id: String,
    parent_id: String,
    position: Option<String>,
    notes: Option<String>,
    attached_by: i64,
    attached_at: String,
}

impl TryFrom<AttachmentRecord> for ComponentAttachment {
    type Error = StorageError;

    fn try_from(r: AttachmentRecord) -> Result<Self> {
        Ok(Self {
            parent_id: PropertyId(uuid(&r.parent_id)?),
            component_id: PropertyId(uuid(&r.component_id)?),
            position: r.position,
            notes: r.notes,
            attached_by: ActorId(r.attached_by),
            attached_at: timestamp(&r.attached_at)?,
        })
    }
}
