//! Statement builders shared by the SQL backends.
//!
//! Each function returns a backend-neutral sea-query statement; the caller
//! renders it with its own query builder.

use sea_query::{
    Asterisk, Cond, DeleteStatement, Expr, InsertStatement, Order, Query, SelectStatement,
    UpdateStatement,
};

use crate::custody::types::format_timestamp;
use crate::custody::{
    ActorId, ComponentAttachment, CorrectionEvent, CorrectionId, Credential, CredentialId,
    EventId, Property, PropertyId, SealedEvent, Transfer, TransferId, TransferStatus,
    VerificationEvent,
};
use crate::storage::schema::{
    Corrections, Credentials, LedgerEvents, Properties, PropertyComponents, Transfers,
    Verifications,
};

fn opt_ts(ts: &Option<chrono::DateTime<chrono::Utc>>) -> Option<String> {
    ts.as_ref().map(format_timestamp)
}

// --- ledger ---

pub fn ledger_head() -> SelectStatement {
    Query::select()
        .column(LedgerEvents::Hash)
        .from(LedgerEvents::Table)
        .order_by(LedgerEvents::Id, Order::Desc)
        .limit(1)
        .to_owned()
}

pub fn insert_event(sealed: &SealedEvent) -> InsertStatement {
    let event = &sealed.event;
    Query::insert()
        .into_table(LedgerEvents::Table)
        .columns([
            LedgerEvents::EventType,
            LedgerEvents::PropertyId,
            LedgerEvents::TransferId,
            LedgerEvents::ActorId,
            LedgerEvents::Payload,
            LedgerEvents::CreatedAt,
            LedgerEvents::PrevHash,
            LedgerEvents::Hash,
        ])
        .values_panic([
            event.event_type.as_str().into(),
            event.property_id.to_string().into(),
            event.transfer_id.map(|t| t.to_string()).into(),
            event.actor_id.0.into(),
            event.payload.to_string().into(),
            format_timestamp(&event.created_at).into(),
            sealed.prev_hash.as_str().into(),
            sealed.hash.as_str().into(),
        ])
        .returning_col(LedgerEvents::Id)
        .to_owned()
}

pub fn event(id: EventId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(LedgerEvents::Table)
        .and_where(Expr::col(LedgerEvents::Id).eq(id.0))
        .to_owned()
}

pub fn previous_event(id: EventId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(LedgerEvents::Table)
        .and_where(Expr::col(LedgerEvents::Id).lt(id.0))
        .order_by(LedgerEvents::Id, Order::Desc)
        .limit(1)
        .to_owned()
}

pub fn property_events(
    property: PropertyId,
    after: Option<EventId>,
    limit: Option<u32>,
) -> SelectStatement {
    let mut stmt = Query::select()
        .column(Asterisk)
        .from(LedgerEvents::Table)
        .and_where(Expr::col(LedgerEvents::PropertyId).eq(property.to_string()))
        .order_by(LedgerEvents::Id, Order::Asc)
        .to_owned();
    if let Some(after) = after {
        stmt.and_where(Expr::col(LedgerEvents::Id).gt(after.0));
    }
    if let Some(limit) = limit {
        stmt.limit(u64::from(limit));
    }
    stmt
}

pub fn events_after(after: Option<EventId>, limit: u32) -> SelectStatement {
    let mut stmt = Query::select()
        .column(Asterisk)
        .from(LedgerEvents::Table)
        .order_by(LedgerEvents::Id, Order::Asc)
        .limit(u64::from(limit))
        .to_owned();
    if let Some(after) = after {
        stmt.and_where(Expr::col(LedgerEvents::Id).gt(after.0));
    }
    stmt
}

pub fn recent_events(limit: u32) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(LedgerEvents::Table)
        .order_by(LedgerEvents::Id, Order::Desc)
        .limit(u64::from(limit))
        .to_owned()
}

// --- properties ---

pub fn property(id: PropertyId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Properties::Table)
        .and_where(Expr::col(Properties::Id).eq(id.to_string()))
        .to_owned()
}

pub fn property_by_serial(serial_number: &str) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Properties::Table)
        .and_where(Expr::col(Properties::SerialNumber).eq(serial_number))
        .to_owned()
}

pub fn insert_property(property: &Property) -> InsertStatement {
    Query::insert()
        .into_table(Properties::Table)
        .columns([
            Properties::Id,
            Properties::SerialNumber,
            Properties::Name,
            Properties::Status,
            Properties::HolderId,
            Properties::CreatedAt,
            Properties::UpdatedAt,
        ])
        .values_panic([
            property.id.to_string().into(),
            property.serial_number.as_str().into(),
            property.name.as_str().into(),
            property.status.as_str().into(),
            property.holder_id.map(|h| h.0).into(),
            format_timestamp(&property.created_at).into(),
            format_timestamp(&property.updated_at).into(),
        ])
        .to_owned()
}

pub fn update_property(property: &Property) -> UpdateStatement {
    Query::update()
        .table(Properties::Table)
        .values([
            (Properties::Status, property.status.as_str().into()),
            (Properties::HolderId, property.holder_id.map(|h| h.0).into()),
            (
                Properties::UpdatedAt,
                format_timestamp(&property.updated_at).into(),
            ),
        ])
        .and_where(Expr::col(Properties::Id).eq(property.id.to_string()))
        .to_owned()
}

// --- credentials ---

pub fn credential(id: CredentialId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Credentials::Table)
        .and_where(Expr::col(Credentials::Id).eq(id.to_string()))
        .to_owned()
}

pub fn active_credential(property: PropertyId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Credentials::Table)
        .and_where(Expr::col(Credentials::PropertyId).eq(property.to_string()))
        .and_where(Expr::col(Credentials::Active).eq(true))
        .to_owned()
}

pub fn credentials_for(property: PropertyId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Credentials::Table)
        .and_where(Expr::col(Credentials::PropertyId).eq(property.to_string()))
        .order_by(Credentials::CreatedAt, Order::Asc)
        .to_owned()
}

pub fn insert_credential(credential: &Credential) -> InsertStatement {
    Query::insert()
        .into_table(Credentials::Table)
        .columns([
            Credentials::Id,
            Credentials::PropertyId,
            Credentials::SerialNumber,
            Credentials::HolderId,
            Credentials::IssuedAt,
            Credentials::Hash,
            Credentials::IssuedBy,
            Credentials::Active,
            Credentials::CreatedAt,
            Credentials::DeactivatedAt,
            Credentials::DeactivationReason,
        ])
        .values_panic([
            credential.id.to_string().into(),
            credential.property_id.to_string().into(),
            credential.payload.serial_number.as_str().into(),
            credential.payload.holder_id.0.into(),
            format_timestamp(&credential.payload.issued_at).into(),
            credential.hash.as_str().into(),
            credential.issued_by.0.into(),
            credential.active.into(),
            format_timestamp(&credential.created_at).into(),
            opt_ts(&credential.deactivated_at).into(),
            credential.deactivation_reason.clone().into(),
        ])
        .to_owned()
}

pub fn update_credential(credential: &Credential) -> UpdateStatement {
    Query::update()
        .table(Credentials::Table)
        .values([
            (Credentials::Active, credential.active.into()),
            (
                Credentials::DeactivatedAt,
                opt_ts(&credential.deactivated_at).into(),
            ),
            (
                Credentials::DeactivationReason,
                credential.deactivation_reason.clone().into(),
            ),
        ])
        .and_where(Expr::col(Credentials::Id).eq(credential.id.to_string()))
        .to_owned()
}

// --- transfers ---

pub fn transfer(id: TransferId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Transfers::Table)
        .and_where(Expr::col(Transfers::Id).eq(id.to_string()))
        .to_owned()
}

pub fn pending_transfer(property: PropertyId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Transfers::Table)
        .and_where(Expr::col(Transfers::PropertyId).eq(property.to_string()))
        .and_where(Expr::col(Transfers::Status).eq(TransferStatus::Pending.as_str()))
        .to_owned()
}

pub fn transfers_for_property(property: PropertyId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Transfers::Table)
        .and_where(Expr::col(Transfers::PropertyId).eq(property.to_string()))
        .order_by(Transfers::RequestedAt, Order::Asc)
        .to_owned()
}

pub fn transfers_for_actor(actor: ActorId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Transfers::Table)
        .cond_where(
            Cond::any()
                .add(Expr::col(Transfers::FromHolder).eq(actor.0))
                .add(Expr::col(Transfers::ToHolder).eq(actor.0)),
        )
        .order_by(Transfers::RequestedAt, Order::Desc)
        .to_owned()
}

pub fn insert_transfer(transfer: &Transfer) -> InsertStatement {
    Query::insert()
        .into_table(Transfers::Table)
        .columns([
            Transfers::Id,
            Transfers::PropertyId,
            Transfers::FromHolder,
            Transfers::ToHolder,
            Transfers::Status,
            Transfers::RequestedAt,
            Transfers::DecidedAt,
            Transfers::DecidedBy,
            Transfers::CredentialId,
            Transfers::Note,
        ])
        .values_panic([
            transfer.id.to_string().into(),
            transfer.property_id.to_string().into(),
            transfer.from_holder.0.into(),
            transfer.to_holder.0.into(),
            transfer.status.as_str().into(),
            format_timestamp(&transfer.requested_at).into(),
            opt_ts(&transfer.decided_at).into(),
            transfer.decided_by.map(|a| a.0).into(),
            transfer.credential_id.to_string().into(),
            transfer.note.clone().into(),
        ])
        .to_owned()
}

pub fn update_transfer(transfer: &Transfer) -> UpdateStatement {
    Query::update()
        .table(Transfers::Table)
        .values([
            (Transfers::Status, transfer.status.as_str().into()),
            (Transfers::DecidedAt, opt_ts(&transfer.decided_at).into()),
            (Transfers::DecidedBy, transfer.decided_by.map(|a| a.0).into()),
            (Transfers::Note, transfer.note.clone().into()),
        ])
        .and_where(Expr::col(Transfers::Id).eq(transfer.id.to_string()))
        .to_owned()
}

// --- corrections ---

pub fn insert_correction(correction: &CorrectionEvent) -> InsertStatement {
    Query::insert()
        .into_table(Corrections::Table)
        .columns([
            Corrections::Id,
            Corrections::OriginalEventId,
            Corrections::LedgerEventId,
            Corrections::Reason,
            Corrections::CorrectedPayload,
            Corrections::CorrectedBy,
            Corrections::CreatedAt,
        ])
        .values_panic([
            correction.id.to_string().into(),
            correction.original_event_id.0.into(),
            correction.ledger_event_id.0.into(),
            correction.reason.as_str().into(),
            correction.corrected_payload.to_string().into(),
            correction.corrected_by.0.into(),
            format_timestamp(&correction.created_at).into(),
        ])
        .to_owned()
}

pub fn correction(id: CorrectionId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Corrections::Table)
        .and_where(Expr::col(Corrections::Id).eq(id.to_string()))
        .to_owned()
}

pub fn corrections_for(event: EventId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Corrections::Table)
        .and_where(Expr::col(Corrections::OriginalEventId).eq(event.0))
        .order_by(Corrections::LedgerEventId, Order::Asc)
        .to_owned()
}

pub fn all_corrections() -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Corrections::Table)
        .order_by(Corrections::LedgerEventId, Order::Asc)
        .to_owned()
}

// --- verifications ---

pub fn insert_verification(verification: &VerificationEvent) -> InsertStatement {
    Query::insert()
        .into_table(Verifications::Table)
        .columns([
            Verifications::Id,
            Verifications::PropertyId,
            Verifications::VerifierId,
            Verifications::Result,
            Verifications::Notes,
            Verifications::LedgerEventId,
            Verifications::CreatedAt,
        ])
        .values_panic([
            verification.id.to_string().into(),
            verification.property_id.to_string().into(),
            verification.verifier_id.0.into(),
            verification.result.as_str().into(),
            verification.notes.clone().into(),
            verification.ledger_event_id.0.into(),
            format_timestamp(&verification.created_at).into(),
        ])
        .to_owned()
}

pub fn verifications_for(property: PropertyId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(Verifications::Table)
        .and_where(Expr::col(Verifications::PropertyId).eq(property.to_string()))
        .order_by(Verifications::LedgerEventId, Order::Asc)
        .to_owned()
}

// --- components ---

pub fn attachment(component: PropertyId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(PropertyComponents::Table)
        .and_where(Expr::col(PropertyComponents::ComponentId).eq(component.to_string()))
        .to_owned()
}

pub fn components_of(parent: PropertyId) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(PropertyComponents::Table)
        .and_where(Expr::col(PropertyComponents::ParentId).eq(parent.to_string()))
        .order_by(PropertyComponents::AttachedAt, Order::Asc)
        .order_by(PropertyComponents::ComponentId, Order::Asc)
        .to_owned()
}

pub fn insert_attachment(attachment: &ComponentAttachment) -> InsertStatement {
    Query::insert()
        .into_table(PropertyComponents::Table)
        .columns([
            PropertyComponents::ComponentId,
            PropertyComponents::ParentId,
            PropertyComponents::Position,
            PropertyComponents::Notes,
            PropertyComponents::AttachedBy,
            PropertyComponents::AttachedAt,
        ])
        .values_panic([
            attachment.component_id.to_string().into(),
            attachment.parent_id.to_string().into(),
            attachment.position.clone().into(),
            attachment.notes.clone().into(),
            attachment.attached_by.0.into(),
            format_timestamp(&attachment.attached_at).into(),
        ])
        .to_owned()
}

pub fn delete_attachment(component: PropertyId) -> DeleteStatement {
    Query::delete()
        .from_table(PropertyComponents::Table)
        .and_where(Expr::col(PropertyComponents::ComponentId).eq(component.to_string()))
        .to_owned()
}
