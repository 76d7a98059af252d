//! Transactional custody operations shared by every backend.
//!
//! A backend supplies a unit of work ([`CustodyTx`]) with row-level reads and
//! writes. The business operations below are written once against that unit
//! of work; each one opens a transaction, validates, writes the entity change
//! and its ledger event, and commits. Returning early drops the transaction,
//! which rolls it back.

use std::future::Future;

use async_trait::async_trait;
use serde_json::json;

use super::Result;
use crate::custody::credential::{
    REASON_REISSUED, REASON_TRANSFER_APPROVED, REASON_TRANSFER_CANCELLED,
    REASON_TRANSFER_REJECTED,
};
use crate::custody::component::lock_order;
use crate::custody::types::now;
use crate::custody::{
    verify_presented, ActorId, ChainVerifier, ComponentAttachment, CorrectionEvent, CorrectionId,
    Credential, CredentialId, CredentialToken, CustodyError, CustodyResult, Decision, EventId,
    IntegrityReport, LedgerEvent, LedgerEventType, NewAttachment, NewCorrection, NewLedgerEvent,
    NewMaintenance, NewProperty, NewVerification, Property, PropertyId, PropertyStatus,
    SealedEvent, Transfer, TransferId, VerificationEvent, VerificationId, GENESIS_HASH,
};
use crate::interfaces::{CustodyStore, LedgerStore};
use crate::storage::schema::COMPONENT_POSITION_INDEX;

/// Events fetched per query while walking the whole chain.
const CHAIN_PAGE: u32 = 500;

/// One open transaction against a custody backend.
///
/// Writable transactions hold whatever lock the backend needs so that the
/// reads made inside them stay valid until commit. Dropping without
/// committing rolls back.
#[async_trait]
pub trait CustodyTx: Send {
    /// Hash of the newest ledger event, if any.
    ///
    /// In a writable transaction this also serializes appenders, so the
    /// returned head stays the head until commit.
    async fn ledger_head(&mut self) -> Result<Option<String>>;

    /// Insert a sealed event and return its assigned id.
    async fn insert_event(&mut self, event: &SealedEvent) -> Result<EventId>;

    async fn event(&mut self, id: EventId) -> Result<Option<LedgerEvent>>;

    /// The event with the greatest id below `id`.
    async fn previous_event(&mut self, id: EventId) -> Result<Option<LedgerEvent>>;

    /// Events for one property with id above `after`, ascending.
    async fn property_events(
        &mut self,
        property: PropertyId,
        after: Option<EventId>,
        limit: Option<u32>,
    ) -> Result<Vec<LedgerEvent>>;

    /// Events across all properties with id above `after`, ascending.
    async fn events_after(&mut self, after: Option<EventId>, limit: u32)
        -> Result<Vec<LedgerEvent>>;

    /// Newest events first.
    async fn recent_events(&mut self, limit: u32) -> Result<Vec<LedgerEvent>>;

    /// Read a property. In a writable transaction the row stays locked until
    /// commit.
    async fn property(&mut self, id: PropertyId) -> Result<Option<Property>>;

    async fn property_by_serial(&mut self, serial_number: &str) -> Result<Option<Property>>;

    async fn insert_property(&mut self, property: &Property) -> Result<()>;

    /// Persist status, holder and `updated_at`.
    async fn update_property(&mut self, property: &Property) -> Result<()>;

    async fn credential(&mut self, id: CredentialId) -> Result<Option<Credential>>;

    async fn active_credential(&mut self, property: PropertyId) -> Result<Option<Credential>>;

    async fn credentials_for(&mut self, property: PropertyId) -> Result<Vec<Credential>>;

    async fn insert_credential(&mut self, credential: &Credential) -> Result<()>;

    /// Persist the active flag and deactivation details.
    async fn update_credential(&mut self, credential: &Credential) -> Result<()>;

    async fn transfer(&mut self, id: TransferId) -> Result<Option<Transfer>>;

    async fn pending_transfer(&mut self, property: PropertyId) -> Result<Option<Transfer>>;

    async fn transfers_for_property(&mut self, property: PropertyId) -> Result<Vec<Transfer>>;

    async fn transfers_for_actor(&mut self, actor: ActorId) -> Result<Vec<Transfer>>;

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<()>;

    /// Persist status, decision details and note.
    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<()>;

    async fn insert_correction(&mut self, correction: &CorrectionEvent) -> Result<()>;

    async fn correction(&mut self, id: CorrectionId) -> Result<Option<CorrectionEvent>>;

    async fn corrections_for(&mut self, event: EventId) -> Result<Vec<CorrectionEvent>>;

    async fn insert_verification(&mut self, verification: &VerificationEvent) -> Result<()>;

    async fn verifications_for(&mut self, property: PropertyId) -> Result<Vec<VerificationEvent>>;

    /// Every correction, in ledger order.
    async fn all_corrections(&mut self) -> Result<Vec<CorrectionEvent>>;

    /// Where a component is attached, if anywhere.
    async fn attachment(&mut self, component: PropertyId) -> Result<Option<ComponentAttachment>>;

    /// Components attached to a parent, oldest first.
    async fn components_of(&mut self, parent: PropertyId) -> Result<Vec<ComponentAttachment>>;

    async fn insert_attachment(&mut self, attachment: &ComponentAttachment) -> Result<()>;

    async fn delete_attachment(&mut self, component: PropertyId) -> Result<()>;

    async fn commit(self) -> Result<()>;
}

/// A storage backend that hands out transactions.
#[async_trait]
pub trait CustodyBackend: Send + Sync {
    type Tx: CustodyTx;

    /// Open a transaction that will write. Concurrent writers touching the
    /// same property or the ledger head are serialized.
    async fn begin_write(&self) -> Result<Self::Tx>;

    /// Open a read-only transaction over a consistent snapshot.
    async fn begin_read(&self) -> Result<Self::Tx>;
}

/// Link `event` to the current head and insert it.
async fn append_in<T: CustodyTx>(tx: &mut T, event: NewLedgerEvent) -> Result<LedgerEvent> {
    let prev_hash = tx
        .ledger_head()
        .await?
        .unwrap_or_else(|| GENESIS_HASH.to_string());
    let sealed = event.seal(prev_hash);
    let id = tx.insert_event(&sealed).await?;
    Ok(sealed.into_event(id))
}

/// Run a read-only operation, reporting storage failures as `ReadError`.
async fn read_only<T>(op: impl Future<Output = CustodyResult<T>>) -> CustodyResult<T> {
    op.await.map_err(CustodyError::on_read)
}

/// Read a property, locking it when the transaction is writable.
async fn load_property<T: CustodyTx>(tx: &mut T, id: PropertyId) -> CustodyResult<Property> {
    tx.property(id)
        .await?
        .ok_or(CustodyError::PropertyNotFound(id))
}

/// Load a transfer with its property locked, re-reading the transfer under
/// the lock.
async fn locked_transfer<T: CustodyTx>(
    tx: &mut T,
    id: TransferId,
) -> CustodyResult<(Transfer, Property)> {
    let property_id = tx
        .transfer(id)
        .await?
        .ok_or(CustodyError::TransferNotFound(id))?
        .property_id;
    let property = load_property(tx, property_id).await?;
    let transfer = tx
        .transfer(id)
        .await?
        .ok_or(CustodyError::TransferNotFound(id))?;
    Ok((transfer, property))
}

/// Lock two distinct properties in a fixed order and return them as
/// `(first, second)` in argument order.
async fn load_pair<T: CustodyTx>(
    tx: &mut T,
    first: PropertyId,
    second: PropertyId,
) -> CustodyResult<(Property, Property)> {
    let [low, high] = lock_order(first, second);
    let low = load_property(tx, low).await?;
    let high = load_property(tx, high).await?;
    if low.id == first {
        Ok((low, high))
    } else {
        Ok((high, low))
    }
}

/// Deactivate a credential if it is still active.
async fn retire_credential<T: CustodyTx>(
    tx: &mut T,
    id: CredentialId,
    reason: &str,
    at: chrono::DateTime<chrono::Utc>,
) -> CustodyResult<()> {
    if let Some(mut credential) = tx.credential(id).await? {
        if credential.active {
            credential.deactivate(reason, at)?;
            tx.update_credential(&credential).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl<B: CustodyBackend> LedgerStore for B {
    async fn append(&self, event: NewLedgerEvent) -> CustodyResult<LedgerEvent> {
        let mut tx = self.begin_write().await?;
        load_property(&mut tx, event.property_id).await?;
        let appended = append_in(&mut tx, event).await?;
        tx.commit().await?;
        Ok(appended)
    }

    async fn event(&self, id: EventId) -> CustodyResult<LedgerEvent> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            tx.event(id).await?.ok_or(CustodyError::EventNotFound(id))
        })
        .await
    }

    async fn history(&self, property: PropertyId) -> CustodyResult<Vec<LedgerEvent>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            load_property(&mut tx, property).await?;
            Ok::<_, CustodyError>(tx.property_events(property, None, None).await?)
        })
        .await
    }

    async fn history_page(
        &self,
        property: PropertyId,
        after: Option<EventId>,
        limit: u32,
    ) -> CustodyResult<Vec<LedgerEvent>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            load_property(&mut tx, property).await?;
            Ok::<_, CustodyError>(tx.property_events(property, after, Some(limit)).await?)
        })
        .await
    }

    async fn recent_events(&self, limit: u32) -> CustodyResult<Vec<LedgerEvent>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            Ok::<_, CustodyError>(tx.recent_events(limit).await?)
        })
        .await
    }

    async fn verify_integrity(&self, property: PropertyId) -> CustodyResult<bool> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            load_property(&mut tx, property).await?;

            for event in tx.property_events(property, None, None).await? {
                if !event.content_intact() {
                    return Ok(false);
                }
                let expected = match tx.previous_event(event.id).await? {
                    Some(previous) => previous.hash,
                    None => GENESIS_HASH.to_string(),
                };
                if event.prev_hash != expected {
                    return Ok(false);
                }
            }
            Ok::<_, CustodyError>(true)
        })
        .await
    }

    async fn verify_chain(&self) -> CustodyResult<IntegrityReport> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            let mut verifier = ChainVerifier::new();
            let mut after = None;

            loop {
                let page = tx.events_after(after, CHAIN_PAGE).await?;
                let Some(last) = page.last() else {
                    break;
                };
                after = Some(last.id);
                for event in &page {
                    verifier.observe(event);
                }
            }
            Ok::<_, CustodyError>(verifier.finish())
        })
        .await
    }
}

#[async_trait]
impl<B: CustodyBackend> CustodyStore for B {
    async fn register_property(&self, new: NewProperty, actor: ActorId) -> CustodyResult<Property> {
        let at = now();
        let property = Property::register(new, at)?;

        let mut tx = self.begin_write().await?;
        match tx.insert_property(&property).await {
            Err(e) if e.is_unique_violation() => {
                return Err(CustodyError::DuplicateSerial(property.serial_number));
            }
            other => other?,
        }
        append_in(
            &mut tx,
            NewLedgerEvent::new(
                LedgerEventType::Create,
                property.id,
                actor,
                json!({
                    "serial_number": property.serial_number,
                    "name": property.name,
                    "status": property.status,
                    "holder_id": property.holder_id,
                }),
                at,
            ),
        )
        .await?;
        tx.commit().await?;
        Ok(property)
    }

    async fn property(&self, id: PropertyId) -> CustodyResult<Property> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            load_property(&mut tx, id).await
        })
        .await
    }

    async fn property_by_serial(&self, serial_number: &str) -> CustodyResult<Option<Property>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            Ok::<_, CustodyError>(tx.property_by_serial(serial_number.trim()).await?)
        })
        .await
    }

    async fn change_status(
        &self,
        id: PropertyId,
        actor: ActorId,
        status: PropertyStatus,
    ) -> CustodyResult<Property> {
        let mut tx = self.begin_write().await?;
        let mut property = load_property(&mut tx, id).await?;
        property.ensure_held_by(actor)?;
        if property.status == status {
            return Ok(property);
        }

        let at = now();
        let previous = property.status;
        property.status = status;
        property.updated_at = at;
        tx.update_property(&property).await?;
        append_in(
            &mut tx,
            NewLedgerEvent::new(
                LedgerEventType::StatusChange,
                id,
                actor,
                json!({ "from": previous, "to": status }),
                at,
            ),
        )
        .await?;
        tx.commit().await?;
        Ok(property)
    }

    async fn issue_credential(
        &self,
        property: PropertyId,
        requester: ActorId,
    ) -> CustodyResult<Credential> {
        let at = now();
        let mut tx = self.begin_write().await?;
        let item = load_property(&mut tx, property).await?;
        let credential = Credential::issue(&item, requester, at)?;

        let superseded = match tx.active_credential(property).await? {
            Some(mut previous) => {
                previous.deactivate(REASON_REISSUED, at)?;
                tx.update_credential(&previous).await?;
                Some(previous.id)
            }
            None => None,
        };
        tx.insert_credential(&credential).await?;
        append_in(
            &mut tx,
            NewLedgerEvent::new(
                LedgerEventType::CredentialIssue,
                property,
                requester,
                json!({
                    "credential_id": credential.id,
                    "holder_id": credential.payload.holder_id,
                    "hash": credential.hash,
                    "superseded": superseded,
                }),
                at,
            ),
        )
        .await?;
        tx.commit().await?;
        Ok(credential)
    }

    async fn credential(&self, id: CredentialId) -> CustodyResult<Credential> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            tx.credential(id)
                .await?
                .ok_or(CustodyError::CredentialNotFound(id))
        })
        .await
    }

    async fn credentials_for(&self, property: PropertyId) -> CustodyResult<Vec<Credential>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            load_property(&mut tx, property).await?;
            Ok::<_, CustodyError>(tx.credentials_for(property).await?)
        })
        .await
    }

    async fn verify_credential(&self, token: &CredentialToken) -> CustodyResult<Credential> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            let stored = tx.credential(token.credential_id).await?;
            let property = tx.property(token.payload.property_id).await?;
            let (credential, _) = verify_presented(token, stored.as_ref(), property.as_ref())?;
            Ok::<_, CustodyError>(credential.clone())
        })
        .await
    }

    async fn deactivate_credential(
        &self,
        id: CredentialId,
        actor: ActorId,
        reason: &str,
    ) -> CustodyResult<Credential> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CustodyError::InvalidInput(
                "deactivation reason must not be empty".to_string(),
            ));
        }

        let mut tx = self.begin_write().await?;
        let property_id = tx
            .credential(id)
            .await?
            .ok_or(CustodyError::CredentialNotFound(id))?
            .property_id;
        let property = load_property(&mut tx, property_id).await?;
        property.ensure_held_by(actor)?;

        let mut credential = tx
            .credential(id)
            .await?
            .ok_or(CustodyError::CredentialNotFound(id))?;
        let at = now();
        credential.deactivate(reason, at)?;
        tx.update_credential(&credential).await?;
        append_in(
            &mut tx,
            NewLedgerEvent::new(
                LedgerEventType::CredentialDeactivate,
                property_id,
                actor,
                json!({ "credential_id": id, "reason": reason }),
                at,
            ),
        )
        .await?;
        tx.commit().await?;
        Ok(credential)
    }

    async fn initiate_transfer(
        &self,
        token: &CredentialToken,
        scanner: ActorId,
    ) -> CustodyResult<Transfer> {
        let at = now();
        let mut tx = self.begin_write().await?;
        let property = tx.property(token.payload.property_id).await?;
        let stored = tx.credential(token.credential_id).await?;
        let (credential, property) = verify_presented(token, stored.as_ref(), property.as_ref())?;

        let transfer = Transfer::request(credential, scanner, at)?;
        if tx.pending_transfer(property.id).await?.is_some() {
            return Err(CustodyError::DuplicatePending(property.id));
        }
        match tx.insert_transfer(&transfer).await {
            Err(e) if e.is_unique_violation() => {
                return Err(CustodyError::DuplicatePending(property.id));
            }
            other => other?,
        }
        append_in(
            &mut tx,
            NewLedgerEvent::new(
                LedgerEventType::TransferRequest,
                property.id,
                scanner,
                json!({
                    "from_holder": transfer.from_holder,
                    "to_holder": transfer.to_holder,
                    "credential_id": transfer.credential_id,
                }),
                at,
            )
            .with_transfer(transfer.id),
        )
        .await?;
        tx.commit().await?;
        Ok(transfer)
    }

    async fn decide_transfer(
        &self,
        id: TransferId,
        decider: ActorId,
        decision: Decision,
        note: Option<String>,
    ) -> CustodyResult<Transfer> {
        let at = now();
        let mut tx = self.begin_write().await?;
        let (mut transfer, mut property) = locked_transfer(&mut tx, id).await?;
        transfer.decide(decider, decision, note, at)?;

        let (event_type, reason) = match decision {
            Decision::Approve => {
                if property.holder_id != Some(transfer.from_holder) {
                    return Err(CustodyError::StaleCredential {
                        credential: transfer.credential_id,
                        embedded: transfer.from_holder,
                        current: property.holder_id,
                    });
                }
                property.holder_id = Some(transfer.to_holder);
                property.updated_at = at;
                tx.update_property(&property).await?;
                (LedgerEventType::TransferApprove, REASON_TRANSFER_APPROVED)
            }
            Decision::Reject => (LedgerEventType::TransferReject, REASON_TRANSFER_REJECTED),
        };

        retire_credential(&mut tx, transfer.credential_id, reason, at).await?;
        if decision == Decision::Approve {
            // A credential re-issued by the old holder while the transfer was
            // pending must not outlive the handoff.
            if let Some(current) = tx.active_credential(property.id).await? {
                retire_credential(&mut tx, current.id, reason, at).await?;
            }
        }
        tx.update_transfer(&transfer).await?;
        append_in(
            &mut tx,
            NewLedgerEvent::new(
                event_type,
                property.id,
                decider,
                json!({
                    "from_holder": transfer.from_holder,
                    "to_holder": transfer.to_holder,
                    "credential_id": transfer.credential_id,
                    "note": transfer.note,
                }),
                at,
            )
            .with_transfer(id),
        )
        .await?;
        tx.commit().await?;
        Ok(transfer)
    }

    async fn cancel_transfer(
        &self,
        id: TransferId,
        requester: ActorId,
        note: Option<String>,
    ) -> CustodyResult<Transfer> {
        let at = now();
        let mut tx = self.begin_write().await?;
        let (mut transfer, property) = locked_transfer(&mut tx, id).await?;
        transfer.cancel(requester, note, at)?;

        retire_credential(&mut tx, transfer.credential_id, REASON_TRANSFER_CANCELLED, at).await?;
        tx.update_transfer(&transfer).await?;
        append_in(
            &mut tx,
            NewLedgerEvent::new(
                LedgerEventType::TransferCancel,
                property.id,
                requester,
                json!({
                    "from_holder": transfer.from_holder,
                    "to_holder": transfer.to_holder,
                    "credential_id": transfer.credential_id,
                    "note": transfer.note,
                }),
                at,
            )
            .with_transfer(id),
        )
        .await?;
        tx.commit().await?;
        Ok(transfer)
    }

    async fn transfer(&self, id: TransferId) -> CustodyResult<Transfer> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            tx.transfer(id)
                .await?
                .ok_or(CustodyError::TransferNotFound(id))
        })
        .await
    }

    async fn transfers_for_property(&self, property: PropertyId) -> CustodyResult<Vec<Transfer>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            load_property(&mut tx, property).await?;
            Ok::<_, CustodyError>(tx.transfers_for_property(property).await?)
        })
        .await
    }

    async fn transfers_for_actor(&self, actor: ActorId) -> CustodyResult<Vec<Transfer>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            Ok::<_, CustodyError>(tx.transfers_for_actor(actor).await?)
        })
        .await
    }

    async fn record_correction(&self, correction: NewCorrection) -> CustodyResult<CorrectionEvent> {
        correction.validate()?;

        let at = now();
        let mut tx = self.begin_write().await?;
        let original = tx
            .event(correction.original_event_id)
            .await?
            .ok_or(CustodyError::EventNotFound(correction.original_event_id))?;
        let reason = correction.reason.trim().to_string();

        let mut ledger_event = NewLedgerEvent::new(
            LedgerEventType::Correction,
            original.property_id,
            correction.corrected_by,
            json!({
                "original_event_id": original.id,
                "reason": reason,
                "corrected_payload": correction.corrected_payload,
            }),
            at,
        );
        if let Some(transfer) = original.transfer_id {
            ledger_event = ledger_event.with_transfer(transfer);
        }
        let appended = append_in(&mut tx, ledger_event).await?;

        let record = CorrectionEvent {
            id: CorrectionId::generate(),
            original_event_id: original.id,
            ledger_event_id: appended.id,
            reason,
            corrected_payload: correction.corrected_payload,
            corrected_by: correction.corrected_by,
            created_at: at,
        };
        tx.insert_correction(&record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn correction(&self, id: CorrectionId) -> CustodyResult<CorrectionEvent> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            tx.correction(id)
                .await?
                .ok_or(CustodyError::CorrectionNotFound(id))
        })
        .await
    }

    async fn corrections_for(&self, event: EventId) -> CustodyResult<Vec<CorrectionEvent>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            if tx.event(event).await?.is_none() {
                return Err(CustodyError::EventNotFound(event));
            }
            Ok(tx.corrections_for(event).await?)
        })
        .await
    }

    async fn all_corrections(&self) -> CustodyResult<Vec<CorrectionEvent>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            Ok::<_, CustodyError>(tx.all_corrections().await?)
        })
        .await
    }

    async fn record_verification(
        &self,
        verification: NewVerification,
    ) -> CustodyResult<VerificationEvent> {
        let at = now();
        let mut tx = self.begin_write().await?;
        let property = load_property(&mut tx, verification.property_id).await?;
        let id = VerificationId::generate();

        let appended = append_in(
            &mut tx,
            NewLedgerEvent::new(
                LedgerEventType::Verification,
                property.id,
                verification.verifier_id,
                json!({
                    "verification_id": id,
                    "result": verification.result,
                    "notes": verification.notes,
                    "holder_id": property.holder_id,
                }),
                at,
            ),
        )
        .await?;

        let record = VerificationEvent {
            id,
            property_id: property.id,
            verifier_id: verification.verifier_id,
            result: verification.result,
            notes: verification.notes,
            ledger_event_id: appended.id,
            created_at: at,
        };
        tx.insert_verification(&record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn verifications_for(
        &self,
        property: PropertyId,
    ) -> CustodyResult<Vec<VerificationEvent>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            load_property(&mut tx, property).await?;
            Ok::<_, CustodyError>(tx.verifications_for(property).await?)
        })
        .await
    }

    async fn record_maintenance(&self, maintenance: NewMaintenance) -> CustodyResult<LedgerEvent> {
        maintenance.validate()?;

        let at = now();
        let mut tx = self.begin_write().await?;
        let property = load_property(&mut tx, maintenance.property_id).await?;
        let appended = append_in(
            &mut tx,
            NewLedgerEvent::new(
                LedgerEventType::Maintenance,
                property.id,
                maintenance.initiated_by,
                json!({
                    "maintenance_record_id": maintenance.record_id.trim(),
                    "stage": maintenance.stage,
                    "initiated_by": maintenance.initiated_by,
                    "performed_by": maintenance.performed_by,
                    "maintenance_type": maintenance.maintenance_type,
                    "description": maintenance.description.trim(),
                }),
                at,
            ),
        )
        .await?;
        tx.commit().await?;
        Ok(appended)
    }

    async fn attach_component(
        &self,
        attachment: NewAttachment,
    ) -> CustodyResult<ComponentAttachment> {
        let actor = attachment.attached_by;
        let attachment = attachment.into_attachment(now())?;
        let (parent_id, component_id) = (attachment.parent_id, attachment.component_id);

        let mut tx = self.begin_write().await?;
        let (parent, component) = load_pair(&mut tx, parent_id, component_id).await?;
        parent.ensure_held_by(actor)?;
        component.ensure_held_by(actor)?;

        if let Some(existing) = tx.attachment(component_id).await? {
            return Err(CustodyError::AlreadyAttached {
                component: component_id,
                parent: existing.parent_id,
            });
        }
        if let Some(above) = tx.attachment(parent_id).await? {
            return Err(CustodyError::InvalidInput(format!(
                "property {} is itself a component of {}",
                parent_id, above.parent_id
            )));
        }
        if !tx.components_of(component_id).await?.is_empty() {
            return Err(CustodyError::InvalidInput(format!(
                "property {} carries components and cannot be attached",
                component_id
            )));
        }
        if let Some(position) = &attachment.position {
            let occupied = tx
                .components_of(parent_id)
                .await?
                .iter()
                .any(|a| a.position.as_ref() == Some(position));
            if occupied {
                return Err(CustodyError::PositionOccupied {
                    parent: parent_id,
                    position: position.clone(),
                });
            }
        }

        match tx.insert_attachment(&attachment).await {
            Err(e) if e.violated_constraint() == Some(COMPONENT_POSITION_INDEX) => {
                return Err(CustodyError::PositionOccupied {
                    parent: parent_id,
                    position: attachment.position.unwrap_or_default(),
                });
            }
            Err(e) if e.is_unique_violation() => {
                return Err(CustodyError::AlreadyAttached {
                    component: component_id,
                    parent: parent_id,
                });
            }
            other => other?,
        }

        let payload = json!({
            "parent_property_id": parent_id,
            "component_property_id": component_id,
            "position": attachment.position,
            "notes": attachment.notes,
        });
        for property in [parent_id, component_id] {
            append_in(
                &mut tx,
                NewLedgerEvent::new(
                    LedgerEventType::ComponentAttach,
                    property,
                    actor,
                    payload.clone(),
                    attachment.attached_at,
                ),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(attachment)
    }

    async fn detach_component(
        &self,
        parent: PropertyId,
        component: PropertyId,
        actor: ActorId,
    ) -> CustodyResult<ComponentAttachment> {
        if parent == component {
            return Err(CustodyError::NotAttached { component, parent });
        }

        let at = now();
        let mut tx = self.begin_write().await?;
        let (parent_item, _) = load_pair(&mut tx, parent, component).await?;
        parent_item.ensure_held_by(actor)?;

        let attachment = match tx.attachment(component).await? {
            Some(a) if a.parent_id == parent => a,
            _ => return Err(CustodyError::NotAttached { component, parent }),
        };
        tx.delete_attachment(component).await?;

        let payload = json!({
            "parent_property_id": parent,
            "component_property_id": component,
            "position": attachment.position,
        });
        for property in [parent, component] {
            append_in(
                &mut tx,
                NewLedgerEvent::new(
                    LedgerEventType::ComponentDetach,
                    property,
                    actor,
                    payload.clone(),
                    at,
                ),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(attachment)
    }

    async fn components_of(&self, parent: PropertyId) -> CustodyResult<Vec<ComponentAttachment>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            load_property(&mut tx, parent).await?;
            Ok::<_, CustodyError>(tx.components_of(parent).await?)
        })
        .await
    }

    async fn attachment_of(
        &self,
        component: PropertyId,
    ) -> CustodyResult<Option<ComponentAttachment>> {
        read_only(async {
            let mut tx = self.begin_read().await?;
            load_property(&mut tx, component).await?;
            Ok::<_, CustodyError>(tx.attachment(component).await?)
        })
        .await
    }
}
