//! Mock storage implementation for testing.
//!
//! All state lives behind one mutex. A write transaction holds the lock,
//! works on a staged copy and swaps it in on commit, so a failed operation
//! leaves the committed state untouched. A read transaction copies the state
//! and releases the lock at once; it sees a snapshot and never blocks
//! writers. The uniqueness rules enforced by the SQL schema are enforced
//! here too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::custody::{
    ActorId, ComponentAttachment, CorrectionEvent, CorrectionId, Credential, CredentialId,
    EventId, LedgerEvent, Property, PropertyId, SealedEvent, Transfer, TransferId,
    VerificationEvent,
};
use crate::storage::schema::COMPONENT_POSITION_INDEX;
use crate::storage::{CustodyBackend, CustodyTx, Result, StorageError};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    properties: HashMap<PropertyId, Property>,
    credentials: HashMap<CredentialId, Credential>,
    transfers: HashMap<TransferId, Transfer>,
    events: Vec<LedgerEvent>,
    corrections: Vec<CorrectionEvent>,
    verifications: Vec<VerificationEvent>,
    attachments: HashMap<PropertyId, ComponentAttachment>,
    next_event_id: i64,
}

/// Mock custody store that keeps everything in memory.
#[derive(Default)]
pub struct MockCustodyStore {
    state: Arc<Mutex<MemoryState>>,
    fail_on_append: Arc<AtomicBool>,
    fail_on_read: Arc<AtomicBool>,
}

impl MockCustodyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent ledger insert fail, aborting its transaction.
    pub fn set_fail_on_append(&self, fail: bool) {
        self.fail_on_append.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read-only transaction fail to open.
    pub fn set_fail_on_read(&self, fail: bool) {
        self.fail_on_read.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a stored event in place, bypassing the append-only rule.
    ///
    /// Used to simulate tampering with the underlying storage.
    pub async fn tamper_event(&self, id: EventId, edit: impl FnOnce(&mut LedgerEvent)) -> bool {
        let mut state = self.state.lock().await;
        match state.events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                edit(event);
                true
            }
            None => false,
        }
    }

}

/// Transaction over the mock state.
///
/// Only write transactions keep the guard; a read transaction works on its
/// own snapshot and commits nothing.
pub struct MockTx {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    staged: MemoryState,
    fail_on_append: bool,
}

#[async_trait]
impl CustodyBackend for MockCustodyStore {
    type Tx = MockTx;

    async fn begin_write(&self) -> Result<Self::Tx> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MockTx {
            guard: Some(guard),
            staged,
            fail_on_append: self.fail_on_append.load(Ordering::SeqCst),
        })
    }

    async fn begin_read(&self) -> Result<Self::Tx> {
        if self.fail_on_read.load(Ordering::SeqCst) {
            return Err(StorageError::Injected("read"));
        }
        let snapshot = self.state.lock().await.clone();
        Ok(MockTx {
            guard: None,
            staged: snapshot,
            fail_on_append: self.fail_on_append.load(Ordering::SeqCst),
        })
    }
}

fn unique_violation(constraint: &str) -> StorageError {
    StorageError::UniqueViolation {
        constraint: Some(constraint.to_string()),
    }
}

#[async_trait]
impl CustodyTx for MockTx {
    async fn ledger_head(&mut self) -> Result<Option<String>> {
        Ok(self.staged.events.last().map(|e| e.hash.clone()))
    }

    async fn insert_event(&mut self, event: &SealedEvent) -> Result<EventId> {
        if self.fail_on_append {
            return Err(StorageError::Injected("ledger append"));
        }
        if self
            .staged
            .events
            .iter()
            .any(|e| e.prev_hash == event.prev_hash)
        {
            return Err(unique_violation("ledger_events.prev_hash"));
        }
        self.staged.next_event_id += 1;
        let id = EventId(self.staged.next_event_id);
        self.staged.events.push(event.clone().into_event(id));
        Ok(id)
    }

    async fn event(&mut self, id: EventId) -> Result<Option<LedgerEvent>> {
        Ok(self.staged.events.iter().find(|e| e.id == id).cloned())
    }

    async fn previous_event(&mut self, id: EventId) -> Result<Option<LedgerEvent>> {
        Ok(self
            .staged
            .events
            .iter()
            .rev()
            .find(|e| e.id < id)
            .cloned())
    }

    async fn property_events(
        &mut self,
        property: PropertyId,
        after: Option<EventId>,
        limit: Option<u32>,
    ) -> Result<Vec<LedgerEvent>> {
        let limit = limit.map_or(usize::MAX, |l| l as usize);
        Ok(self
            .staged
            .events
            .iter()
            .filter(|e| e.property_id == property)
            .filter(|e| after.map_or(true, |a| e.id > a))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn events_after(&mut self, after: Option<EventId>, limit: u32) -> Result<Vec<LedgerEvent>> {
        Ok(self
            .staged
            .events
            .iter()
            .filter(|e| after.map_or(true, |a| e.id > a))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn recent_events(&mut self, limit: u32) -> Result<Vec<LedgerEvent>> {
        Ok(self
            .staged
            .events
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn property(&mut self, id: PropertyId) -> Result<Option<Property>> {
        Ok(self.staged.properties.get(&id).cloned())
    }

    async fn property_by_serial(&mut self, serial_number: &str) -> Result<Option<Property>> {
        Ok(self
            .staged
            .properties
            .values()
            .find(|p| p.serial_number == serial_number)
            .cloned())
    }

    async fn insert_property(&mut self, property: &Property) -> Result<()> {
        if self
            .staged
            .properties
            .values()
            .any(|p| p.serial_number == property.serial_number)
        {
            return Err(unique_violation("properties.serial_number"));
        }
        self.staged.properties.insert(property.id, property.clone());
        Ok(())
    }

    async fn update_property(&mut self, property: &Property) -> Result<()> {
        if let Some(stored) = self.staged.properties.get_mut(&property.id) {
            stored.status = property.status;
            stored.holder_id = property.holder_id;
            stored.updated_at = property.updated_at;
        }
        Ok(())
    }

    async fn credential(&mut self, id: CredentialId) -> Result<Option<Credential>> {
        Ok(self.staged.credentials.get(&id).cloned())
    }

    async fn active_credential(&mut self, property: PropertyId) -> Result<Option<Credential>> {
        Ok(self
            .staged
            .credentials
            .values()
            .find(|c| c.property_id == property && c.active)
            .cloned())
    }

    async fn credentials_for(&mut self, property: PropertyId) -> Result<Vec<Credential>> {
        let mut credentials: Vec<Credential> = self
            .staged
            .credentials
            .values()
            .filter(|c| c.property_id == property)
            .cloned()
            .collect();
        credentials.sort_by_key(|c| c.created_at);
        Ok(credentials)
    }

    async fn insert_credential(&mut self, credential: &Credential) -> Result<()> {
        if credential.active
            && self
                .staged
                .credentials
                .values()
                .any(|c| c.property_id == credential.property_id && c.active)
        {
            return Err(unique_violation("uq_credentials_one_active"));
        }
        self.staged
            .credentials
            .insert(credential.id, credential.clone());
        Ok(())
    }

    async fn update_credential(&mut self, credential: &Credential) -> Result<()> {
        if let Some(stored) = self.staged.credentials.get_mut(&credential.id) {
            stored.active = credential.active;
            stored.deactivated_at = credential.deactivated_at;
            stored.deactivation_reason = credential.deactivation_reason.clone();
        }
        Ok(())
    }

    async fn transfer(&mut self, id: TransferId) -> Result<Option<Transfer>> {
        Ok(self.staged.transfers.get(&id).cloned())
    }

    async fn pending_transfer(&mut self, property: PropertyId) -> Result<Option<Transfer>> {
        Ok(self
            .staged
            .transfers
            .values()
            .find(|t| t.property_id == property && t.is_pending())
            .cloned())
    }

    async fn transfers_for_property(&mut self, property: PropertyId) -> Result<Vec<Transfer>> {
        let mut transfers: Vec<Transfer> = self
            .staged
            .transfers
            .values()
            .filter(|t| t.property_id == property)
            .cloned()
            .collect();
        transfers.sort_by_key(|t| t.requested_at);
        Ok(transfers)
    }

    async fn transfers_for_actor(&mut self, actor: ActorId) -> Result<Vec<Transfer>> {
        let mut transfers: Vec<Transfer> = self
            .staged
            .transfers
            .values()
            .filter(|t| t.involves(actor))
            .cloned()
            .collect();
        transfers.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(transfers)
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<()> {
        if transfer.is_pending()
            && self
                .staged
                .transfers
                .values()
                .any(|t| t.property_id == transfer.property_id && t.is_pending())
        {
            return Err(unique_violation("uq_transfers_one_pending"));
        }
        self.staged.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<()> {
        if let Some(stored) = self.staged.transfers.get_mut(&transfer.id) {
            stored.status = transfer.status;
            stored.decided_at = transfer.decided_at;
            stored.decided_by = transfer.decided_by;
            stored.note = transfer.note.clone();
        }
        Ok(())
    }

    async fn insert_correction(&mut self, correction: &CorrectionEvent) -> Result<()> {
        self.staged.corrections.push(correction.clone());
        Ok(())
    }

    async fn correction(&mut self, id: CorrectionId) -> Result<Option<CorrectionEvent>> {
        Ok(self
            .staged
            .corrections
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn corrections_for(&mut self, event: EventId) -> Result<Vec<CorrectionEvent>> {
        Ok(self
            .staged
            .corrections
            .iter()
            .filter(|c| c.original_event_id == event)
            .cloned()
            .collect())
    }

    async fn insert_verification(&mut self, verification: &VerificationEvent) -> Result<()> {
        self.staged.verifications.push(verification.clone());
        Ok(())
    }

    async fn verifications_for(&mut self, property: PropertyId) -> Result<Vec<VerificationEvent>> {
        Ok(self
            .staged
            .verifications
            .iter()
            .filter(|v| v.property_id == property)
            .cloned()
            .collect())
    }

    async fn all_corrections(&mut self) -> Result<Vec<CorrectionEvent>> {
        let mut corrections = self.staged.corrections.clone();
        corrections.sort_by_key(|c| c.ledger_event_id);
        Ok(corrections)
    }

    async fn attachment(&mut self, component: PropertyId) -> Result<Option<ComponentAttachment>> {
        Ok(self.staged.attachments.get(&component).cloned())
    }

    async fn components_of(&mut self, parent: PropertyId) -> Result<Vec<ComponentAttachment>> {
        let mut components: Vec<ComponentAttachment> = self
            .staged
            .attachments
            .values()
            .filter(|a| a.parent_id == parent)
            .cloned()
            .collect();
        components.sort_by(|a, b| {
            (a.attached_at, a.component_id).cmp(&(b.attached_at, b.component_id))
        });
        Ok(components)
    }

    async fn insert_attachment(&mut self, attachment: &ComponentAttachment) -> Result<()> {
        if self.staged.attachments.contains_key(&attachment.component_id) {
            return Err(unique_violation("property_components.component_id"));
        }
        if attachment.position.is_some()
            && self.staged.attachments.values().any(|a| {
                a.parent_id == attachment.parent_id && a.position == attachment.position
            })
        {
            return Err(unique_violation(COMPONENT_POSITION_INDEX));
        }
        self.staged
            .attachments
            .insert(attachment.component_id, attachment.clone());
        Ok(())
    }

    async fn delete_attachment(&mut self, component: PropertyId) -> Result<()> {
        self.staged.attachments.remove(&component);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        if let Some(mut guard) = self.guard {
            *guard = self.staged;
        }
        Ok(())
    }
}
