//! Custody storage interface.

use async_trait::async_trait;

use super::LedgerStore;
use crate::custody::{
    ActorId, ComponentAttachment, CorrectionEvent, CorrectionId, Credential, CredentialId,
    CredentialToken, CustodyResult, Decision, EventId, LedgerEvent, NewAttachment,
    NewCorrection, NewMaintenance, NewProperty, NewVerification, Property, PropertyId,
    PropertyStatus, Transfer, TransferId, VerificationEvent,
};

/// Interface for custody state and its audit trail.
///
/// Every mutating operation runs in one transaction together with the ledger
/// event that documents it. Either both are committed or neither is. Storage
/// failures surface as `WriteError` from mutations and `ReadError` from
/// read-only operations.
#[async_trait]
pub trait CustodyStore: LedgerStore {
    // --- properties ---

    /// Register a new item and append `create`.
    async fn register_property(&self, new: NewProperty, actor: ActorId) -> CustodyResult<Property>;

    async fn property(&self, id: PropertyId) -> CustodyResult<Property>;

    async fn property_by_serial(&self, serial_number: &str) -> CustodyResult<Option<Property>>;

    /// Change operational status. Holder only; setting the current status is a no-op.
    async fn change_status(
        &self,
        id: PropertyId,
        actor: ActorId,
        status: PropertyStatus,
    ) -> CustodyResult<Property>;

    // --- credentials ---

    /// Issue a fresh credential, deactivating any active one for the property.
    async fn issue_credential(
        &self,
        property: PropertyId,
        requester: ActorId,
    ) -> CustodyResult<Credential>;

    async fn credential(&self, id: CredentialId) -> CustodyResult<Credential>;

    async fn credentials_for(&self, property: PropertyId) -> CustodyResult<Vec<Credential>>;

    /// Check a presented token without changing anything.
    async fn verify_credential(&self, token: &CredentialToken) -> CustodyResult<Credential>;

    /// Holder-reported deactivation (damaged or lost label).
    async fn deactivate_credential(
        &self,
        id: CredentialId,
        actor: ActorId,
        reason: &str,
    ) -> CustodyResult<Credential>;

    // --- transfers ---

    /// Verify a scanned credential and open a pending transfer to the scanner.
    async fn initiate_transfer(
        &self,
        token: &CredentialToken,
        scanner: ActorId,
    ) -> CustodyResult<Transfer>;

    async fn decide_transfer(
        &self,
        id: TransferId,
        decider: ActorId,
        decision: Decision,
        note: Option<String>,
    ) -> CustodyResult<Transfer>;

    async fn cancel_transfer(
        &self,
        id: TransferId,
        requester: ActorId,
        note: Option<String>,
    ) -> CustodyResult<Transfer>;

    async fn transfer(&self, id: TransferId) -> CustodyResult<Transfer>;

    async fn transfers_for_property(&self, property: PropertyId) -> CustodyResult<Vec<Transfer>>;

    /// Transfers where the actor is either party, newest first.
    async fn transfers_for_actor(&self, actor: ActorId) -> CustodyResult<Vec<Transfer>>;

    // --- corrections and verifications ---

    async fn record_correction(&self, correction: NewCorrection) -> CustodyResult<CorrectionEvent>;

    async fn correction(&self, id: CorrectionId) -> CustodyResult<CorrectionEvent>;

    async fn corrections_for(&self, event: EventId) -> CustodyResult<Vec<CorrectionEvent>>;

    /// Every correction ever recorded, in ledger order.
    async fn all_corrections(&self) -> CustodyResult<Vec<CorrectionEvent>>;

    async fn record_verification(
        &self,
        verification: NewVerification,
    ) -> CustodyResult<VerificationEvent>;

    async fn verifications_for(&self, property: PropertyId)
        -> CustodyResult<Vec<VerificationEvent>>;

    // --- maintenance and components ---

    /// Log a maintenance step as a `maintenance` event. Any actor may log.
    async fn record_maintenance(&self, maintenance: NewMaintenance) -> CustodyResult<LedgerEvent>;

    /// Attach a component to a parent. The actor must hold both items.
    /// Appends `component_attach` to both histories.
    async fn attach_component(&self, attachment: NewAttachment)
        -> CustodyResult<ComponentAttachment>;

    /// Detach a component from its parent. The actor must hold the parent.
    /// Appends `component_detach` to both histories.
    async fn detach_component(
        &self,
        parent: PropertyId,
        component: PropertyId,
        actor: ActorId,
    ) -> CustodyResult<ComponentAttachment>;

    /// Components currently attached to `parent`, oldest first.
    async fn components_of(&self, parent: PropertyId) -> CustodyResult<Vec<ComponentAttachment>>;

    /// The parent `component` is attached to, if any.
    async fn attachment_of(&self, component: PropertyId)
        -> CustodyResult<Option<ComponentAttachment>>;
}
