//! Custody coordinator.
//!
//! The entry point the API layer talks to. Each call carries an actor id the
//! session layer has already authenticated. The coordinator delegates to the
//! custody store, which runs every mutation in a single transaction, and
//! reports outcomes through `tracing`: integrity failures as security events,
//! durability failures as errors. Nothing is retried here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, error, info, warn};

use crate::config::CustodyConfig;
use crate::custody::{
    ActorId, ComponentAttachment, CorrectionEvent, CorrectionId, Credential, CredentialId,
    CredentialToken, CustodyError, CustodyResult, Decision, ErrorKind, EventId, IntegrityReport,
    LedgerEvent, LedgerEventType, NewAttachment, NewCorrection, NewMaintenance, NewProperty,
    NewVerification, Property, PropertyId, PropertyStatus, Transfer, TransferId,
    VerificationEvent, VerificationStatus,
};
use crate::storage::CustodyStore;

/// Log a failed operation according to its error class.
fn report<T>(operation: &'static str, result: CustodyResult<T>) -> CustodyResult<T> {
    if let Err(e) = &result {
        match e.kind() {
            ErrorKind::Integrity => {
                warn!(security = true, operation, error = %e, "Rejected credential");
            }
            ErrorKind::Durability => {
                error!(operation, error = %e, "Custody write failed");
            }
            ErrorKind::Unavailable => {
                error!(operation, error = %e, "Custody read failed");
            }
            _ => {
                debug!(operation, error = %e, "Custody operation refused");
            }
        }
    }
    result
}

/// Facade over the custody store.
#[derive(Clone)]
pub struct CustodyCoordinator {
    store: Arc<dyn CustodyStore>,
    config: CustodyConfig,
}

impl CustodyCoordinator {
    pub fn new(store: Arc<dyn CustodyStore>, config: CustodyConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn CustodyStore> {
        &self.store
    }

    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }

    // --- property intake ---

    #[tracing::instrument(name = "custody.register_property", skip_all, fields(serial = %new.serial_number, %actor))]
    pub async fn register_property(
        &self,
        new: NewProperty,
        actor: ActorId,
    ) -> CustodyResult<Property> {
        let property = report(
            "register_property",
            self.store.register_property(new, actor).await,
        )?;
        info!(property_id = %property.id, "Property registered");
        Ok(property)
    }

    #[tracing::instrument(name = "custody.change_status", skip_all, fields(%property, %actor, %status))]
    pub async fn change_status(
        &self,
        property: PropertyId,
        actor: ActorId,
        status: PropertyStatus,
    ) -> CustodyResult<Property> {
        report(
            "change_status",
            self.store.change_status(property, actor, status).await,
        )
    }

    pub async fn property(&self, id: PropertyId) -> CustodyResult<Property> {
        self.store.property(id).await
    }

    pub async fn property_by_serial(&self, serial_number: &str) -> CustodyResult<Option<Property>> {
        self.store.property_by_serial(serial_number).await
    }

    // --- credentials ---

    /// IssueCredential: fresh QR credential for the current holder.
    #[tracing::instrument(name = "custody.issue_credential", skip_all, fields(%property, %requester))]
    pub async fn issue_credential(
        &self,
        property: PropertyId,
        requester: ActorId,
    ) -> CustodyResult<Credential> {
        let credential = report(
            "issue_credential",
            self.store.issue_credential(property, requester).await,
        )?;
        info!(credential_id = %credential.id, "Credential issued");
        Ok(credential)
    }

    #[tracing::instrument(name = "custody.verify_credential", skip_all, fields(credential_id = %token.credential_id))]
    pub async fn verify_credential(&self, token: &CredentialToken) -> CustodyResult<Credential> {
        report("verify_credential", self.store.verify_credential(token).await)
    }

    /// Verify the text read from a QR label.
    pub async fn verify_scanned(&self, text: &str) -> CustodyResult<Credential> {
        let token = report("verify_credential", CredentialToken::decode(text))?;
        self.verify_credential(&token).await
    }

    /// Holder reports a damaged or lost label.
    #[tracing::instrument(name = "custody.deactivate_credential", skip_all, fields(%credential, %actor))]
    pub async fn deactivate_credential(
        &self,
        credential: CredentialId,
        actor: ActorId,
        reason: &str,
    ) -> CustodyResult<Credential> {
        report(
            "deactivate_credential",
            self.store
                .deactivate_credential(credential, actor, reason)
                .await,
        )
    }

    pub async fn credentials(&self, property: PropertyId) -> CustodyResult<Vec<Credential>> {
        self.store.credentials_for(property).await
    }

    // --- transfers ---

    /// InitiateTransfer: the scanner asks to take custody.
    #[tracing::instrument(name = "custody.initiate_transfer", skip_all, fields(credential_id = %token.credential_id, %scanner))]
    pub async fn initiate_transfer(
        &self,
        token: &CredentialToken,
        scanner: ActorId,
    ) -> CustodyResult<Transfer> {
        let transfer = report(
            "initiate_transfer",
            self.store.initiate_transfer(token, scanner).await,
        )?;
        info!(
            transfer_id = %transfer.id,
            property_id = %transfer.property_id,
            from = %transfer.from_holder,
            "Transfer requested"
        );
        Ok(transfer)
    }

    /// InitiateTransfer from raw QR text.
    pub async fn initiate_scanned(&self, text: &str, scanner: ActorId) -> CustodyResult<Transfer> {
        let token = report("initiate_transfer", CredentialToken::decode(text))?;
        self.initiate_transfer(&token, scanner).await
    }

    /// DecideTransfer: the current holder approves or rejects.
    #[tracing::instrument(name = "custody.decide_transfer", skip_all, fields(%transfer, %decider, ?decision))]
    pub async fn decide_transfer(
        &self,
        transfer: TransferId,
        decider: ActorId,
        decision: Decision,
        note: Option<String>,
    ) -> CustodyResult<Transfer> {
        let decided = report(
            "decide_transfer",
            self.store
                .decide_transfer(transfer, decider, decision, note)
                .await,
        )?;
        info!(status = %decided.status, "Transfer decided");
        Ok(decided)
    }

    /// CancelTransfer: either party withdraws a pending request.
    #[tracing::instrument(name = "custody.cancel_transfer", skip_all, fields(%transfer, %requester))]
    pub async fn cancel_transfer(
        &self,
        transfer: TransferId,
        requester: ActorId,
        note: Option<String>,
    ) -> CustodyResult<Transfer> {
        report(
            "cancel_transfer",
            self.store.cancel_transfer(transfer, requester, note).await,
        )
    }

    pub async fn transfer(&self, id: TransferId) -> CustodyResult<Transfer> {
        self.store.transfer(id).await
    }

    pub async fn transfers_for_property(
        &self,
        property: PropertyId,
    ) -> CustodyResult<Vec<Transfer>> {
        self.store.transfers_for_property(property).await
    }

    pub async fn transfers_for_actor(&self, actor: ActorId) -> CustodyResult<Vec<Transfer>> {
        self.store.transfers_for_actor(actor).await
    }

    // --- history ---

    /// GetHistory, collected.
    pub async fn history(&self, property: PropertyId) -> CustodyResult<Vec<LedgerEvent>> {
        report("history", self.store.history(property).await)
    }

    /// GetHistory as a stream of events in ledger order.
    ///
    /// Pages are fetched lazily, `history_page_size` at a time. Passing the
    /// id of the last event already seen resumes after it.
    pub fn history_stream(
        &self,
        property: PropertyId,
        after: Option<EventId>,
    ) -> BoxStream<'static, CustodyResult<LedgerEvent>> {
        let cursor = HistoryCursor {
            store: Arc::clone(&self.store),
            property,
            after,
            page_size: self.config.history_page_size.max(1),
            exhausted: false,
        };
        stream::try_unfold(cursor, HistoryCursor::next_page)
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, CustodyError>)))
            .try_flatten()
            .boxed()
    }

    /// Newest events across all properties.
    pub async fn recent_events(&self, limit: u32) -> CustodyResult<Vec<LedgerEvent>> {
        report("recent_events", self.store.recent_events(limit).await)
    }

    pub async fn event(&self, id: EventId) -> CustodyResult<LedgerEvent> {
        report("event", self.store.event(id).await)
    }

    // --- corrections & verifications ---

    /// RecordCorrection: amend an event without touching it.
    #[tracing::instrument(name = "custody.record_correction", skip_all, fields(original = %correction.original_event_id, reviewer = %correction.corrected_by))]
    pub async fn record_correction(
        &self,
        correction: NewCorrection,
    ) -> CustodyResult<CorrectionEvent> {
        report(
            "record_correction",
            self.store.record_correction(correction).await,
        )
    }

    pub async fn correction(&self, id: CorrectionId) -> CustodyResult<CorrectionEvent> {
        self.store.correction(id).await
    }

    pub async fn corrections_for(&self, event: EventId) -> CustodyResult<Vec<CorrectionEvent>> {
        self.store.corrections_for(event).await
    }

    /// Every correction on record, for audit review.
    pub async fn all_corrections(&self) -> CustodyResult<Vec<CorrectionEvent>> {
        report("all_corrections", self.store.all_corrections().await)
    }

    /// RecordVerification: physical sighting of an item.
    #[tracing::instrument(name = "custody.record_verification", skip_all, fields(property = %verification.property_id, verifier = %verification.verifier_id))]
    pub async fn record_verification(
        &self,
        verification: NewVerification,
    ) -> CustodyResult<VerificationEvent> {
        report(
            "record_verification",
            self.store.record_verification(verification).await,
        )
    }

    pub async fn verifications(&self, property: PropertyId) -> CustodyResult<Vec<VerificationEvent>> {
        self.store.verifications_for(property).await
    }

    /// Where the item stands in its verification cycle at `now`.
    pub async fn verification_status(
        &self,
        property: PropertyId,
        now: DateTime<Utc>,
    ) -> CustodyResult<VerificationStatus> {
        let verifications = self.store.verifications_for(property).await?;
        let latest = verifications.iter().max_by_key(|v| v.created_at);
        Ok(VerificationStatus::derive(
            property,
            latest,
            now,
            self.config.verification_interval(),
        ))
    }

    // --- maintenance & components ---

    #[tracing::instrument(name = "custody.record_maintenance", skip_all, fields(property = %maintenance.property_id, record = %maintenance.record_id, stage = %maintenance.stage))]
    pub async fn record_maintenance(&self, maintenance: NewMaintenance) -> CustodyResult<LedgerEvent> {
        report(
            "record_maintenance",
            self.store.record_maintenance(maintenance).await,
        )
    }

    /// Maintenance entries in one item's history, oldest first.
    pub async fn maintenance_history(&self, property: PropertyId) -> CustodyResult<Vec<LedgerEvent>> {
        let mut events = self.history(property).await?;
        events.retain(|e| e.event_type == LedgerEventType::Maintenance);
        Ok(events)
    }

    #[tracing::instrument(name = "custody.attach_component", skip_all, fields(parent = %attachment.parent_id, component = %attachment.component_id, actor = %attachment.attached_by))]
    pub async fn attach_component(
        &self,
        attachment: NewAttachment,
    ) -> CustodyResult<ComponentAttachment> {
        let attached = report(
            "attach_component",
            self.store.attach_component(attachment).await,
        )?;
        info!(position = ?attached.position, "Component attached");
        Ok(attached)
    }

    #[tracing::instrument(name = "custody.detach_component", skip_all, fields(%parent, %component, %actor))]
    pub async fn detach_component(
        &self,
        parent: PropertyId,
        component: PropertyId,
        actor: ActorId,
    ) -> CustodyResult<ComponentAttachment> {
        report(
            "detach_component",
            self.store.detach_component(parent, component, actor).await,
        )
    }

    pub async fn components(&self, parent: PropertyId) -> CustodyResult<Vec<ComponentAttachment>> {
        self.store.components_of(parent).await
    }

    pub async fn attachment_of(
        &self,
        component: PropertyId,
    ) -> CustodyResult<Option<ComponentAttachment>> {
        self.store.attachment_of(component).await
    }

    // --- integrity ---

    #[tracing::instrument(name = "custody.verify_integrity", skip_all, fields(%property))]
    pub async fn verify_integrity(&self, property: PropertyId) -> CustodyResult<bool> {
        let intact = report(
            "verify_integrity",
            self.store.verify_integrity(property).await,
        )?;
        if !intact {
            warn!(security = true, %property, "Ledger integrity check failed");
        }
        Ok(intact)
    }

    #[tracing::instrument(name = "custody.verify_chain", skip_all)]
    pub async fn verify_chain(&self) -> CustodyResult<IntegrityReport> {
        let chain = report("verify_chain", self.store.verify_chain().await)?;
        for problem in &chain.problems {
            warn!(security = true, event_id = %problem.event(), ?problem, "Ledger chain problem");
        }
        Ok(chain)
    }
}

/// Keyset cursor over one property's history.
struct HistoryCursor {
    store: Arc<dyn CustodyStore>,
    property: PropertyId,
    after: Option<EventId>,
    page_size: u32,
    exhausted: bool,
}

impl HistoryCursor {
    async fn next_page(mut self) -> Result<Option<(Vec<LedgerEvent>, Self)>, CustodyError> {
        if self.exhausted {
            return Ok(None);
        }
        let page = self
            .store
            .history_page(self.property, self.after, self.page_size)
            .await?;
        let Some(last) = page.last() else {
            return Ok(None);
        };
        self.after = Some(last.id);
        self.exhausted = page.len() < self.page_size as usize;
        Ok(Some((page, self)))
    }
}
