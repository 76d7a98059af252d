//! CustodyStore interface tests.
//!
//! These tests verify the contract of the CustodyStore trait.
//! Each storage implementation should run these tests. Tests share one
//! store, so every test registers its own items and actors.

use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::json;
use uuid::Uuid;

use handreceipt_custody::custody::{
    ActorId, CorrectionId, CredentialId, CustodyError, Decision, EventId, LedgerEventType,
    MaintenanceStage, NewAttachment, NewCorrection, NewMaintenance, NewProperty,
    NewVerification, Property, PropertyId, PropertyStatus, TransferId, TransferStatus,
    VerificationResult, GENESIS_HASH,
};
use handreceipt_custody::storage::CustodyStore;

/// A fresh actor id, unique within the test binary.
pub fn actor() -> ActorId {
    static NEXT: AtomicI64 = AtomicI64::new(1_000);
    ActorId(NEXT.fetch_add(1, Ordering::SeqCst))
}

/// A serial number no other test uses.
pub fn serial(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Register an item held by `holder`.
pub async fn held_item<S: CustodyStore>(store: &S, holder: ActorId) -> Property {
    store
        .register_property(NewProperty::new(serial("SN"), "Rifle, 5.56mm").held_by(holder), holder)
        .await
        .expect("register should succeed")
}

// =============================================================================
// Property intake
// =============================================================================

pub async fn test_register_appends_create<S: CustodyStore>(store: &S) {
    let holder = actor();
    let item = held_item(store, holder).await;

    let history = store.history(item.id).await.expect("history should succeed");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_type, LedgerEventType::Create);
    assert_eq!(history[0].actor_id, holder);
    assert_eq!(history[0].payload["serial_number"], json!(item.serial_number));

    let found = store
        .property_by_serial(&item.serial_number)
        .await
        .expect("lookup should succeed");
    assert_eq!(found, Some(item));
}

pub async fn test_register_duplicate_serial<S: CustodyStore>(store: &S) {
    let holder = actor();
    let item = held_item(store, holder).await;

    let err = store
        .register_property(NewProperty::new(item.serial_number.clone(), "Copy"), holder)
        .await
        .expect_err("duplicate serial should fail");
    assert!(matches!(err, CustodyError::DuplicateSerial(_)), "got {err:?}");
}

pub async fn test_register_blank_serial<S: CustodyStore>(store: &S) {
    let err = store
        .register_property(NewProperty::new("  ", "Nameless"), actor())
        .await
        .expect_err("blank serial should fail");
    assert!(matches!(err, CustodyError::InvalidInput(_)));
}

pub async fn test_change_status<S: CustodyStore>(store: &S) {
    let holder = actor();
    let item = held_item(store, holder).await;

    let err = store
        .change_status(item.id, actor(), PropertyStatus::Damaged)
        .await
        .expect_err("non-holder should be refused");
    assert!(matches!(err, CustodyError::NotHolder { .. }));

    let changed = store
        .change_status(item.id, holder, PropertyStatus::Damaged)
        .await
        .expect("holder may change status");
    assert_eq!(changed.status, PropertyStatus::Damaged);

    // Same status again records nothing.
    store
        .change_status(item.id, holder, PropertyStatus::Damaged)
        .await
        .expect("no-op should succeed");

    let history = store.history(item.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].event_type, LedgerEventType::StatusChange);
    assert_eq!(history[1].payload["from"], json!("operational"));
    assert_eq!(history[1].payload["to"], json!("damaged"));
}

// =============================================================================
// Credentials
// =============================================================================

pub async fn test_issue_requires_holder<S: CustodyStore>(store: &S) {
    let item = held_item(store, actor()).await;
    let err = store
        .issue_credential(item.id, actor())
        .await
        .expect_err("non-holder should be refused");
    assert!(matches!(err, CustodyError::NotHolder { .. }));
}

pub async fn test_reissue_deactivates_previous<S: CustodyStore>(store: &S) {
    let holder = actor();
    let item = held_item(store, holder).await;
    let first = store.issue_credential(item.id, holder).await.unwrap();
    let second = store.issue_credential(item.id, holder).await.unwrap();

    let credentials = store.credentials_for(item.id).await.unwrap();
    assert_eq!(credentials.len(), 2);
    assert_eq!(credentials.iter().filter(|c| c.active).count(), 1);

    let old = store.credential(first.id).await.unwrap();
    assert!(!old.active);
    assert!(old.deactivated_at.is_some());
    assert!(store.credential(second.id).await.unwrap().active);

    let err = store
        .initiate_transfer(&first.token(), actor())
        .await
        .expect_err("superseded credential should be refused");
    assert!(matches!(err, CustodyError::InactiveCredential(id) if id == first.id));

    let history = store.history(item.id).await.unwrap();
    let issues: Vec<_> = history
        .iter()
        .filter(|e| e.event_type == LedgerEventType::CredentialIssue)
        .collect();
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[1].payload["superseded"], json!(first.id));
}

pub async fn test_verify_credential<S: CustodyStore>(store: &S) {
    let holder = actor();
    let item = held_item(store, holder).await;
    let credential = store.issue_credential(item.id, holder).await.unwrap();

    let verified = store.verify_credential(&credential.token()).await.unwrap();
    assert_eq!(verified.id, credential.id);

    // Edited payload no longer matches its hash.
    let mut edited = credential.token();
    edited.payload.holder_id = actor();
    let err = store.verify_credential(&edited).await.unwrap_err();
    assert!(matches!(err, CustodyError::TamperedCredential { .. }));

    // Self-consistent forgery that was never issued.
    let mut forged = credential.token();
    forged.payload.holder_id = actor();
    forged.hash = forged.payload.digest();
    let err = store.verify_credential(&forged).await.unwrap_err();
    assert!(matches!(err, CustodyError::TamperedCredential { .. }));

    // Unknown credential id.
    let mut unknown = credential.token();
    unknown.credential_id = CredentialId::generate();
    let err = store.verify_credential(&unknown).await.unwrap_err();
    assert!(matches!(err, CustodyError::TamperedCredential { .. }));
}

pub async fn test_deactivate_credential<S: CustodyStore>(store: &S) {
    let holder = actor();
    let item = held_item(store, holder).await;
    let credential = store.issue_credential(item.id, holder).await.unwrap();

    let err = store
        .deactivate_credential(credential.id, holder, " ")
        .await
        .expect_err("blank reason should fail");
    assert!(matches!(err, CustodyError::InvalidInput(_)));

    let err = store
        .deactivate_credential(credential.id, actor(), "label torn")
        .await
        .expect_err("non-holder should be refused");
    assert!(matches!(err, CustodyError::NotHolder { .. }));

    let deactivated = store
        .deactivate_credential(credential.id, holder, "label torn")
        .await
        .unwrap();
    assert!(!deactivated.active);
    assert_eq!(deactivated.deactivation_reason.as_deref(), Some("label torn"));

    let err = store
        .deactivate_credential(credential.id, holder, "again")
        .await
        .expect_err("second deactivation should fail");
    assert!(matches!(err, CustodyError::InactiveCredential(_)));

    let last = store.history(item.id).await.unwrap().pop().unwrap();
    assert_eq!(last.event_type, LedgerEventType::CredentialDeactivate);
    assert_eq!(last.payload["reason"], json!("label torn"));
}

// =============================================================================
// Transfers
// =============================================================================

pub async fn test_self_transfer_refused<S: CustodyStore>(store: &S) {
    let holder = actor();
    let item = held_item(store, holder).await;
    let credential = store.issue_credential(item.id, holder).await.unwrap();

    let err = store
        .initiate_transfer(&credential.token(), holder)
        .await
        .expect_err("holder scanning own label should fail");
    assert!(matches!(err, CustodyError::SelfTransfer { .. }));
}

pub async fn test_duplicate_pending_refused<S: CustodyStore>(store: &S) {
    let holder = actor();
    let item = held_item(store, holder).await;
    let credential = store.issue_credential(item.id, holder).await.unwrap();

    let transfer = store
        .initiate_transfer(&credential.token(), actor())
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::Pending);

    let err = store
        .initiate_transfer(&credential.token(), actor())
        .await
        .expect_err("second request should conflict");
    assert!(matches!(err, CustodyError::DuplicatePending(id) if id == item.id));

    let transfers = store.transfers_for_property(item.id).await.unwrap();
    assert_eq!(transfers.len(), 1);
}

/// P123 held by A, credential C1, B requests, A approves.
pub async fn test_approve_moves_custody<S: CustodyStore>(store: &S) {
    let a = actor();
    let b = actor();
    let item = held_item(store, a).await;
    let c1 = store.issue_credential(item.id, a).await.unwrap();
    let transfer = store.initiate_transfer(&c1.token(), b).await.unwrap();

    let err = store
        .decide_transfer(transfer.id, b, Decision::Approve, None)
        .await
        .expect_err("only the holder decides");
    assert!(matches!(err, CustodyError::NotAuthorized { .. }));

    let approved = store
        .decide_transfer(transfer.id, a, Decision::Approve, Some("signed over".into()))
        .await
        .unwrap();
    assert_eq!(approved.status, TransferStatus::Approved);
    assert_eq!(approved.decided_by, Some(a));
    assert!(approved.decided_at.is_some());

    let item_now = store.property(item.id).await.unwrap();
    assert_eq!(item_now.holder_id, Some(b));
    assert!(!store.credential(c1.id).await.unwrap().active);

    let history = store.history(item.id).await.unwrap();
    let approvals: Vec<_> = history
        .iter()
        .filter(|e| e.event_type == LedgerEventType::TransferApprove)
        .collect();
    assert_eq!(approvals.len(), 1);
    assert_eq!(approvals[0].transfer_id, Some(transfer.id));

    let err = store
        .decide_transfer(transfer.id, a, Decision::Approve, None)
        .await
        .expect_err("second decision should fail");
    assert!(matches!(
        err,
        CustodyError::AlreadyDecided {
            status: TransferStatus::Approved,
            ..
        }
    ));

    // C1 now names the previous holder.
    let err = store
        .initiate_transfer(&c1.token(), actor())
        .await
        .expect_err("stale credential should be refused");
    assert!(matches!(err, CustodyError::StaleCredential { .. }));

    // The new holder can issue and hand it on.
    let c2 = store.issue_credential(item.id, b).await.unwrap();
    store.initiate_transfer(&c2.token(), a).await.unwrap();
}

pub async fn test_reject_keeps_custody<S: CustodyStore>(store: &S) {
    let a = actor();
    let b = actor();
    let item = held_item(store, a).await;
    let credential = store.issue_credential(item.id, a).await.unwrap();
    let transfer = store
        .initiate_transfer(&credential.token(), b)
        .await
        .unwrap();

    let rejected = store
        .decide_transfer(transfer.id, a, Decision::Reject, Some("wrong unit".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, TransferStatus::Rejected);
    assert_eq!(rejected.note.as_deref(), Some("wrong unit"));

    assert_eq!(store.property(item.id).await.unwrap().holder_id, Some(a));
    assert!(!store.credential(credential.id).await.unwrap().active);

    let history = store.history(item.id).await.unwrap();
    assert!(history
        .iter()
        .all(|e| e.event_type != LedgerEventType::TransferApprove));
    assert_eq!(
        history.last().map(|e| e.event_type),
        Some(LedgerEventType::TransferReject)
    );

    // A fresh credential allows a new request.
    let fresh = store.issue_credential(item.id, a).await.unwrap();
    store.initiate_transfer(&fresh.token(), b).await.unwrap();
}

pub async fn test_cancel_transfer<S: CustodyStore>(store: &S) {
    let a = actor();
    let b = actor();
    let item = held_item(store, a).await;
    let credential = store.issue_credential(item.id, a).await.unwrap();
    let transfer = store
        .initiate_transfer(&credential.token(), b)
        .await
        .unwrap();

    let err = store
        .cancel_transfer(transfer.id, actor(), None)
        .await
        .expect_err("outsider cannot cancel");
    assert!(matches!(err, CustodyError::NotAuthorized { .. }));

    let cancelled = store
        .cancel_transfer(transfer.id, b, Some("changed my mind".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, TransferStatus::Cancelled);
    assert_eq!(store.property(item.id).await.unwrap().holder_id, Some(a));
    assert!(!store.credential(credential.id).await.unwrap().active);

    let err = store
        .cancel_transfer(transfer.id, a, None)
        .await
        .expect_err("terminal transfer cannot be cancelled");
    assert!(matches!(err, CustodyError::AlreadyDecided { .. }));

    let err = store
        .decide_transfer(transfer.id, a, Decision::Approve, None)
        .await
        .expect_err("cancelled transfer cannot be approved");
    assert!(matches!(err, CustodyError::AlreadyDecided { .. }));
}

pub async fn test_transfer_listings<S: CustodyStore>(store: &S) {
    let a = actor();
    let b = actor();
    let item = held_item(store, a).await;
    let c1 = store.issue_credential(item.id, a).await.unwrap();
    let first = store.initiate_transfer(&c1.token(), b).await.unwrap();
    store
        .decide_transfer(first.id, a, Decision::Reject, None)
        .await
        .unwrap();
    let c2 = store.issue_credential(item.id, a).await.unwrap();
    let second = store.initiate_transfer(&c2.token(), b).await.unwrap();

    let for_property = store.transfers_for_property(item.id).await.unwrap();
    assert_eq!(
        for_property.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );

    let for_b = store.transfers_for_actor(b).await.unwrap();
    assert_eq!(for_b.len(), 2);
    assert!(store.transfers_for_actor(actor()).await.unwrap().is_empty());

    let fetched = store.transfer(second.id).await.unwrap();
    assert_eq!(fetched, second);
}

// =============================================================================
// Corrections and verifications
// =============================================================================

pub async fn test_correction_leaves_original<S: CustodyStore>(store: &S) {
    let holder = actor();
    let reviewer = actor();
    let item = held_item(store, holder).await;
    let original = store.history(item.id).await.unwrap().remove(0);

    let err = store
        .record_correction(NewCorrection::new(original.id, " ", json!({}), reviewer))
        .await
        .expect_err("blank reason should fail");
    assert!(matches!(err, CustodyError::InvalidInput(_)));

    let correction = store
        .record_correction(NewCorrection::new(
            original.id,
            "serial transcribed wrong",
            json!({ "serial_number": "SN-FIXED" }),
            reviewer,
        ))
        .await
        .unwrap();
    assert_eq!(correction.original_event_id, original.id);

    let reread = store.event(original.id).await.unwrap();
    assert_eq!(reread, original);

    let history = store.history(item.id).await.unwrap();
    let logged = history.last().unwrap();
    assert_eq!(logged.event_type, LedgerEventType::Correction);
    assert_eq!(logged.id, correction.ledger_event_id);
    assert_eq!(logged.payload["original_event_id"], json!(original.id));

    // A correction can itself be corrected.
    store
        .record_correction(NewCorrection::new(
            correction.ledger_event_id,
            "wrong fix",
            json!({ "serial_number": "SN-FIXED-2" }),
            reviewer,
        ))
        .await
        .unwrap();

    let listed = store.corrections_for(original.id).await.unwrap();
    assert_eq!(listed, vec![correction.clone()]);
    assert_eq!(store.correction(correction.id).await.unwrap(), correction);

    let everything = store.all_corrections().await.unwrap();
    let ours: Vec<_> = everything
        .iter()
        .filter(|c| c.original_event_id == original.id || c.original_event_id == correction.ledger_event_id)
        .collect();
    assert_eq!(ours.len(), 2);
    assert_eq!(ours[0], &correction);
    assert!(everything
        .windows(2)
        .all(|w| w[0].ledger_event_id < w[1].ledger_event_id));
}

pub async fn test_correction_missing_event<S: CustodyStore>(store: &S) {
    let missing = EventId(i64::MAX);
    let err = store
        .record_correction(NewCorrection::new(missing, "typo", json!({}), actor()))
        .await
        .expect_err("missing original should fail");
    assert!(matches!(err, CustodyError::EventNotFound(id) if id == missing));

    let err = store.corrections_for(missing).await.unwrap_err();
    assert!(matches!(err, CustodyError::EventNotFound(_)));
}

pub async fn test_verification_keeps_custody<S: CustodyStore>(store: &S) {
    let holder = actor();
    let verifier = actor();
    let item = held_item(store, holder).await;

    let recorded = store
        .record_verification(
            NewVerification::new(item.id, verifier, VerificationResult::Discrepant)
                .with_notes("scratched housing"),
        )
        .await
        .unwrap();
    assert_eq!(recorded.result, VerificationResult::Discrepant);

    let item_now = store.property(item.id).await.unwrap();
    assert_eq!(item_now.holder_id, Some(holder));
    assert_eq!(item_now.status, item.status);

    let listed = store.verifications_for(item.id).await.unwrap();
    assert_eq!(listed, vec![recorded.clone()]);

    let logged = store.event(recorded.ledger_event_id).await.unwrap();
    assert_eq!(logged.event_type, LedgerEventType::Verification);
    assert_eq!(logged.payload["holder_id"], json!(holder));
}

// =============================================================================
// Ledger reads and integrity
// =============================================================================

pub async fn test_history_pages_and_is_stable<S: CustodyStore>(store: &S) {
    let holder = actor();
    let item = held_item(store, holder).await;
    for _ in 0..3 {
        store.issue_credential(item.id, holder).await.unwrap();
    }

    let first_read = store.history(item.id).await.unwrap();
    let second_read = store.history(item.id).await.unwrap();
    assert_eq!(first_read, second_read);
    assert_eq!(first_read.len(), 4);

    let page1 = store.history_page(item.id, None, 3).await.unwrap();
    let page2 = store
        .history_page(item.id, page1.last().map(|e| e.id), 3)
        .await
        .unwrap();
    assert_eq!(page1.len(), 3);
    assert_eq!(page2.len(), 1);
    assert_eq!([page1, page2].concat(), first_read);
}

pub async fn test_chain_links<S: CustodyStore>(store: &S) {
    let holder = actor();
    let item = held_item(store, holder).await;
    store.issue_credential(item.id, holder).await.unwrap();

    let recent = store.recent_events(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent[0].id > recent[1].id);
    assert_eq!(recent[0].prev_hash, recent[1].hash);
    assert!(recent.iter().all(|e| e.content_intact()));

    assert!(store.verify_integrity(item.id).await.unwrap());
    let report = store.verify_chain().await.unwrap();
    assert!(report.is_intact(), "problems: {:?}", report.problems);
    assert_eq!(report.head, Some(recent[0].id));
    assert_eq!(report.head_hash, recent[0].hash);
    assert_ne!(report.head_hash, GENESIS_HASH);
}

pub async fn test_not_found<S: CustodyStore>(store: &S) {
    let unknown = PropertyId::generate();
    assert!(matches!(
        store.property(unknown).await,
        Err(CustodyError::PropertyNotFound(_))
    ));
    assert!(matches!(
        store.history(unknown).await,
        Err(CustodyError::PropertyNotFound(_))
    ));
    assert!(matches!(
        store.issue_credential(unknown, actor()).await,
        Err(CustodyError::PropertyNotFound(_))
    ));
    assert!(matches!(
        store.transfer(TransferId::generate()).await,
        Err(CustodyError::TransferNotFound(_))
    ));
    assert!(matches!(
        store
            .decide_transfer(TransferId::generate(), actor(), Decision::Reject, None)
            .await,
        Err(CustodyError::TransferNotFound(_))
    ));
    assert!(matches!(
        store.credential(CredentialId::generate()).await,
        Err(CustodyError::CredentialNotFound(_))
    ));
    assert!(matches!(
        store.correction(CorrectionId::generate()).await,
        Err(CustodyError::CorrectionNotFound(_))
    ));
    assert!(matches!(
        store.event(EventId(i64::MAX)).await,
        Err(CustodyError::EventNotFound(_))
    ));
    assert!(store
        .property_by_serial(&serial("NOPE"))
        .await
        .unwrap()
        .is_none());
}

// =============================================================================
// Maintenance and components
// =============================================================================

pub async fn test_maintenance_is_logged<S: CustodyStore>(store: &S) {
    let holder = actor();
    let technician = actor();
    let item = held_item(store, holder).await;

    let err = store
        .record_maintenance(NewMaintenance::new(item.id, "MR-1", technician, MaintenanceStage::Started, " "))
        .await
        .expect_err("blank description should fail");
    assert!(matches!(err, CustodyError::InvalidInput(_)));

    let event = store
        .record_maintenance(
            NewMaintenance::new(item.id, "MR-1", technician, MaintenanceStage::Completed, "Replaced extractor spring")
                .performed_by(technician)
                .of_type("corrective"),
        )
        .await
        .unwrap();
    assert_eq!(event.event_type, LedgerEventType::Maintenance);
    assert_eq!(event.actor_id, technician);
    assert_eq!(event.payload["maintenance_record_id"], json!("MR-1"));
    assert_eq!(event.payload["stage"], json!("completed"));
    assert_eq!(event.payload["maintenance_type"], json!("corrective"));

    // Logging maintenance never changes custody.
    let reread = store.property(item.id).await.unwrap();
    assert_eq!(reread.holder_id, Some(holder));
    assert_eq!(store.history(item.id).await.unwrap().last(), Some(&event));

    let err = store
        .record_maintenance(NewMaintenance::new(
            PropertyId(Uuid::new_v4()),
            "MR-2",
            technician,
            MaintenanceStage::Requested,
            "Inspect",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, CustodyError::PropertyNotFound(_)));
}

pub async fn test_attach_and_detach_component<S: CustodyStore>(store: &S) {
    let holder = actor();
    let rifle = held_item(store, holder).await;
    let optic = held_item(store, holder).await;

    let attached = store
        .attach_component(
            NewAttachment::new(rifle.id, optic.id, holder)
                .at_position("top_rail")
                .with_notes("zeroed"),
        )
        .await
        .unwrap();
    assert_eq!(attached.parent_id, rifle.id);
    assert_eq!(attached.position.as_deref(), Some("top_rail"));

    assert_eq!(store.components_of(rifle.id).await.unwrap(), vec![attached.clone()]);
    assert_eq!(store.attachment_of(optic.id).await.unwrap(), Some(attached.clone()));
    assert_eq!(store.attachment_of(rifle.id).await.unwrap(), None);

    for id in [rifle.id, optic.id] {
        let last = store.history(id).await.unwrap().pop().unwrap();
        assert_eq!(last.event_type, LedgerEventType::ComponentAttach);
        assert_eq!(last.payload["component_property_id"], json!(optic.id));
        assert_eq!(last.payload["parent_property_id"], json!(rifle.id));
    }

    let detached = store.detach_component(rifle.id, optic.id, holder).await.unwrap();
    assert_eq!(detached, attached);
    assert!(store.components_of(rifle.id).await.unwrap().is_empty());
    assert_eq!(store.attachment_of(optic.id).await.unwrap(), None);
    let last = store.history(optic.id).await.unwrap().pop().unwrap();
    assert_eq!(last.event_type, LedgerEventType::ComponentDetach);

    let err = store
        .detach_component(rifle.id, optic.id, holder)
        .await
        .expect_err("second detach should fail");
    assert!(matches!(err, CustodyError::NotAttached { .. }));

    // Neither item changed hands.
    assert_eq!(store.property(rifle.id).await.unwrap().holder_id, Some(holder));
    assert_eq!(store.property(optic.id).await.unwrap().holder_id, Some(holder));
    assert!(store.verify_chain().await.unwrap().is_intact());
}

pub async fn test_attach_component_rules<S: CustodyStore>(store: &S) {
    let holder = actor();
    let other = actor();
    let rifle = held_item(store, holder).await;
    let carbine = held_item(store, holder).await;
    let optic = held_item(store, holder).await;
    let light = held_item(store, holder).await;
    let borrowed = held_item(store, other).await;

    let err = store
        .attach_component(NewAttachment::new(rifle.id, rifle.id, holder))
        .await
        .unwrap_err();
    assert!(matches!(err, CustodyError::InvalidInput(_)));

    let err = store
        .attach_component(NewAttachment::new(rifle.id, borrowed.id, holder))
        .await
        .unwrap_err();
    assert!(matches!(err, CustodyError::NotHolder { property, .. } if property == borrowed.id));

    store
        .attach_component(NewAttachment::new(rifle.id, optic.id, holder).at_position("top_rail"))
        .await
        .unwrap();

    let err = store
        .attach_component(NewAttachment::new(carbine.id, optic.id, holder))
        .await
        .unwrap_err();
    assert!(matches!(err, CustodyError::AlreadyAttached { parent, .. } if parent == rifle.id));

    let err = store
        .attach_component(NewAttachment::new(rifle.id, light.id, holder).at_position("top_rail"))
        .await
        .unwrap_err();
    assert!(matches!(err, CustodyError::PositionOccupied { ref position, .. } if position == "top_rail"));

    // One level deep only.
    let err = store
        .attach_component(NewAttachment::new(optic.id, light.id, holder))
        .await
        .unwrap_err();
    assert!(matches!(err, CustodyError::InvalidInput(_)));
    let err = store
        .attach_component(NewAttachment::new(carbine.id, rifle.id, holder))
        .await
        .unwrap_err();
    assert!(matches!(err, CustodyError::InvalidInput(_)));

    // Only the parent's holder may detach.
    let err = store
        .detach_component(rifle.id, optic.id, other)
        .await
        .unwrap_err();
    assert!(matches!(err, CustodyError::NotHolder { .. }));

    // Refused requests wrote nothing.
    assert_eq!(store.history(light.id).await.unwrap().len(), 1);
    assert_eq!(store.components_of(rifle.id).await.unwrap().len(), 1);
}

/// Run all CustodyStore tests against a store.
#[macro_export]
macro_rules! run_custody_store_tests {
    ($store:expr) => {
        use $crate::storage::custody_store_tests::*;

        // property intake
        test_register_appends_create($store).await;
        println!("  test_register_appends_create: PASSED");

        test_register_duplicate_serial($store).await;
        println!("  test_register_duplicate_serial: PASSED");

        test_register_blank_serial($store).await;
        println!("  test_register_blank_serial: PASSED");

        test_change_status($store).await;
        println!("  test_change_status: PASSED");

        // credentials
        test_issue_requires_holder($store).await;
        println!("  test_issue_requires_holder: PASSED");

        test_reissue_deactivates_previous($store).await;
        println!("  test_reissue_deactivates_previous: PASSED");

        test_verify_credential($store).await;
        println!("  test_verify_credential: PASSED");

        test_deactivate_credential($store).await;
        println!("  test_deactivate_credential: PASSED");

        // transfers
        test_self_transfer_refused($store).await;
        println!("  test_self_transfer_refused: PASSED");

        test_duplicate_pending_refused($store).await;
        println!("  test_duplicate_pending_refused: PASSED");

        test_approve_moves_custody($store).await;
        println!("  test_approve_moves_custody: PASSED");

        test_reject_keeps_custody($store).await;
        println!("  test_reject_keeps_custody: PASSED");

        test_cancel_transfer($store).await;
        println!("  test_cancel_transfer: PASSED");

        test_transfer_listings($store).await;
        println!("  test_transfer_listings: PASSED");

        // corrections and verifications
        test_correction_leaves_original($store).await;
        println!("  test_correction_leaves_original: PASSED");

        test_correction_missing_event($store).await;
        println!("  test_correction_missing_event: PASSED");

        test_verification_keeps_custody($store).await;
        println!("  test_verification_keeps_custody: PASSED");

        // maintenance and components
        test_maintenance_is_logged($store).await;
        println!("  test_maintenance_is_logged: PASSED");

        test_attach_and_detach_component($store).await;
        println!("  test_attach_and_detach_component: PASSED");

        test_attach_component_rules($store).await;
        println!("  test_attach_component_rules: PASSED");

        // ledger
        test_history_pages_and_is_stable($store).await;
        println!("  test_history_pages_and_is_stable: PASSED");

        test_chain_links($store).await;
        println!("  test_chain_links: PASSED");

        test_not_found($store).await;
        println!("  test_not_found: PASSED");
    };
}
