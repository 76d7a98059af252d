//! Concurrency and tamper-evidence tests against a multi-connection SQLite
//! pool.
//!
//! Run with: cargo test --test concurrency --features sqlite

use std::sync::Arc;

use tokio::sync::Barrier;

use handreceipt_custody::custody::{
    ActorId, CustodyError, Decision, IntegrityProblem, NewAttachment, NewProperty, Property,
};
use handreceipt_custody::storage::{CustodyStore, LedgerStore, SqliteCustodyStore};

const HOLDER: ActorId = ActorId(1);
const RACERS: i64 = 8;

async fn open_store(dir: &tempfile::TempDir) -> SqliteCustodyStore {
    let store = SqliteCustodyStore::connect(dir.path().join("race.db"), RACERS as u32)
        .await
        .expect("Failed to open SQLite");
    store.init().await.expect("Failed to create schema");
    store
}

async fn held_item(store: &SqliteCustodyStore, serial: &str) -> Property {
    store
        .register_property(NewProperty::new(serial, "Night vision device").held_by(HOLDER), HOLDER)
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_scanners_one_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let item = held_item(&store, "SN-RACE-1").await;
    let token = store.issue_credential(item.id, HOLDER).await.unwrap().token();

    let barrier = Arc::new(Barrier::new(RACERS as usize));
    let mut handles = Vec::new();
    for scanner in 0..RACERS {
        let store = store.clone();
        let token = token.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store.initiate_transfer(&token, ActorId(100 + scanner)).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(CustodyError::DuplicatePending(id)) => assert_eq!(id, item.id),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners, 1);

    let transfers = store.transfers_for_property(item.id).await.unwrap();
    assert_eq!(transfers.len(), 1);
    assert!(store.verify_chain().await.unwrap().is_intact());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_issuers_leave_one_active() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let item = held_item(&store, "SN-RACE-2").await;

    let barrier = Arc::new(Barrier::new(RACERS as usize));
    let mut handles = Vec::new();
    for _ in 0..RACERS {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        let property = item.id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store.issue_credential(property, HOLDER).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("issuers are serialized, not refused");
    }

    let credentials = store.credentials_for(item.id).await.unwrap();
    assert_eq!(credentials.len(), RACERS as usize);
    assert_eq!(credentials.iter().filter(|c| c.active).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_approve_and_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let item = held_item(&store, "SN-RACE-3").await;
    let requester = ActorId(2);
    let token = store.issue_credential(item.id, HOLDER).await.unwrap().token();
    let transfer = store.initiate_transfer(&token, requester).await.unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let approve = {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            store
                .decide_transfer(transfer.id, HOLDER, Decision::Approve, None)
                .await
        })
    };
    let cancel = {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            store.cancel_transfer(transfer.id, requester, None).await
        })
    };

    let approved = approve.await.unwrap();
    let cancelled = cancel.await.unwrap();
    assert!(
        approved.is_ok() != cancelled.is_ok(),
        "exactly one decision must land"
    );
    let loser = approved.err().or(cancelled.err()).unwrap();
    assert!(matches!(loser, CustodyError::AlreadyDecided { .. }));

    let item_now = store.property(item.id).await.unwrap();
    let stored = store.transfer(transfer.id).await.unwrap();
    match stored.status {
        handreceipt_custody::custody::TransferStatus::Approved => {
            assert_eq!(item_now.holder_id, Some(requester))
        }
        _ => assert_eq!(item_now.holder_id, Some(HOLDER)),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_keep_chain_linear() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let mut handles = Vec::new();
    for i in 0..RACERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let item = held_item(&store, &format!("SN-CHAIN-{i}")).await;
            for _ in 0..3 {
                store.issue_credential(item.id, HOLDER).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let report = store.verify_chain().await.unwrap();
    assert!(report.is_intact(), "problems: {:?}", report.problems);
    assert_eq!(report.events_checked, (RACERS * 4) as u64);
}

#[tokio::test]
async fn test_tampered_row_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let item = held_item(&store, "SN-TAMPER").await;
    store.issue_credential(item.id, HOLDER).await.unwrap();
    let created = store.history(item.id).await.unwrap().remove(0);

    // Simulate someone with raw database access.
    sqlx::raw_sql("DROP TRIGGER ledger_events_no_update")
        .execute(store.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE ledger_events SET payload = ? WHERE id = ?")
        .bind(r#"{"serial_number":"SN-FORGED"}"#)
        .bind(created.id.0)
        .execute(store.pool())
        .await
        .unwrap();

    assert!(!store.verify_integrity(item.id).await.unwrap());

    let report = store.verify_chain().await.unwrap();
    assert!(!report.is_intact());
    assert!(matches!(
        report.problems[0],
        IntegrityProblem::HashMismatch { event, .. } if event == created.id
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_attachments_one_parent_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let component = held_item(&store, "SN-RACE-SCOPE").await;
    let mut parents = Vec::new();
    for i in 0..RACERS {
        parents.push(held_item(&store, &format!("SN-RACE-RIFLE-{i}")).await);
    }

    let barrier = Arc::new(Barrier::new(RACERS as usize));
    let mut handles = Vec::new();
    for parent in &parents {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        let request = NewAttachment::new(parent.id, component.id, HOLDER);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store.attach_component(request).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(attached) => winners.push(attached.parent_id),
            Err(CustodyError::AlreadyAttached { component: id, .. }) => {
                assert_eq!(id, component.id)
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let attached = store.attachment_of(component.id).await.unwrap().unwrap();
    assert_eq!(attached.parent_id, winners[0]);
    assert!(store.verify_chain().await.unwrap().is_intact());
}
