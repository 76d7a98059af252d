use super::*;
use crate::custody::credential::Credential;
use crate::custody::types::{now, NewProperty, Property};

const HOLDER: ActorId = ActorId(1);
const SCANNER: ActorId = ActorId(2);
const BYSTANDER: ActorId = ActorId(3);

fn pending() -> Transfer {
    let property =
        Property::register(NewProperty::new("P123", "Radio").held_by(HOLDER), now()).unwrap();
    let credential = Credential::issue(&property, HOLDER, now()).unwrap();
    Transfer::request(&credential, SCANNER, now()).unwrap()
}

#[test]
fn test_request_takes_holder_from_credential() {
    let transfer = pending();

    assert_eq!(transfer.from_holder, HOLDER);
    assert_eq!(transfer.to_holder, SCANNER);
    assert!(transfer.is_pending());
    assert!(transfer.decided_at.is_none());
}

#[test]
fn test_request_by_holder_is_self_transfer() {
    let property =
        Property::register(NewProperty::new("P1", "Radio").held_by(HOLDER), now()).unwrap();
    let credential = Credential::issue(&property, HOLDER, now()).unwrap();

    let result = Transfer::request(&credential, HOLDER, now());

    assert!(matches!(result, Err(CustodyError::SelfTransfer { .. })));
}

#[test]
fn test_holder_approves() {
    let mut transfer = pending();

    transfer
        .decide(HOLDER, Decision::Approve, Some("ok".into()), now())
        .unwrap();

    assert_eq!(transfer.status, TransferStatus::Approved);
    assert_eq!(transfer.decided_by, Some(HOLDER));
    assert_eq!(transfer.note.as_deref(), Some("ok"));
}

#[test]
fn test_scanner_cannot_decide() {
    let mut transfer = pending();

    let result = transfer.decide(SCANNER, Decision::Approve, None, now());

    assert!(matches!(result, Err(CustodyError::NotAuthorized { .. })));
    assert!(transfer.is_pending());
}

#[test]
fn test_second_decision_is_already_decided() {
    let mut transfer = pending();
    transfer.decide(HOLDER, Decision::Reject, None, now()).unwrap();

    let result = transfer.decide(HOLDER, Decision::Approve, None, now());

    match result {
        Err(CustodyError::AlreadyDecided { status, .. }) => {
            assert_eq!(status, TransferStatus::Rejected)
        }
        other => panic!("expected AlreadyDecided, got {:?}", other),
    }
}

#[test]
fn test_either_party_may_cancel() {
    let mut by_holder = pending();
    by_holder.cancel(HOLDER, None, now()).unwrap();
    assert_eq!(by_holder.status, TransferStatus::Cancelled);

    let mut by_scanner = pending();
    by_scanner
        .cancel(SCANNER, Some("changed my mind".into()), now())
        .unwrap();
    assert_eq!(by_scanner.decided_by, Some(SCANNER));
}

#[test]
fn test_bystander_cannot_cancel() {
    let mut transfer = pending();

    let result = transfer.cancel(BYSTANDER, None, now());

    assert!(matches!(result, Err(CustodyError::NotAuthorized { .. })));
}

#[test]
fn test_cancel_after_approval_is_already_decided() {
    let mut transfer = pending();
    transfer.decide(HOLDER, Decision::Approve, None, now()).unwrap();

    let result = transfer.cancel(SCANNER, None, now());

    assert!(matches!(result, Err(CustodyError::AlreadyDecided { .. })));
}

#[test]
fn test_status_strings() {
    assert_eq!("cancelled".parse::<TransferStatus>(), Ok(TransferStatus::Cancelled));
    assert!("done".parse::<TransferStatus>().is_err());
    assert!(!TransferStatus::Pending.is_terminal());
    assert!(TransferStatus::Approved.is_terminal());
}
