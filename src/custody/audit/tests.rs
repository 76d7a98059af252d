use serde_json::json;

use super::*;
use crate::custody::types::now;

fn verification(result: VerificationResult, at: DateTime<Utc>) -> VerificationEvent {
    VerificationEvent {
        id: VerificationId::generate(),
        property_id: PropertyId::generate(),
        verifier_id: ActorId(5),
        result,
        notes: None,
        ledger_event_id: EventId(1),
        created_at: at,
    }
}

#[test]
fn test_blank_correction_reason_rejected() {
    let correction = NewCorrection::new(EventId(1), "  ", json!({}), ActorId(1));

    assert!(matches!(
        correction.validate(),
        Err(CustodyError::InvalidInput(_))
    ));
}

#[test]
fn test_correction_with_reason_is_valid() {
    let correction = NewCorrection::new(
        EventId(1),
        "serial transcribed wrong",
        json!({ "serial_number": "W-4471" }),
        ActorId(1),
    );

    assert!(correction.validate().is_ok());
}

#[test]
fn test_status_never_verified() {
    let property = PropertyId::generate();

    let status = VerificationStatus::derive(property, None, now(), Duration::days(30));

    assert_eq!(status.state, VerificationState::NeverVerified);
    assert!(status.due_at.is_none());
    assert!(status.needs_attention());
}

#[test]
fn test_status_current_within_interval() {
    let at = now();
    let latest = verification(VerificationResult::Confirmed, at);

    let status = VerificationStatus::derive(
        latest.property_id,
        Some(&latest),
        at + Duration::days(29),
        Duration::days(30),
    );

    assert_eq!(status.state, VerificationState::Current);
    assert_eq!(status.due_at, Some(at + Duration::days(30)));
    assert_eq!(status.last_verifier, Some(ActorId(5)));
    assert!(!status.needs_attention());
}

#[test]
fn test_status_overdue_at_due_time() {
    let at = now();
    let latest = verification(VerificationResult::Confirmed, at);

    let status = VerificationStatus::derive(
        latest.property_id,
        Some(&latest),
        at + Duration::days(30),
        Duration::days(30),
    );

    assert_eq!(status.state, VerificationState::Overdue);
}

#[test]
fn test_discrepant_needs_attention_while_current() {
    let at = now();
    let latest = verification(VerificationResult::Discrepant, at);

    let status =
        VerificationStatus::derive(latest.property_id, Some(&latest), at, Duration::days(30));

    assert_eq!(status.state, VerificationState::Current);
    assert!(status.needs_attention());
}

#[test]
fn test_maintenance_needs_record_and_description() {
    let item = PropertyId::generate();
    let blank_record = NewMaintenance::new(item, " ", ActorId(3), MaintenanceStage::Started, "Bore scope");
    assert!(matches!(blank_record.validate(), Err(CustodyError::InvalidInput(_))));

    let blank_description = NewMaintenance::new(item, "MR-7", ActorId(3), MaintenanceStage::Started, "");
    assert!(matches!(blank_description.validate(), Err(CustodyError::InvalidInput(_))));

    let ok = NewMaintenance::new(item, "MR-7", ActorId(3), MaintenanceStage::Completed, "Replaced firing pin")
        .performed_by(ActorId(4))
        .of_type("corrective");
    assert!(ok.validate().is_ok());
    assert_eq!(ok.performed_by, Some(ActorId(4)));
}

#[test]
fn test_maintenance_stage_names_parse_back() {
    for stage in [
        MaintenanceStage::Requested,
        MaintenanceStage::Started,
        MaintenanceStage::Completed,
        MaintenanceStage::Cancelled,
    ] {
        assert_eq!(stage.as_str().parse::<MaintenanceStage>(), Ok(stage));
    }
    assert!("scrapped".parse::<MaintenanceStage>().is_err());
}
