//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building,
//! plus the DDL for each SQL backend.

use sea_query::Iden;

/// Properties table schema.
#[derive(Iden)]
pub enum Properties {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "serial_number"]
    SerialNumber,
    #[iden = "name"]
    Name,
    #[iden = "status"]
    Status,
    #[iden = "holder_id"]
    HolderId,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// QR credentials table schema.
#[derive(Iden)]
pub enum Credentials {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "property_id"]
    PropertyId,
    #[iden = "serial_number"]
    SerialNumber,
    #[iden = "holder_id"]
    HolderId,
    #[iden = "issued_at"]
    IssuedAt,
    #[iden = "hash"]
    Hash,
    #[iden = "issued_by"]
    IssuedBy,
    #[iden = "active"]
    Active,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "deactivated_at"]
    DeactivatedAt,
    #[iden = "deactivation_reason"]
    DeactivationReason,
}

/// Transfers table schema.
#[derive(Iden)]
pub enum Transfers {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "property_id"]
    PropertyId,
    #[iden = "from_holder"]
    FromHolder,
    #[iden = "to_holder"]
    ToHolder,
    #[iden = "status"]
    Status,
    #[iden = "requested_at"]
    RequestedAt,
    #[iden = "decided_at"]
    DecidedAt,
    #[iden = "decided_by"]
    DecidedBy,
    #[iden = "credential_id"]
    CredentialId,
    #[iden = "note"]
    Note,
}

/// Ledger events table schema.
#[derive(Iden)]
pub enum LedgerEvents {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "event_type"]
    EventType,
    #[iden = "property_id"]
    PropertyId,
    #[iden = "transfer_id"]
    TransferId,
    #[iden = "actor_id"]
    ActorId,
    #[iden = "payload"]
    Payload,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "prev_hash"]
    PrevHash,
    #[iden = "hash"]
    Hash,
}

/// Corrections table schema.
#[derive(Iden)]
pub enum Corrections {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "original_event_id"]
    OriginalEventId,
    #[iden = "ledger_event_id"]
    LedgerEventId,
    #[iden = "reason"]
    Reason,
    #[iden = "corrected_payload"]
    CorrectedPayload,
    #[iden = "corrected_by"]
    CorrectedBy,
    #[iden = "created_at"]
    CreatedAt,
}

/// Verifications table schema.
#[derive(Iden)]
pub enum Verifications {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "property_id"]
    PropertyId,
    #[iden = "verifier_id"]
    VerifierId,
    #[iden = "result"]
    Result,
    #[iden = "notes"]
    Notes,
    #[iden = "ledger_event_id"]
    LedgerEventId,
    #[iden = "created_at"]
    CreatedAt,
}

/// Component attachments table schema.
#[derive(Iden)]
pub enum PropertyComponents {
    Table,
    #[iden = "component_id"]
    ComponentId,
    #[iden = "parent_id"]
    ParentId,
    #[iden = "position"]
    Position,
    #[iden = "notes"]
    Notes,
    #[iden = "attached_by"]
    AttachedBy,
    #[iden = "attached_at"]
    AttachedAt,
}

/// Name of the index keeping one component per parent position.
pub const COMPONENT_POSITION_INDEX: &str = "uq_components_position";

/// SQLite DDL.
///
/// `prev_hash` is unique, so two appenders can never link to the same
/// predecessor and fork the chain.
pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS properties (
    id TEXT PRIMARY KEY,
    serial_number TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    holder_id INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS credentials (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    serial_number TEXT NOT NULL,
    holder_id INTEGER NOT NULL,
    issued_at TEXT NOT NULL,
    hash TEXT NOT NULL,
    issued_by INTEGER NOT NULL,
    active BOOLEAN NOT NULL,
    created_at TEXT NOT NULL,
    deactivated_at TEXT,
    deactivation_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_credentials_property ON credentials(property_id);
CREATE UNIQUE INDEX IF NOT EXISTS uq_credentials_one_active
    ON credentials(property_id) WHERE active;

CREATE TABLE IF NOT EXISTS transfers (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    from_holder INTEGER NOT NULL,
    to_holder INTEGER NOT NULL,
    status TEXT NOT NULL,
    requested_at TEXT NOT NULL,
    decided_at TEXT,
    decided_by INTEGER,
    credential_id TEXT NOT NULL REFERENCES credentials(id),
    note TEXT
);

CREATE INDEX IF NOT EXISTS idx_transfers_property ON transfers(property_id);
CREATE UNIQUE INDEX IF NOT EXISTS uq_transfers_one_pending
    ON transfers(property_id) WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS ledger_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    property_id TEXT NOT NULL REFERENCES properties(id),
    transfer_id TEXT REFERENCES transfers(id),
    actor_id INTEGER NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    prev_hash TEXT NOT NULL UNIQUE,
    hash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_events_property ON ledger_events(property_id, id);

CREATE TRIGGER IF NOT EXISTS ledger_events_no_update
BEFORE UPDATE ON ledger_events
BEGIN
    SELECT RAISE(ABORT, 'ledger_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS ledger_events_no_delete
BEFORE DELETE ON ledger_events
BEGIN
    SELECT RAISE(ABORT, 'ledger_events is append-only');
END;

CREATE TABLE IF NOT EXISTS corrections (
    id TEXT PRIMARY KEY,
    original_event_id INTEGER NOT NULL REFERENCES ledger_events(id),
    ledger_event_id INTEGER NOT NULL REFERENCES ledger_events(id),
    reason TEXT NOT NULL,
    corrected_payload TEXT NOT NULL,
    corrected_by INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_corrections_original ON corrections(original_event_id);

CREATE TRIGGER IF NOT EXISTS corrections_no_update
BEFORE UPDATE ON corrections
BEGIN
    SELECT RAISE(ABORT, 'corrections is append-only');
END;

CREATE TRIGGER IF NOT EXISTS corrections_no_delete
BEFORE DELETE ON corrections
BEGIN
    SELECT RAISE(ABORT, 'corrections is append-only');
END;

CREATE TABLE IF NOT EXISTS verifications (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    verifier_id INTEGER NOT NULL,
    result TEXT NOT NULL,
    notes TEXT,
    ledger_event_id INTEGER NOT NULL REFERENCES ledger_events(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_verifications_property ON verifications(property_id);

CREATE TABLE IF NOT EXISTS property_components (
    component_id TEXT PRIMARY KEY REFERENCES properties(id),
    parent_id TEXT NOT NULL REFERENCES properties(id),
    position TEXT,
    notes TEXT,
    attached_by INTEGER NOT NULL,
    attached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_property_components_parent ON property_components(parent_id);
CREATE UNIQUE INDEX IF NOT EXISTS uq_components_position
    ON property_components(parent_id, position) WHERE position IS NOT NULL;
"#;

/// PostgreSQL DDL.
pub const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS properties (
    id TEXT PRIMARY KEY,
    serial_number TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    holder_id BIGINT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS credentials (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    serial_number TEXT NOT NULL,
    holder_id BIGINT NOT NULL,
    issued_at TEXT NOT NULL,
    hash TEXT NOT NULL,
    issued_by BIGINT NOT NULL,
    active BOOLEAN NOT NULL,
    created_at TEXT NOT NULL,
    deactivated_at TEXT,
    deactivation_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_credentials_property ON credentials(property_id);
CREATE UNIQUE INDEX IF NOT EXISTS uq_credentials_one_active
    ON credentials(property_id) WHERE active;

CREATE TABLE IF NOT EXISTS transfers (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    from_holder BIGINT NOT NULL,
    to_holder BIGINT NOT NULL,
    status TEXT NOT NULL,
    requested_at TEXT NOT NULL,
    decided_at TEXT,
    decided_by BIGINT,
    credential_id TEXT NOT NULL REFERENCES credentials(id),
    note TEXT
);

CREATE INDEX IF NOT EXISTS idx_transfers_property ON transfers(property_id);
CREATE UNIQUE INDEX IF NOT EXISTS uq_transfers_one_pending
    ON transfers(property_id) WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS ledger_events (
    id BIGSERIAL PRIMARY KEY,
    event_type TEXT NOT NULL,
    property_id TEXT NOT NULL REFERENCES properties(id),
    transfer_id TEXT REFERENCES transfers(id),
    actor_id BIGINT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    prev_hash TEXT NOT NULL UNIQUE,
    hash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_events_property ON ledger_events(property_id, id);

CREATE TABLE IF NOT EXISTS corrections (
    id TEXT PRIMARY KEY,
    original_event_id BIGINT NOT NULL REFERENCES ledger_events(id),
    ledger_event_id BIGINT NOT NULL REFERENCES ledger_events(id),
    reason TEXT NOT NULL,
    corrected_payload TEXT NOT NULL,
    corrected_by BIGINT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_corrections_original ON corrections(original_event_id);

CREATE TABLE IF NOT EXISTS verifications (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    verifier_id BIGINT NOT NULL,
    result TEXT NOT NULL,
    notes TEXT,
    ledger_event_id BIGINT NOT NULL REFERENCES ledger_events(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_verifications_property ON verifications(property_id);

CREATE TABLE IF NOT EXISTS property_components (
    component_id TEXT PRIMARY KEY REFERENCES properties(id),
    parent_id TEXT NOT NULL REFERENCES properties(id),
    position TEXT,
    notes TEXT,
    attached_by BIGINT NOT NULL,
    attached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_property_components_parent ON property_components(parent_id);
CREATE UNIQUE INDEX IF NOT EXISTS uq_components_position
    ON property_components(parent_id, position) WHERE position IS NOT NULL;

CREATE OR REPLACE FUNCTION reject_audit_mutation() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION '% is append-only', TG_TABLE_NAME;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS ledger_events_append_only ON ledger_events;
CREATE TRIGGER ledger_events_append_only
    BEFORE UPDATE OR DELETE ON ledger_events
    FOR EACH ROW EXECUTE FUNCTION reject_audit_mutation();

DROP TRIGGER IF EXISTS corrections_append_only ON corrections;
CREATE TRIGGER corrections_append_only
    BEFORE UPDATE OR DELETE ON corrections
    FOR EACH ROW EXECUTE FUNCTION reject_audit_mutation();
"#;

/// Advisory lock key serializing ledger appends on PostgreSQL.
pub const LEDGER_LOCK_KEY: i64 = 0x6c65_6467_6572;
