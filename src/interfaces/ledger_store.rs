//! Ledger storage interface.

use async_trait::async_trait;

use crate::custody::{
    CustodyResult, EventId, IntegrityReport, LedgerEvent, NewLedgerEvent, PropertyId,
};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Unique constraint violated: {}", .constraint.as_deref().unwrap_or("unknown"))]
    UniqueViolation { constraint: Option<String> },

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid value in column {column}: {value}")]
    InvalidValue { column: &'static str, value: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Injected failure: {0}")]
    Injected(&'static str),

    #[error("Unsupported storage type: {0}")]
    Unsupported(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return Self::UniqueViolation {
                    constraint: db.constraint().map(str::to_string),
                };
            }
        }
        Self::Database(err)
    }
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// Name of the violated unique constraint, when the database reports it.
    pub fn violated_constraint(&self) -> Option<&str> {
        match self {
            Self::UniqueViolation { constraint } => constraint.as_deref(),
            _ => None,
        }
    }
}

/// Interface for the append-only custody ledger.
///
/// Events are ordered by id. Each event's `prev_hash` is the hash of the
/// event with the next-lower id, across all properties.
///
/// Implementations:
/// - `SqliteCustodyStore`: SQLite storage
/// - `PostgresCustodyStore`: PostgreSQL storage
/// - `MockCustodyStore`: in-memory storage for tests
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append an event in its own transaction.
    ///
    /// The event is visible only after commit. A failed commit returns
    /// `WriteError` and leaves the ledger unchanged.
    async fn append(&self, event: NewLedgerEvent) -> CustodyResult<LedgerEvent>;

    /// Fetch one event. `EventNotFound` if it does not exist.
    async fn event(&self, id: EventId) -> CustodyResult<LedgerEvent>;

    /// All events for a property, ascending by id.
    async fn history(&self, property: PropertyId) -> CustodyResult<Vec<LedgerEvent>>;

    /// Up to `limit` events for a property with id greater than `after`.
    ///
    /// Paging by id is stable: events are never removed and new events
    /// always sort after existing ones.
    async fn history_page(
        &self,
        property: PropertyId,
        after: Option<EventId>,
        limit: u32,
    ) -> CustodyResult<Vec<LedgerEvent>>;

    /// Most recent events across all properties, newest first.
    async fn recent_events(&self, limit: u32) -> CustodyResult<Vec<LedgerEvent>>;

    /// Recompute every event of a property and check its link to the
    /// globally preceding event.
    async fn verify_integrity(&self, property: PropertyId) -> CustodyResult<bool>;

    /// Walk the whole chain from genesis.
    async fn verify_chain(&self) -> CustodyResult<IntegrityReport>;
}
