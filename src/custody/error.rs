//! Custody error taxonomy.

use crate::storage::StorageError;

use super::transfer::TransferStatus;
use super::types::{ActorId, CorrectionId, CredentialId, EventId, PropertyId, TransferId};

/// Result type for custody operations.
pub type CustodyResult<T> = std::result::Result<T, CustodyError>;

/// Errors returned by custody operations.
///
/// Every variant except `WriteError` and `ReadError` is raised before anything
/// is written. `WriteError` means the enclosing transaction was rolled back;
/// `ReadError` comes from a read-only operation and changed nothing.
#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    #[error("Actor {actor} is not the current holder of property {property}")]
    NotHolder { property: PropertyId, actor: ActorId },

    #[error("Actor {actor} is not authorized to act on transfer {transfer}")]
    NotAuthorized { transfer: TransferId, actor: ActorId },

    #[error("Actor {actor} already holds property {property}")]
    SelfTransfer { property: PropertyId, actor: ActorId },

    #[error("Tampered credential: {reason}")]
    TamperedCredential { reason: String },

    #[error("Stale credential {credential}: issued to {embedded}, who no longer holds the property")]
    StaleCredential {
        credential: CredentialId,
        embedded: ActorId,
        current: Option<ActorId>,
    },

    #[error("Credential {0} is no longer active")]
    InactiveCredential(CredentialId),

    #[error("Property {0} already has a pending transfer")]
    DuplicatePending(PropertyId),

    #[error("Transfer {transfer} is already {status}")]
    AlreadyDecided {
        transfer: TransferId,
        status: TransferStatus,
    },

    #[error("Ledger event not found: {0}")]
    EventNotFound(EventId),

    #[error("Property not found: {0}")]
    PropertyNotFound(PropertyId),

    #[error("Transfer not found: {0}")]
    TransferNotFound(TransferId),

    #[error("Credential not found: {0}")]
    CredentialNotFound(CredentialId),

    #[error("Correction not found: {0}")]
    CorrectionNotFound(CorrectionId),

    #[error("Serial number already registered: {0}")]
    DuplicateSerial(String),

    #[error("Property {component} is already attached to {parent}")]
    AlreadyAttached {
        component: PropertyId,
        parent: PropertyId,
    },

    #[error("Position {position} on property {parent} is already occupied")]
    PositionOccupied { parent: PropertyId, position: String },

    #[error("Property {component} is not attached to {parent}")]
    NotAttached {
        component: PropertyId,
        parent: PropertyId,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Ledger write failed: {0}")]
    WriteError(#[source] StorageError),

    #[error("Custody store read failed: {0}")]
    ReadError(#[source] StorageError),
}

impl CustodyError {
    pub(crate) fn tampered(reason: impl Into<String>) -> Self {
        Self::TamperedCredential {
            reason: reason.into(),
        }
    }

    /// Classify the error for callers deciding how to respond.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotHolder { .. } | Self::NotAuthorized { .. } | Self::SelfTransfer { .. } => {
                ErrorKind::Authorization
            }
            Self::TamperedCredential { .. }
            | Self::StaleCredential { .. }
            | Self::InactiveCredential(_) => ErrorKind::Integrity,
            Self::DuplicatePending(_)
            | Self::AlreadyDecided { .. }
            | Self::DuplicateSerial(_)
            | Self::AlreadyAttached { .. }
            | Self::PositionOccupied { .. } => ErrorKind::Conflict,
            Self::EventNotFound(_)
            | Self::PropertyNotFound(_)
            | Self::TransferNotFound(_)
            | Self::CredentialNotFound(_)
            | Self::CorrectionNotFound(_)
            | Self::NotAttached { .. } => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::Validation,
            Self::WriteError(_) => ErrorKind::Durability,
            Self::ReadError(_) => ErrorKind::Unavailable,
        }
    }

    /// Reclassify a storage failure raised on a read-only path.
    pub(crate) fn on_read(self) -> Self {
        match self {
            Self::WriteError(err) => Self::ReadError(err),
            other => other,
        }
    }

    /// Whether the caller may retry the same request later.
    ///
    /// Conflicts can clear once the competing transfer resolves. Durability
    /// and availability failures can clear once the store recovers. Nothing
    /// is retried here.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Conflict | ErrorKind::Durability | ErrorKind::Unavailable
        )
    }
}

impl From<StorageError> for CustodyError {
    fn from(err: StorageError) -> Self {
        Self::WriteError(err)
    }
}

impl From<sqlx::Error> for CustodyError {
    fn from(err: sqlx::Error) -> Self {
        Self::WriteError(StorageError::from(err))
    }
}

impl From<serde_json::Error> for CustodyError {
    fn from(err: serde_json::Error) -> Self {
        Self::WriteError(StorageError::from(err))
    }
}

/// Coarse error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Actor may not perform the operation.
    Authorization,
    /// Presented credential is forged, outdated or deactivated.
    Integrity,
    /// Competing state exists; expected under concurrency.
    Conflict,
    NotFound,
    Validation,
    /// The store failed to commit.
    Durability,
    /// The store could not be read.
    Unavailable,
}
