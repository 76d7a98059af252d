//! Custody domain: properties, QR credentials, transfers and the audit ledger.

pub mod audit;
pub mod component;
pub mod credential;
pub mod error;
pub mod ledger;
pub mod transfer;
pub mod types;

pub use audit::{
    CorrectionEvent, MaintenanceStage, NewCorrection, NewMaintenance, NewVerification,
    VerificationEvent, VerificationResult, VerificationState, VerificationStatus,
};
pub use component::{ComponentAttachment, NewAttachment};
pub use credential::{verify_presented, Credential, CredentialPayload, CredentialToken};
pub use error::{CustodyError, CustodyResult, ErrorKind};
pub use ledger::{
    ChainVerifier, IntegrityProblem, IntegrityReport, LedgerEvent, LedgerEventType,
    NewLedgerEvent, SealedEvent, GENESIS_HASH,
};
pub use transfer::{Decision, Transfer, TransferStatus};
pub use types::{
    ActorId, CorrectionId, CredentialId, EventId, NewProperty, Property, PropertyId,
    PropertyStatus, TransferId, VerificationId,
};
