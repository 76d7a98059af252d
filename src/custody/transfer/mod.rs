//! Transfer state machine.
//!
//! A transfer starts `Pending` and moves exactly once to a terminal state.
//! The transitions here are pure; the store runs them inside the transaction
//! that persists their effects.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::credential::Credential;
use super::error::{CustodyError, CustodyResult};
use super::types::{ActorId, CredentialId, PropertyId, TransferId};

/// Lifecycle state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(other.to_string()),
        }
    }
}

/// The current holder's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Terminal status reached by this decision.
    pub fn status(&self) -> TransferStatus {
        match self {
            Self::Approve => TransferStatus::Approved,
            Self::Reject => TransferStatus::Rejected,
        }
    }
}

/// A request to move custody of one item from its holder to a scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub property_id: PropertyId,
    pub from_holder: ActorId,
    pub to_holder: ActorId,
    pub status: TransferStatus,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<ActorId>,
    pub credential_id: CredentialId,
    pub note: Option<String>,
}

impl Transfer {
    /// Open a pending transfer from a verified credential.
    ///
    /// The from-holder is the holder embedded in the credential, which the
    /// caller has already checked against the property's current holder.
    pub fn request(
        credential: &Credential,
        scanner: ActorId,
        at: DateTime<Utc>,
    ) -> CustodyResult<Self> {
        let holder = credential.payload.holder_id;
        if scanner == holder {
            return Err(CustodyError::SelfTransfer {
                property: credential.property_id,
                actor: scanner,
            });
        }

        Ok(Self {
            id: TransferId::generate(),
            property_id: credential.property_id,
            from_holder: holder,
            to_holder: scanner,
            status: TransferStatus::Pending,
            requested_at: at,
            decided_at: None,
            decided_by: None,
            credential_id: credential.id,
            note: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransferStatus::Pending
    }

    /// Whether `actor` is either party to this transfer.
    pub fn involves(&self, actor: ActorId) -> bool {
        self.from_holder == actor || self.to_holder == actor
    }

    /// Approve or reject. Only the from-holder may decide.
    pub fn decide(
        &mut self,
        decider: ActorId,
        decision: Decision,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> CustodyResult<()> {
        if decider != self.from_holder {
            return Err(CustodyError::NotAuthorized {
                transfer: self.id,
                actor: decider,
            });
        }
        self.close(decision.status(), decider, note, at)
    }

    /// Withdraw a pending transfer. Either party may cancel.
    pub fn cancel(
        &mut self,
        requester: ActorId,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> CustodyResult<()> {
        if !self.involves(requester) {
            return Err(CustodyError::NotAuthorized {
                transfer: self.id,
                actor: requester,
            });
        }
        self.close(TransferStatus::Cancelled, requester, note, at)
    }

    fn close(
        &mut self,
        status: TransferStatus,
        actor: ActorId,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> CustodyResult<()> {
        if self.status.is_terminal() {
            return Err(CustodyError::AlreadyDecided {
                transfer: self.id,
                status: self.status,
            });
        }
        self.status = status;
        self.decided_at = Some(at);
        self.decided_by = Some(actor);
        if note.is_some() {
            self.note = note;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
