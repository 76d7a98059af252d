//! Identifiers, timestamps and the property entity.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CustodyError, CustodyResult};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identifier of an accountable property item.
    PropertyId
);
uuid_id!(
    /// Identifier of an issued QR credential.
    CredentialId
);
uuid_id!(
    /// Identifier of a custody transfer.
    TransferId
);
uuid_id!(
    /// Identifier of a correction record.
    CorrectionId
);
uuid_id!(
    /// Identifier of a physical verification record.
    VerificationId
);

/// Authenticated user id supplied by the session layer.
///
/// The custody core trusts this value; authentication happens upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub i64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger event id, assigned by the store in strictly increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current time truncated to microseconds.
///
/// Stored timestamps carry microsecond precision, so values produced here
/// compare equal after a round trip through any backend.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render a timestamp in the fixed RFC 3339 form used for storage and hashing.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`format_timestamp`].
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Operational status of a property item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Operational,
    NonOperational,
    Maintenance,
    Damaged,
    Missing,
}

impl PropertyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operational => "operational",
            Self::NonOperational => "non_operational",
            Self::Maintenance => "maintenance",
            Self::Damaged => "damaged",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operational" => Ok(Self::Operational),
            "non_operational" => Ok(Self::NonOperational),
            "maintenance" => Ok(Self::Maintenance),
            "damaged" => Ok(Self::Damaged),
            "missing" => Ok(Self::Missing),
            other => Err(other.to_string()),
        }
    }
}

/// An accountable property item.
///
/// `holder_id` is the single source of truth for current custody. It only
/// changes inside the transaction that approves a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub serial_number: String,
    pub name: String,
    pub status: PropertyStatus,
    pub holder_id: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    /// Build a new property from an intake request.
    pub fn register(new: NewProperty, at: DateTime<Utc>) -> CustodyResult<Self> {
        new.validate()?;
        Ok(Self {
            id: PropertyId::generate(),
            serial_number: new.serial_number.trim().to_string(),
            name: new.name.trim().to_string(),
            status: new.status,
            holder_id: new.holder_id,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn is_held_by(&self, actor: ActorId) -> bool {
        self.holder_id == Some(actor)
    }

    /// Fail with `NotHolder` unless `actor` currently holds this item.
    pub fn ensure_held_by(&self, actor: ActorId) -> CustodyResult<()> {
        if self.is_held_by(actor) {
            Ok(())
        } else {
            Err(CustodyError::NotHolder {
                property: self.id,
                actor,
            })
        }
    }
}

/// Intake request for a new property item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProperty {
    pub serial_number: String,
    pub name: String,
    pub status: PropertyStatus,
    pub holder_id: Option<ActorId>,
}

impl NewProperty {
    pub fn new(serial_number: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            name: name.into(),
            status: PropertyStatus::Operational,
            holder_id: None,
        }
    }

    pub fn held_by(mut self, holder: ActorId) -> Self {
        self.holder_id = Some(holder);
        self
    }

    pub fn with_status(mut self, status: PropertyStatus) -> Self {
        self.status = status;
        self
    }

    fn validate(&self) -> CustodyResult<()> {
        if self.serial_number.trim().is_empty() {
            return Err(CustodyError::InvalidInput(
                "serial number must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
