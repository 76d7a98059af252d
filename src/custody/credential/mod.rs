//! QR credentials.
//!
//! A credential binds a property to its holder at issue time. The integrity
//! hash is SHA-256 over a canonical rendering of the payload, so changing any
//! embedded field invalidates it. The scannable form is a [`CredentialToken`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{CustodyError, CustodyResult};
use super::types::{format_timestamp, ActorId, CredentialId, Property, PropertyId};

/// Deactivation reason when a newer credential replaces this one.
pub const REASON_REISSUED: &str = "reissued";
/// Deactivation reason when the transfer made with this credential resolves.
pub const REASON_TRANSFER_APPROVED: &str = "transfer_approved";
pub const REASON_TRANSFER_REJECTED: &str = "transfer_rejected";
pub const REASON_TRANSFER_CANCELLED: &str = "transfer_cancelled";

/// Fields embedded in a QR credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub property_id: PropertyId,
    pub serial_number: String,
    pub holder_id: ActorId,
    pub issued_at: DateTime<Utc>,
}

impl CredentialPayload {
    /// Canonical rendering used as hash input.
    ///
    /// The serial number is length-prefixed so no choice of serial can shift
    /// the boundary with the holder field.
    pub fn canonical(&self) -> String {
        format!(
            "{}|{}:{}|{}|{}",
            self.property_id,
            self.serial_number.len(),
            self.serial_number,
            self.holder_id,
            format_timestamp(&self.issued_at)
        )
    }

    /// Hex SHA-256 of the canonical rendering.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.canonical().as_bytes()))
    }
}

/// An issued credential as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub property_id: PropertyId,
    pub payload: CredentialPayload,
    pub hash: String,
    pub issued_by: ActorId,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub deactivation_reason: Option<String>,
}

impl Credential {
    /// Issue a credential for `property` on behalf of `requester`.
    ///
    /// Fails with `NotHolder` unless the requester currently holds the item.
    pub fn issue(
        property: &Property,
        requester: ActorId,
        at: DateTime<Utc>,
    ) -> CustodyResult<Self> {
        property.ensure_held_by(requester)?;

        let payload = CredentialPayload {
            property_id: property.id,
            serial_number: property.serial_number.clone(),
            holder_id: requester,
            issued_at: at,
        };
        let hash = payload.digest();

        Ok(Self {
            id: CredentialId::generate(),
            property_id: property.id,
            payload,
            hash,
            issued_by: requester,
            active: true,
            created_at: at,
            deactivated_at: None,
            deactivation_reason: None,
        })
    }

    /// Scannable representation of this credential.
    pub fn token(&self) -> CredentialToken {
        CredentialToken {
            credential_id: self.id,
            payload: self.payload.clone(),
            hash: self.hash.clone(),
        }
    }

    /// Mark inactive. Returns `InactiveCredential` if already inactive.
    pub fn deactivate(&mut self, reason: &str, at: DateTime<Utc>) -> CustodyResult<()> {
        if !self.active {
            return Err(CustodyError::InactiveCredential(self.id));
        }
        self.active = false;
        self.deactivated_at = Some(at);
        self.deactivation_reason = Some(reason.to_string());
        Ok(())
    }
}

/// What a scanner presents: the credential id, the embedded payload and the
/// integrity hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialToken {
    pub credential_id: CredentialId,
    pub payload: CredentialPayload,
    pub hash: String,
}

impl CredentialToken {
    /// Render as URL-safe base64 of the JSON form, suitable for a QR code.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Parse scanned text. Anything that does not decode is treated as tampered.
    pub fn decode(text: &str) -> CustodyResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text.trim())
            .map_err(|e| CustodyError::tampered(format!("undecodable token: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CustodyError::tampered(format!("malformed token: {}", e)))
    }

    /// Whether the presented hash matches the presented payload.
    pub fn digest_matches(&self) -> bool {
        self.payload.digest() == self.hash
    }
}

/// Check a presented token against stored state, returning the matching
/// records.
///
/// Checks run in a fixed order: payload digest, stored record, current holder,
/// active flag. The first failure wins.
pub fn verify_presented<'a>(
    token: &CredentialToken,
    stored: Option<&'a Credential>,
    property: Option<&'a Property>,
) -> CustodyResult<(&'a Credential, &'a Property)> {
    if !token.digest_matches() {
        return Err(CustodyError::tampered("payload digest mismatch"));
    }

    let stored = stored.ok_or_else(|| CustodyError::tampered("unknown credential"))?;
    if stored.hash != token.hash || stored.payload != token.payload {
        return Err(CustodyError::tampered("credential does not match issued record"));
    }

    let property = property.ok_or_else(|| CustodyError::tampered("unknown property"))?;
    if !property.is_held_by(token.payload.holder_id) {
        return Err(CustodyError::StaleCredential {
            credential: stored.id,
            embedded: token.payload.holder_id,
            current: property.holder_id,
        });
    }

    if !stored.active {
        return Err(CustodyError::InactiveCredential(stored.id));
    }

    Ok((stored, property))
}
