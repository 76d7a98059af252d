//! Component attachments.
//!
//! A component (scope, rail, mount) can be attached to one parent item at a
//! time. Nesting is one level deep: a parent may not itself be attached, and
//! an item carrying components may not be attached to another. Attaching
//! and detaching never change who holds either item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{CustodyError, CustodyResult};
use super::types::{ActorId, PropertyId};

/// Request to attach `component_id` to `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub parent_id: PropertyId,
    pub component_id: PropertyId,
    pub attached_by: ActorId,
    pub position: Option<String>,
    pub notes: Option<String>,
}

impl NewAttachment {
    pub fn new(parent_id: PropertyId, component_id: PropertyId, attached_by: ActorId) -> Self {
        Self {
            parent_id,
            component_id,
            attached_by,
            position: None,
            notes: None,
        }
    }

    pub fn at_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Check the request and build the attachment it describes.
    ///
    /// Blank positions and notes are dropped; surrounding whitespace is
    /// trimmed.
    pub fn into_attachment(self, at: DateTime<Utc>) -> CustodyResult<ComponentAttachment> {
        if self.parent_id == self.component_id {
            return Err(CustodyError::InvalidInput(
                "cannot attach property to itself".to_string(),
            ));
        }
        Ok(ComponentAttachment {
            parent_id: self.parent_id,
            component_id: self.component_id,
            position: non_blank(self.position),
            notes: non_blank(self.notes),
            attached_by: self.attached_by,
            attached_at: at,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A live attachment between two items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAttachment {
    pub parent_id: PropertyId,
    pub component_id: PropertyId,
    pub position: Option<String>,
    pub notes: Option<String>,
    pub attached_by: ActorId,
    pub attached_at: DateTime<Utc>,
}

/// Order two distinct ids so every writer locks them the same way.
pub(crate) fn lock_order(a: PropertyId, b: PropertyId) -> [PropertyId; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}
