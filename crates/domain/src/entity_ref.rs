//! Entity reference — names one hub-side object on one connection.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::ServerId;

/// Identifies one hub-side entity or trigger on a given server connection.
///
/// Immutable once a node is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub server_id: ServerId,
    pub entity_id: String,
}

impl EntityRef {
    /// Build a reference after checking neither part is blank.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyServerId`] or
    /// [`ValidationError::EmptyEntityId`].
    pub fn new(
        server_id: impl Into<ServerId>,
        entity_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let server_id = server_id.into();
        let entity_id = entity_id.into();
        if server_id.is_empty() {
            return Err(ValidationError::EmptyServerId);
        }
        if entity_id.trim().is_empty() {
            return Err(ValidationError::EmptyEntityId);
        }
        Ok(Self {
            server_id,
            entity_id,
        })
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.server_id, self.entity_id)
    }
}
