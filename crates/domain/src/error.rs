//! Common error types used across the workspace.
//!
//! Each concern gets its own typed error and converts into [`FlowError`]
//! through `#[from]`, so callers can match on the category they care about.

use crate::event::EventKind;

/// Top-level error for the flow toolkit.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// A hub command was attempted while the connection was closed.
    #[error("hub transport unavailable")]
    TransportUnavailable(#[from] TransportUnavailable),

    /// The hub answered a command with an error.
    #[error("hub rejected command")]
    CommandRejected(#[from] CommandRejected),

    /// An inbound hub payload did not match the shape of its kind.
    #[error("malformed hub event")]
    MalformedEvent(#[from] MalformedEventError),

    /// Configuration or construction-time invariant violated.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A referenced object does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),
}

/// Raised when a command is sent over a closed connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connection to server {server_id} is not open")]
pub struct TransportUnavailable {
    pub server_id: String,
}

/// Error reply returned by the hub for a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("hub rejected command ({code}): {message}")]
pub struct CommandRejected {
    pub code: String,
    pub message: String,
}

/// Why an inbound hub payload could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEventError {
    #[error("{kind} event is missing field `{field}`")]
    MissingField {
        kind: EventKind,
        field: &'static str,
    },

    #[error("{kind} event has an invalid `{field}` field")]
    InvalidField {
        kind: EventKind,
        field: &'static str,
    },

    #[error("{kind} event addressed to {actual} delivered to {expected}")]
    EntityMismatch {
        kind: EventKind,
        expected: String,
        actual: String,
    },
}

/// Construction-time invariant violations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("server id must not be empty")]
    EmptyServerId,

    #[error("node id must not be empty")]
    EmptyNodeId,

    #[error("entity id must not be empty")]
    EmptyEntityId,

    #[error("sentence node requires at least one sentence")]
    EmptySentences,

    #[error("zone node requires at least one tracked entity and one zone")]
    EmptyZoneSelection,

    #[error("zone radius must be positive, got {0}")]
    InvalidRadius(f64),

    #[error("duplicate node id {0}")]
    DuplicateNodeId(String),
}

/// Failure of a single hub command, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    TransportUnavailable(#[from] TransportUnavailable),

    #[error(transparent)]
    Rejected(#[from] CommandRejected),
}

impl From<CommandError> for FlowError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::TransportUnavailable(inner) => Self::TransportUnavailable(inner),
            CommandError::Rejected(inner) => Self::CommandRejected(inner),
        }
    }
}

/// Raised when looking up something that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

impl FlowError {
    /// Whether the error is caused by a hub-side rejection.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CommandRejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_rejection_into_flow_error() {
        let err: FlowError = CommandRejected {
            code: "not_found".to_string(),
            message: "unknown node".to_string(),
        }
        .into();
        assert!(err.is_rejection());
    }

    #[test]
    fn should_not_report_transport_error_as_rejection() {
        let err: FlowError = TransportUnavailable {
            server_id: "home".to_string(),
        }
        .into();
        assert!(!err.is_rejection());
    }

    #[test]
    fn should_flatten_command_error_into_flow_error() {
        let err: FlowError = CommandError::Rejected(CommandRejected {
            code: "x".to_string(),
            message: "y".to_string(),
        })
        .into();
        assert!(matches!(err, FlowError::CommandRejected(_)));
    }

    #[test]
    fn should_display_missing_field_with_kind() {
        let err = MalformedEventError::MissingField {
            kind: EventKind::StateChanged,
            field: "entity_id",
        };
        assert_eq!(
            err.to_string(),
            "state_changed event is missing field `entity_id`"
        );
    }

    #[test]
    fn should_display_rejection_details() {
        let err = CommandRejected {
            code: "invalid_format".to_string(),
            message: "bad state".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "hub rejected command (invalid_format): bad state"
        );
    }

    #[test]
    fn should_display_not_found_error() {
        let err = NotFoundError {
            entity: "EntityConfig",
            id: "cfg1".to_string(),
        };
        assert_eq!(err.to_string(), "EntityConfig cfg1 not found");
    }
}
