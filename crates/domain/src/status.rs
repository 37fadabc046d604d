//! Node status — the last outcome shown next to a node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Colour of the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Idle,
    Success,
    Failed,
}

/// Last status written for a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub kind: StatusKind,
    pub label: String,
    pub at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// A status written now.
    #[must_use]
    pub fn now(kind: StatusKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            at: Utc::now(),
        }
    }

    /// Text shown under the node, e.g. `input at: Oct 18, 09:41`.
    #[must_use]
    pub fn text(&self) -> String {
        format!("{} at: {}", self.label, self.at.format("%b %-d, %H:%M"))
    }
}
