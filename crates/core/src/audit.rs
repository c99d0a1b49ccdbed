//! Audit stamps recorded by workflow transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Who did something, when, and the free-text note they left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub by: UserId,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Stamp {
    pub fn new(by: UserId, at: DateTime<Utc>, notes: Option<String>) -> Self {
        Self {
            by,
            at,
            notes: normalize_notes(notes),
        }
    }
}

/// Blank notes are stored as `None`.
pub fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_notes_are_dropped() {
        let stamp = Stamp::new(UserId::new(), Utc::now(), Some("   ".to_string()));
        assert_eq!(stamp.notes, None);

        let stamp = Stamp::new(UserId::new(), Utc::now(), Some(" ok ".to_string()));
        assert_eq!(stamp.notes.as_deref(), Some("ok"));
    }
}
