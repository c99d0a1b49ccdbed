use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use fleetops_core::Actor;
use fleetops_core::SiteId;

/// Answer for a single line when the destination site responds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineResponse {
    pub line_no: u32,
    pub can_fulfill: bool,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A workflow action with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Forward {
        to_site: SiteId,
        #[serde(default)]
        notes: Option<String>,
    },
    Respond {
        responses: Vec<LineResponse>,
        #[serde(default)]
        notes: Option<String>,
    },
    /// Notes carry the rejection reason and are required.
    Reject {
        #[serde(default)]
        notes: Option<String>,
    },
    ForwardRemaining {
        to_site: SiteId,
        #[serde(default)]
        notes: Option<String>,
    },
    PurchaseRemaining {
        #[serde(default)]
        notes: Option<String>,
    },
    Issue {
        #[serde(default)]
        notes: Option<String>,
    },
    /// Receive the given lines; an empty set receives every outstanding line.
    Receive {
        #[serde(default)]
        lines: BTreeSet<u32>,
        #[serde(default)]
        notes: Option<String>,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Forward { .. } => ActionKind::Forward,
            Action::Respond { .. } => ActionKind::Respond,
            Action::Reject { .. } => ActionKind::Reject,
            Action::ForwardRemaining { .. } => ActionKind::ForwardRemaining,
            Action::PurchaseRemaining { .. } => ActionKind::PurchaseRemaining,
            Action::Issue { .. } => ActionKind::Issue,
            Action::Receive { .. } => ActionKind::Receive,
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            Action::Forward { notes, .. }
            | Action::Respond { notes, .. }
            | Action::Reject { notes }
            | Action::ForwardRemaining { notes, .. }
            | Action::PurchaseRemaining { notes }
            | Action::Issue { notes }
            | Action::Receive { notes, .. } => notes.as_deref(),
        }
    }
}

/// Action without payload; used for history, guards and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Forward,
    Respond,
    Reject,
    ForwardRemaining,
    PurchaseRemaining,
    Issue,
    Receive,
}

impl ActionKind {
    /// Actions that move an existing requisition.
    pub const TRANSITIONS: [ActionKind; 7] = [
        ActionKind::Forward,
        ActionKind::Respond,
        ActionKind::Reject,
        ActionKind::ForwardRemaining,
        ActionKind::PurchaseRemaining,
        ActionKind::Issue,
        ActionKind::Receive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Forward => "forward",
            ActionKind::Respond => "respond",
            ActionKind::Reject => "reject",
            ActionKind::ForwardRemaining => "forward_remaining",
            ActionKind::PurchaseRemaining => "purchase_remaining",
            ActionKind::Issue => "issue",
            ActionKind::Receive => "receive",
        }
    }

    /// URL segment under `/requisitions/:id/`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            ActionKind::ForwardRemaining => "forward-remaining",
            ActionKind::PurchaseRemaining => "purchase-remaining",
            other => other.as_str(),
        }
    }

    pub fn from_path(segment: &str) -> Option<Self> {
        Self::TRANSITIONS
            .into_iter()
            .find(|k| k.path_segment() == segment)
    }

    /// Button label shown next to a requisition.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Create => "Create",
            ActionKind::Forward => "Forward",
            ActionKind::Respond => "Respond",
            ActionKind::Reject => "Reject",
            ActionKind::ForwardRemaining => "Forward remaining",
            ActionKind::PurchaseRemaining => "Purchase remaining",
            ActionKind::Issue => "Issue",
            ActionKind::Receive => "Receive",
        }
    }

    /// Past-tense wording for success toasts.
    pub fn past_tense(&self) -> &'static str {
        match self {
            ActionKind::Create => "created",
            ActionKind::Forward => "forwarded",
            ActionKind::Respond => "responded to",
            ActionKind::Reject => "rejected",
            ActionKind::ForwardRemaining => "forwarded (remaining items)",
            ActionKind::PurchaseRemaining => "approved for purchase",
            ActionKind::Issue => "issued",
            ActionKind::Receive => "received",
        }
    }
}

impl core::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role a party plays relative to one requisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Admin,
    /// User of the site the requisition was forwarded to.
    Destination,
    /// User of the site the remaining items were forwarded to.
    SecondDestination,
    /// User of the site that raised the requisition.
    Requesting,
}

impl core::fmt::Display for Party {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Party::Admin => "admin",
            Party::Destination => "destination site user",
            Party::SecondDestination => "second destination site user",
            Party::Requesting => "requesting site user",
        })
    }
}
