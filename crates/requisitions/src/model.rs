use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetops_core::{AggregateId, AggregateRoot, DomainError, ItemId, SiteId, Stamp, UnitId, UserId};
use fleetops_listing::Listable;

use crate::action::ActionKind;

/// Requisition identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequisitionId(pub AggregateId);

impl RequisitionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for RequisitionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for RequisitionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    #[serde(alias = "urgent")]
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Requisition status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    Pending,
    Forwarded,
    Approved,
    PartiallyApproved,
    Rejected,
    Issued,
    Received,
    PartiallyForwarded,
}

impl RequisitionStatus {
    pub const ALL: [RequisitionStatus; 8] = [
        RequisitionStatus::Pending,
        RequisitionStatus::Forwarded,
        RequisitionStatus::Approved,
        RequisitionStatus::PartiallyApproved,
        RequisitionStatus::Rejected,
        RequisitionStatus::Issued,
        RequisitionStatus::Received,
        RequisitionStatus::PartiallyForwarded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequisitionStatus::Pending => "pending",
            RequisitionStatus::Forwarded => "forwarded",
            RequisitionStatus::Approved => "approved",
            RequisitionStatus::PartiallyApproved => "partially_approved",
            RequisitionStatus::Rejected => "rejected",
            RequisitionStatus::Issued => "issued",
            RequisitionStatus::Received => "received",
            RequisitionStatus::PartiallyForwarded => "partially_forwarded",
        }
    }

    /// Human label for badges.
    pub fn label(&self) -> &'static str {
        match self {
            RequisitionStatus::Pending => "Pending",
            RequisitionStatus::Forwarded => "Forwarded",
            RequisitionStatus::Approved => "Approved",
            RequisitionStatus::PartiallyApproved => "Partially approved",
            RequisitionStatus::Rejected => "Rejected",
            RequisitionStatus::Issued => "Issued",
            RequisitionStatus::Received => "Received",
            RequisitionStatus::PartiallyForwarded => "Partially forwarded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequisitionStatus::Rejected | RequisitionStatus::Received)
    }
}

impl core::fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The responding site's answer for one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub can_fulfill: bool,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionItem {
    pub line_no: u32,
    pub item_id: ItemId,
    pub unit_id: UnitId,
    /// Requested quantity.
    pub quantity: i64,
    #[serde(default)]
    pub response: Option<ItemResponse>,
    #[serde(default)]
    pub issued_quantity: Option<i64>,
    #[serde(default)]
    pub received: bool,
}

impl RequisitionItem {
    /// Whether the response covers the full requested quantity.
    pub fn fully_approved(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|r| r.can_fulfill && r.quantity == self.quantity)
    }

    /// Quantity the responding site could not cover.
    pub fn shortfall(&self) -> i64 {
        match &self.response {
            Some(r) if r.can_fulfill => (self.quantity - r.quantity).max(0),
            Some(_) => self.quantity,
            None => 0,
        }
    }
}

/// Upper bound on a requested line quantity.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000_000;

/// Line of a new requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub item_id: ItemId,
    pub unit_id: UnitId,
    pub quantity: i64,
}

/// Input for creating a requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisition {
    pub requisition_no: String,
    pub requesting_site: SiteId,
    #[serde(default)]
    pub priority: Priority,
    pub items: Vec<NewLine>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One step of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: ActionKind,
    pub from: RequisitionStatus,
    pub to: RequisitionStatus,
    pub by: UserId,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Aggregate root: Requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requisition {
    pub(crate) id: RequisitionId,
    pub(crate) requisition_no: String,
    pub(crate) requesting_site: SiteId,
    pub(crate) forwarded_to_site: Option<SiteId>,
    pub(crate) second_forward_to_site: Option<SiteId>,
    pub(crate) priority: Priority,
    pub(crate) status: RequisitionStatus,
    pub(crate) items: Vec<RequisitionItem>,
    /// Admin chose to purchase what the responding site could not cover.
    pub(crate) purchase_remaining: bool,
    pub(crate) prepared: Option<Stamp>,
    pub(crate) reviewed: Option<Stamp>,
    pub(crate) responded: Option<Stamp>,
    pub(crate) approved: Option<Stamp>,
    pub(crate) rejected: Option<Stamp>,
    pub(crate) issued: Option<Stamp>,
    pub(crate) received: Option<Stamp>,
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) version: u64,
}

impl Requisition {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: RequisitionId) -> Self {
        Self {
            id,
            requisition_no: String::new(),
            requesting_site: SiteId::from_uuid(Default::default()),
            forwarded_to_site: None,
            second_forward_to_site: None,
            priority: Priority::default(),
            status: RequisitionStatus::Pending,
            items: Vec::new(),
            purchase_remaining: false,
            prepared: None,
            reviewed: None,
            responded: None,
            approved: None,
            rejected: None,
            issued: None,
            received: None,
            history: Vec::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> RequisitionId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.prepared.is_some()
    }

    pub fn requisition_no(&self) -> &str {
        &self.requisition_no
    }

    pub fn requesting_site(&self) -> SiteId {
        self.requesting_site
    }

    pub fn forwarded_to_site(&self) -> Option<SiteId> {
        self.forwarded_to_site
    }

    pub fn second_forward_to_site(&self) -> Option<SiteId> {
        self.second_forward_to_site
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> RequisitionStatus {
        self.status
    }

    pub fn items(&self) -> &[RequisitionItem] {
        &self.items
    }

    pub fn item(&self, line_no: u32) -> Option<&RequisitionItem> {
        self.items.iter().find(|i| i.line_no == line_no)
    }

    pub fn purchase_remaining(&self) -> bool {
        self.purchase_remaining
    }

    pub fn prepared(&self) -> Option<&Stamp> {
        self.prepared.as_ref()
    }

    pub fn reviewed(&self) -> Option<&Stamp> {
        self.reviewed.as_ref()
    }

    pub fn responded(&self) -> Option<&Stamp> {
        self.responded.as_ref()
    }

    pub fn approved(&self) -> Option<&Stamp> {
        self.approved.as_ref()
    }

    pub fn rejected(&self) -> Option<&Stamp> {
        self.rejected.as_ref()
    }

    pub fn issued(&self) -> Option<&Stamp> {
        self.issued.as_ref()
    }

    pub fn received(&self) -> Option<&Stamp> {
        self.received.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn all_received(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.received)
    }

    /// Does the requisition concern `site` in any role?
    pub fn involves_site(&self, site: SiteId) -> bool {
        self.requesting_site == site
            || self.forwarded_to_site == Some(site)
            || self.second_forward_to_site == Some(site)
    }

    /// Lines with a shortfall after a partial response, as
    /// `(line_no, item_id, missing quantity)`.
    pub fn remaining(&self) -> Vec<(u32, ItemId, i64)> {
        self.items
            .iter()
            .filter(|i| i.shortfall() > 0)
            .map(|i| (i.line_no, i.item_id, i.shortfall()))
            .collect()
    }
}

impl AggregateRoot for Requisition {
    type Id = RequisitionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Listable for Requisition {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        let mut fields = vec![Cow::Borrowed(self.requisition_no.as_str())];
        if let Some(notes) = self.prepared.as_ref().and_then(|p| p.notes.as_deref()) {
            fields.push(Cow::Borrowed(notes));
        }
        fields
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "status" => Some(Cow::Borrowed(self.status.as_str())),
            "priority" => Some(Cow::Borrowed(self.priority.as_str())),
            "requesting_site" => Some(Cow::Owned(self.requesting_site.to_string())),
            "forwarded_to_site" => self.forwarded_to_site.map(|s| Cow::Owned(s.to_string())),
            _ => None,
        }
    }
}
