use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetops_core::{
    Actor, Aggregate, AggregateId, AggregateRoot, DomainError, ItemId, SiteId, Stamp, require_text,
};
use fleetops_events::Event;
use fleetops_inventory::{AdjustmentSource, InventoryAdjustment};
use fleetops_listing::Listable;

/// Procurement identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcurementId(pub AggregateId);

impl ProcurementId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for ProcurementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProcurementId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Procurement status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcurementStatus {
    Draft,
    Approved,
    Received,
}

impl ProcurementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcurementStatus::Draft => "draft",
            ProcurementStatus::Approved => "approved",
            ProcurementStatus::Received => "received",
        }
    }
}

/// Procurement line item. Prices are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: i64,
}

impl ProcurementLine {
    /// Line value; accepted lines are checked not to overflow.
    pub fn total(&self) -> i64 {
        self.quantity.saturating_mul(self.unit_price)
    }
}

/// Line as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProcurementLine {
    pub item_id: ItemId,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: i64,
}

/// Aggregate root: Procurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procurement {
    id: ProcurementId,
    procurement_no: String,
    vendor: String,
    site_id: Option<SiteId>,
    /// Requisition whose shortfall this purchase covers.
    requisition_id: Option<AggregateId>,
    status: ProcurementStatus,
    lines: Vec<ProcurementLine>,
    prepared: Option<Stamp>,
    approved: Option<Stamp>,
    received: Option<Stamp>,
    version: u64,
}

impl Procurement {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProcurementId) -> Self {
        Self {
            id,
            procurement_no: String::new(),
            vendor: String::new(),
            site_id: None,
            requisition_id: None,
            status: ProcurementStatus::Draft,
            lines: Vec::new(),
            prepared: None,
            approved: None,
            received: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> ProcurementId {
        self.id
    }

    pub fn procurement_no(&self) -> &str {
        &self.procurement_no
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn site_id(&self) -> Option<SiteId> {
        self.site_id
    }

    pub fn requisition_id(&self) -> Option<AggregateId> {
        self.requisition_id
    }

    pub fn status(&self) -> ProcurementStatus {
        self.status
    }

    pub fn lines(&self) -> &[ProcurementLine] {
        &self.lines
    }

    pub fn prepared(&self) -> Option<&Stamp> {
        self.prepared.as_ref()
    }

    pub fn approved(&self) -> Option<&Stamp> {
        self.approved.as_ref()
    }

    pub fn received(&self) -> Option<&Stamp> {
        self.received.as_ref()
    }

    /// Order value in minor units.
    pub fn total(&self) -> i64 {
        self.lines
            .iter()
            .map(ProcurementLine::total)
            .fold(0i64, i64::saturating_add)
    }

    fn is_created(&self) -> bool {
        self.prepared.is_some()
    }
}

impl AggregateRoot for Procurement {
    type Id = ProcurementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Listable for Procurement {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(self.procurement_no.as_str()),
            Cow::Borrowed(self.vendor.as_str()),
        ]
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "status" => Some(Cow::Borrowed(self.status.as_str())),
            "site" => self.site_id.map(|s| Cow::Owned(s.to_string())),
            _ => None,
        }
    }
}

/// Command: CreateProcurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProcurement {
    pub procurement_id: ProcurementId,
    pub procurement_no: String,
    pub vendor: String,
    pub site_id: SiteId,
    #[serde(default)]
    pub requisition_id: Option<AggregateId>,
    #[serde(default)]
    pub lines: Vec<NewProcurementLine>,
    #[serde(default)]
    pub notes: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub procurement_id: ProcurementId,
    pub line: NewProcurementLine,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub procurement_id: ProcurementId,
    pub actor: Actor,
    #[serde(default)]
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub procurement_id: ProcurementId,
    pub actor: Actor,
    #[serde(default)]
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcurementCommand {
    CreateProcurement(CreateProcurement),
    AddLine(AddLine),
    Approve(Approve),
    ReceiveGoods(ReceiveGoods),
}

/// Event: ProcurementCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementCreated {
    pub procurement_id: ProcurementId,
    pub procurement_no: String,
    pub vendor: String,
    pub site_id: SiteId,
    pub requisition_id: Option<AggregateId>,
    pub stamp: Stamp,
}

/// Event: ProcurementLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementLineAdded {
    pub procurement_id: ProcurementId,
    pub line: ProcurementLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProcurementApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementApproved {
    pub procurement_id: ProcurementId,
    pub stamp: Stamp,
}

/// Event: GoodsReceived.
///
/// Carries the stock movements for the destination site; the caller applies
/// them to inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub procurement_id: ProcurementId,
    pub adjustments: Vec<InventoryAdjustment>,
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcurementEvent {
    ProcurementCreated(ProcurementCreated),
    ProcurementLineAdded(ProcurementLineAdded),
    ProcurementApproved(ProcurementApproved),
    GoodsReceived(GoodsReceived),
}

impl ProcurementEvent {
    /// Stock movements carried by this event, if any.
    pub fn adjustments(&self) -> &[InventoryAdjustment] {
        match self {
            ProcurementEvent::GoodsReceived(e) => &e.adjustments,
            _ => &[],
        }
    }
}

impl Event for ProcurementEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProcurementEvent::ProcurementCreated(_) => "purchasing.procurement.created",
            ProcurementEvent::ProcurementLineAdded(_) => "purchasing.procurement.line_added",
            ProcurementEvent::ProcurementApproved(_) => "purchasing.procurement.approved",
            ProcurementEvent::GoodsReceived(_) => "purchasing.procurement.goods_received",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProcurementEvent::ProcurementCreated(e) => e.stamp.at,
            ProcurementEvent::ProcurementLineAdded(e) => e.occurred_at,
            ProcurementEvent::ProcurementApproved(e) => e.stamp.at,
            ProcurementEvent::GoodsReceived(e) => e.stamp.at,
        }
    }
}

impl Aggregate for Procurement {
    type Command = ProcurementCommand;
    type Event = ProcurementEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProcurementEvent::ProcurementCreated(e) => {
                self.id = e.procurement_id;
                self.procurement_no = e.procurement_no.clone();
                self.vendor = e.vendor.clone();
                self.site_id = Some(e.site_id);
                self.requisition_id = e.requisition_id;
                self.status = ProcurementStatus::Draft;
                self.lines.clear();
                self.prepared = Some(e.stamp.clone());
            }
            ProcurementEvent::ProcurementLineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            ProcurementEvent::ProcurementApproved(e) => {
                self.status = ProcurementStatus::Approved;
                self.approved = Some(e.stamp.clone());
            }
            ProcurementEvent::GoodsReceived(e) => {
                self.status = ProcurementStatus::Received;
                self.received = Some(e.stamp.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProcurementCommand::CreateProcurement(cmd) => self.handle_create(cmd),
            ProcurementCommand::AddLine(cmd) => self.handle_add_line(cmd),
            ProcurementCommand::Approve(cmd) => self.handle_approve(cmd),
            ProcurementCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
        }
    }
}

/// Validate a line and add its value to `running_total`.
fn validate_line(line: &NewProcurementLine, running_total: i64) -> Result<i64, DomainError> {
    if line.quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    if line.unit_price < 0 {
        return Err(DomainError::validation("unit price cannot be negative"));
    }
    line.quantity
        .checked_mul(line.unit_price)
        .and_then(|value| running_total.checked_add(value))
        .ok_or_else(|| DomainError::validation("procurement total is too large"))
}

impl Procurement {
    fn ensure_procurement_id(&self, procurement_id: ProcurementId) -> Result<(), DomainError> {
        if self.id != procurement_id {
            return Err(DomainError::invariant("procurement_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreateProcurement,
    ) -> Result<Vec<ProcurementEvent>, DomainError> {
        if self.is_created() {
            return Err(DomainError::conflict("procurement already exists"));
        }
        self.ensure_procurement_id(cmd.procurement_id)?;
        if !cmd.actor.admin {
            return Err(DomainError::unauthorized("only an admin may raise procurements"));
        }
        require_text("procurement_no", &cmd.procurement_no)?;
        require_text("vendor", &cmd.vendor)?;

        let mut events = vec![ProcurementEvent::ProcurementCreated(ProcurementCreated {
            procurement_id: cmd.procurement_id,
            procurement_no: cmd.procurement_no.trim().to_string(),
            vendor: cmd.vendor.trim().to_string(),
            site_id: cmd.site_id,
            requisition_id: cmd.requisition_id,
            stamp: Stamp::new(cmd.actor.user_id, cmd.occurred_at, cmd.notes.clone()),
        })];

        let mut total = 0i64;
        for (idx, line) in cmd.lines.iter().enumerate() {
            total = validate_line(line, total)?;
            events.push(ProcurementEvent::ProcurementLineAdded(ProcurementLineAdded {
                procurement_id: cmd.procurement_id,
                line: ProcurementLine {
                    line_no: idx as u32 + 1,
                    item_id: line.item_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                },
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<ProcurementEvent>, DomainError> {
        if !self.is_created() {
            return Err(DomainError::not_found());
        }
        self.ensure_procurement_id(cmd.procurement_id)?;

        if self.status != ProcurementStatus::Draft {
            return Err(DomainError::conflict(
                "cannot modify a procurement once approved or received",
            ));
        }
        validate_line(&cmd.line, self.total())?;

        let next_line_no = (self.lines.len() as u32) + 1;
        Ok(vec![ProcurementEvent::ProcurementLineAdded(ProcurementLineAdded {
            procurement_id: cmd.procurement_id,
            line: ProcurementLine {
                line_no: next_line_no,
                item_id: cmd.line.item_id,
                quantity: cmd.line.quantity,
                unit_price: cmd.line.unit_price,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &Approve) -> Result<Vec<ProcurementEvent>, DomainError> {
        if !self.is_created() {
            return Err(DomainError::not_found());
        }
        self.ensure_procurement_id(cmd.procurement_id)?;

        if self.status != ProcurementStatus::Draft {
            return Err(DomainError::conflict("only draft procurements can be approved"));
        }
        if !cmd.actor.admin {
            return Err(DomainError::unauthorized("only an admin may approve procurements"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot approve a procurement without lines",
            ));
        }

        Ok(vec![ProcurementEvent::ProcurementApproved(ProcurementApproved {
            procurement_id: cmd.procurement_id,
            stamp: Stamp::new(cmd.actor.user_id, cmd.occurred_at, cmd.notes.clone()),
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveGoods) -> Result<Vec<ProcurementEvent>, DomainError> {
        if !self.is_created() {
            return Err(DomainError::not_found());
        }
        self.ensure_procurement_id(cmd.procurement_id)?;

        if self.status != ProcurementStatus::Approved {
            return Err(DomainError::conflict(
                "cannot receive goods before the procurement is approved",
            ));
        }
        let Some(site_id) = self.site_id else {
            return Err(DomainError::invariant("destination site must be set"));
        };
        if !cmd.actor.admin && !cmd.actor.at_site(Some(site_id)) {
            return Err(DomainError::unauthorized(
                "only the destination site or an admin may receive goods",
            ));
        }

        let source = AdjustmentSource::Procurement {
            procurement_id: self.id.0,
        };
        let adjustments = self
            .lines
            .iter()
            .map(|line| InventoryAdjustment {
                site_id,
                item_id: line.item_id,
                delta: line.quantity,
                source: source.clone(),
            })
            .collect();

        Ok(vec![ProcurementEvent::GoodsReceived(GoodsReceived {
            procurement_id: cmd.procurement_id,
            adjustments,
            stamp: Stamp::new(cmd.actor.user_id, cmd.occurred_at, cmd.notes.clone()),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetops_core::UserId;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn admin() -> Actor {
        Actor::admin(UserId::new())
    }

    fn create_cmd(id: ProcurementId, site_id: SiteId, lines: Vec<NewProcurementLine>) -> CreateProcurement {
        CreateProcurement {
            procurement_id: id,
            procurement_no: "PO-0042".to_string(),
            vendor: "Lanka Hardware".to_string(),
            site_id,
            requisition_id: None,
            lines,
            notes: None,
            actor: admin(),
            occurred_at: test_time(),
        }
    }

    fn line(quantity: i64, unit_price: i64) -> NewProcurementLine {
        NewProcurementLine {
            item_id: ItemId::new(),
            quantity,
            unit_price,
        }
    }

    #[test]
    fn overflowing_totals_are_refused() {
        let id = ProcurementId::generate();
        let site = SiteId::new();

        let err = Procurement::empty(id)
            .handle(&ProcurementCommand::CreateProcurement(create_cmd(
                id,
                site,
                vec![line(i64::MAX / 2, 3)],
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = Procurement::empty(id)
            .handle(&ProcurementCommand::CreateProcurement(create_cmd(
                id,
                site,
                vec![line(1, i64::MAX), line(1, 1)],
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let (order, _) = Procurement::empty(id)
            .execute(&ProcurementCommand::CreateProcurement(create_cmd(
                id,
                site,
                vec![line(1, i64::MAX - 5)],
            )))
            .unwrap();
        let err = order
            .handle(&ProcurementCommand::AddLine(AddLine {
                procurement_id: id,
                line: line(1, 10),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_emits_created_and_line_events() {
        let id = ProcurementId::generate();
        let events = Procurement::empty(id)
            .handle(&ProcurementCommand::CreateProcurement(create_cmd(
                id,
                SiteId::new(),
                vec![line(10, 250), line(2, 1_000)],
            )))
            .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type(), "purchasing.procurement.created");

        let mut procurement = Procurement::empty(id);
        for e in &events {
            procurement.apply(e);
        }
        assert_eq!(procurement.total(), 4_500);
        assert_eq!(procurement.lines()[1].line_no, 2);
        assert_eq!(procurement.version(), 3);
    }

    #[test]
    fn site_users_cannot_raise_procurements() {
        let id = ProcurementId::generate();
        let site = SiteId::new();
        let mut cmd = create_cmd(id, site, vec![line(1, 1)]);
        cmd.actor = Actor::site_user(UserId::new(), site);
        assert!(matches!(
            Procurement::empty(id).handle(&ProcurementCommand::CreateProcurement(cmd)),
            Err(DomainError::Unauthorized(_))
        ));
    }

    #[test]
    fn approve_requires_lines() {
        let id = ProcurementId::generate();
        let (procurement, _) = Procurement::empty(id)
            .execute(&ProcurementCommand::CreateProcurement(create_cmd(
                id,
                SiteId::new(),
                Vec::new(),
            )))
            .unwrap();

        let approve = ProcurementCommand::Approve(Approve {
            procurement_id: id,
            actor: admin(),
            notes: None,
            occurred_at: test_time(),
        });
        assert!(matches!(
            procurement.handle(&approve),
            Err(DomainError::Validation(_))
        ));

        let (procurement, _) = procurement
            .execute(&ProcurementCommand::AddLine(AddLine {
                procurement_id: id,
                line: line(5, 100),
                occurred_at: test_time(),
            }))
            .unwrap();
        let (procurement, _) = procurement.execute(&approve).unwrap();
        assert_eq!(procurement.status(), ProcurementStatus::Approved);

        let err = procurement
            .handle(&ProcurementCommand::AddLine(AddLine {
                procurement_id: id,
                line: line(1, 1),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn cannot_receive_before_approval() {
        let id = ProcurementId::generate();
        let site = SiteId::new();
        let (procurement, _) = Procurement::empty(id)
            .execute(&ProcurementCommand::CreateProcurement(create_cmd(
                id,
                site,
                vec![line(10, 1)],
            )))
            .unwrap();

        let err = procurement
            .handle(&ProcurementCommand::ReceiveGoods(ReceiveGoods {
                procurement_id: id,
                actor: Actor::site_user(UserId::new(), site),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("before the procurement is approved") => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn receive_emits_adjustments_for_the_destination_site() {
        let id = ProcurementId::generate();
        let site = SiteId::new();
        let first = line(10, 1);
        let item = first.item_id;
        let (procurement, _) = Procurement::empty(id)
            .execute(&ProcurementCommand::CreateProcurement(create_cmd(id, site, vec![first])))
            .unwrap();
        let (procurement, _) = procurement
            .execute(&ProcurementCommand::Approve(Approve {
                procurement_id: id,
                actor: admin(),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();

        let outsider = ProcurementCommand::ReceiveGoods(ReceiveGoods {
            procurement_id: id,
            actor: Actor::site_user(UserId::new(), SiteId::new()),
            notes: None,
            occurred_at: test_time(),
        });
        assert!(matches!(
            procurement.handle(&outsider),
            Err(DomainError::Unauthorized(_))
        ));

        let (received, events) = procurement
            .execute(&ProcurementCommand::ReceiveGoods(ReceiveGoods {
                procurement_id: id,
                actor: Actor::site_user(UserId::new(), site),
                notes: Some("all boxes intact".into()),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(received.status(), ProcurementStatus::Received);

        let adjustments = events[0].adjustments();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].site_id, site);
        assert_eq!(adjustments[0].item_id, item);
        assert_eq!(adjustments[0].delta, 10);
        assert_eq!(
            adjustments[0].source,
            AdjustmentSource::Procurement { procurement_id: id.0 }
        );
    }

    proptest! {
        #[test]
        fn total_is_sum_of_line_totals(
            lines in proptest::collection::vec((1i64..1_000, 0i64..100_000), 0..8)
        ) {
            let id = ProcurementId::generate();
            let new_lines: Vec<_> = lines.iter().map(|(q, p)| line(*q, *p)).collect();
            let (procurement, _) = Procurement::empty(id)
                .execute(&ProcurementCommand::CreateProcurement(create_cmd(id, SiteId::new(), new_lines)))
                .unwrap();
            let expected: i64 = lines.iter().map(|(q, p)| q * p).sum();
            prop_assert_eq!(procurement.total(), expected);
        }
    }
}
