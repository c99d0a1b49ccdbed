//! Requisition state machine.
//!
//! `handle` decides which events an action produces, `apply` evolves the
//! state. [`transition`] is the entry point shared by the API and clients.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetops_core::{Aggregate, ItemId, SiteId, Stamp, UserId, audit::normalize_notes};
use fleetops_events::Event;
use fleetops_inventory::{AdjustmentSource, InventoryAdjustment};

use crate::action::{Action, ActionKind, Actor, LineResponse, Party};
use crate::error::{IllegalReason, TransitionError};
use crate::model::{
    HistoryEntry, ItemResponse, MAX_LINE_QUANTITY, NewRequisition, Requisition, RequisitionId, RequisitionItem,
    RequisitionStatus,
};

/// Command: create a requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequisition {
    pub id: RequisitionId,
    pub new: NewRequisition,
    pub prepared_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: move an existing requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCommand {
    pub action: Action,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequisitionCommand {
    Create(CreateRequisition),
    Transition(TransitionCommand),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequisitionEvent {
    Created {
        requisition_no: String,
        requesting_site: SiteId,
        priority: crate::model::Priority,
        items: Vec<RequisitionItem>,
        stamp: Stamp,
    },
    Forwarded {
        to_site: SiteId,
        stamp: Stamp,
    },
    Responded {
        responses: Vec<LineResponse>,
        outcome: RequisitionStatus,
        stamp: Stamp,
    },
    Rejected {
        stamp: Stamp,
    },
    RemainingForwarded {
        to_site: SiteId,
        stamp: Stamp,
    },
    RemainingPurchaseApproved {
        stamp: Stamp,
    },
    Issued {
        /// `(line_no, issued quantity)`
        issued: Vec<(u32, i64)>,
        stamp: Stamp,
    },
    LinesReceived {
        lines: Vec<u32>,
        adjustments: Vec<InventoryAdjustment>,
        complete: bool,
        stamp: Stamp,
    },
}

impl RequisitionEvent {
    pub fn stamp(&self) -> &Stamp {
        match self {
            RequisitionEvent::Created { stamp, .. }
            | RequisitionEvent::Forwarded { stamp, .. }
            | RequisitionEvent::Responded { stamp, .. }
            | RequisitionEvent::Rejected { stamp }
            | RequisitionEvent::RemainingForwarded { stamp, .. }
            | RequisitionEvent::RemainingPurchaseApproved { stamp }
            | RequisitionEvent::Issued { stamp, .. }
            | RequisitionEvent::LinesReceived { stamp, .. } => stamp,
        }
    }

    pub fn action(&self) -> ActionKind {
        match self {
            RequisitionEvent::Created { .. } => ActionKind::Create,
            RequisitionEvent::Forwarded { .. } => ActionKind::Forward,
            RequisitionEvent::Responded { .. } => ActionKind::Respond,
            RequisitionEvent::Rejected { .. } => ActionKind::Reject,
            RequisitionEvent::RemainingForwarded { .. } => ActionKind::ForwardRemaining,
            RequisitionEvent::RemainingPurchaseApproved { .. } => ActionKind::PurchaseRemaining,
            RequisitionEvent::Issued { .. } => ActionKind::Issue,
            RequisitionEvent::LinesReceived { .. } => ActionKind::Receive,
        }
    }

    /// Stock movements carried by this event, if any.
    pub fn adjustments(&self) -> &[InventoryAdjustment] {
        match self {
            RequisitionEvent::LinesReceived { adjustments, .. } => adjustments,
            _ => &[],
        }
    }
}

impl Event for RequisitionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequisitionEvent::Created { .. } => "requisitions.requisition.created",
            RequisitionEvent::Forwarded { .. } => "requisitions.requisition.forwarded",
            RequisitionEvent::Responded { .. } => "requisitions.requisition.responded",
            RequisitionEvent::Rejected { .. } => "requisitions.requisition.rejected",
            RequisitionEvent::RemainingForwarded { .. } => {
                "requisitions.requisition.remaining_forwarded"
            }
            RequisitionEvent::RemainingPurchaseApproved { .. } => {
                "requisitions.requisition.remaining_purchase_approved"
            }
            RequisitionEvent::Issued { .. } => "requisitions.requisition.issued",
            RequisitionEvent::LinesReceived { .. } => "requisitions.requisition.lines_received",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.stamp().at
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transitioned {
    pub requisition: Requisition,
    pub events: Vec<RequisitionEvent>,
    /// Stock movements the caller must apply.
    pub adjustments: Vec<InventoryAdjustment>,
}

/// Source states and permitted parties for an action.
fn rule(kind: ActionKind, status: RequisitionStatus) -> Option<&'static [Party]> {
    use RequisitionStatus as S;

    match (kind, status) {
        (ActionKind::Forward, S::Pending) => Some(&[Party::Admin]),
        (ActionKind::Respond, S::Forwarded) => Some(&[Party::Destination]),
        (ActionKind::Reject, S::Forwarded) => Some(&[Party::Admin, Party::Destination]),
        (ActionKind::ForwardRemaining, S::PartiallyApproved) => Some(&[Party::Admin]),
        (ActionKind::PurchaseRemaining, S::PartiallyApproved) => Some(&[Party::Admin]),
        (ActionKind::Issue, S::Approved) => Some(&[Party::Destination]),
        (ActionKind::Issue, S::PartiallyForwarded) => {
            Some(&[Party::Destination, Party::SecondDestination])
        }
        (ActionKind::Receive, S::Issued | S::Received) => Some(&[Party::Requesting]),
        _ => None,
    }
}

fn plays(requisition: &Requisition, actor: &Actor, party: Party) -> bool {
    match party {
        Party::Admin => actor.admin,
        Party::Destination => actor.at_site(requisition.forwarded_to_site),
        Party::SecondDestination => actor.at_site(requisition.second_forward_to_site),
        Party::Requesting => actor.at_site(Some(requisition.requesting_site)),
    }
}

fn guard(
    requisition: &Requisition,
    kind: ActionKind,
    actor: &Actor,
) -> Result<(), TransitionError> {
    let illegal = |reason| TransitionError::IllegalTransition {
        action: kind,
        status: requisition.status,
        reason,
    };

    let parties = rule(kind, requisition.status).ok_or_else(|| illegal(IllegalReason::WrongState))?;
    if parties.iter().any(|p| plays(requisition, actor, *p)) {
        Ok(())
    } else {
        Err(illegal(IllegalReason::RoleNotPermitted(parties.to_vec())))
    }
}

/// Actions `actor` may perform on `requisition` right now.
pub fn allowed_actions(requisition: &Requisition, actor: &Actor) -> Vec<ActionKind> {
    if !requisition.is_created() {
        return Vec::new();
    }
    ActionKind::TRANSITIONS
        .into_iter()
        .filter(|kind| {
            // Re-receiving a fully received requisition is accepted but is not
            // something to offer.
            !(*kind == ActionKind::Receive && requisition.status == RequisitionStatus::Received)
        })
        .filter(|kind| guard(requisition, *kind, actor).is_ok())
        .collect()
}

/// Validate and create a new requisition.
pub fn create(
    id: RequisitionId,
    new: NewRequisition,
    prepared_by: UserId,
    at: DateTime<Utc>,
) -> Result<Transitioned, TransitionError> {
    let command = RequisitionCommand::Create(CreateRequisition {
        id,
        new,
        prepared_by,
        occurred_at: at,
    });
    let (requisition, events) = Requisition::empty(id).execute(&command)?;
    Ok(Transitioned {
        requisition,
        events,
        adjustments: Vec::new(),
    })
}

/// Apply `action` by `actor` to `requisition`.
///
/// The input is left untouched; the successor state is returned together
/// with the emitted events and the inventory adjustments to apply.
pub fn transition(
    requisition: &Requisition,
    action: Action,
    actor: Actor,
    at: DateTime<Utc>,
) -> Result<Transitioned, TransitionError> {
    let command = RequisitionCommand::Transition(TransitionCommand {
        action,
        actor,
        occurred_at: at,
    });
    let (next, events) = requisition.execute(&command)?;
    let adjustments = events
        .iter()
        .flat_map(|e| e.adjustments().iter().cloned())
        .collect();
    Ok(Transitioned {
        requisition: next,
        events,
        adjustments,
    })
}

impl Aggregate for Requisition {
    type Command = RequisitionCommand;
    type Event = RequisitionEvent;
    type Error = TransitionError;

    fn apply(&mut self, event: &Self::Event) {
        let from = self.status;
        match event {
            RequisitionEvent::Created {
                requisition_no,
                requesting_site,
                priority,
                items,
                stamp,
            } => {
                self.requisition_no = requisition_no.clone();
                self.requesting_site = *requesting_site;
                self.priority = *priority;
                self.items = items.clone();
                self.status = RequisitionStatus::Pending;
                self.prepared = Some(stamp.clone());
            }
            RequisitionEvent::Forwarded { to_site, stamp } => {
                self.forwarded_to_site = Some(*to_site);
                self.status = RequisitionStatus::Forwarded;
                self.reviewed = Some(stamp.clone());
            }
            RequisitionEvent::Responded {
                responses,
                outcome,
                stamp,
            } => {
                for response in responses {
                    if let Some(item) = self.items.iter_mut().find(|i| i.line_no == response.line_no) {
                        item.response = Some(ItemResponse {
                            can_fulfill: response.can_fulfill,
                            quantity: response.quantity,
                            notes: normalize_notes(response.notes.clone()),
                        });
                    }
                }
                self.status = *outcome;
                self.responded = Some(stamp.clone());
                if *outcome == RequisitionStatus::Approved {
                    self.approved = Some(stamp.clone());
                }
            }
            RequisitionEvent::Rejected { stamp } => {
                self.status = RequisitionStatus::Rejected;
                self.rejected = Some(stamp.clone());
            }
            RequisitionEvent::RemainingForwarded { to_site, stamp } => {
                self.second_forward_to_site = Some(*to_site);
                self.status = RequisitionStatus::PartiallyForwarded;
                self.reviewed = Some(stamp.clone());
            }
            RequisitionEvent::RemainingPurchaseApproved { stamp } => {
                self.purchase_remaining = true;
                self.status = RequisitionStatus::Approved;
                self.approved = Some(stamp.clone());
            }
            RequisitionEvent::Issued { issued, stamp } => {
                for (line_no, quantity) in issued {
                    if let Some(item) = self.items.iter_mut().find(|i| i.line_no == *line_no) {
                        item.issued_quantity = Some(*quantity);
                    }
                }
                self.status = RequisitionStatus::Issued;
                self.issued = Some(stamp.clone());
            }
            RequisitionEvent::LinesReceived {
                lines,
                complete,
                stamp,
                ..
            } => {
                for item in self.items.iter_mut().filter(|i| lines.contains(&i.line_no)) {
                    item.received = true;
                }
                if *complete {
                    self.status = RequisitionStatus::Received;
                }
                self.received = Some(stamp.clone());
            }
        }

        let stamp = event.stamp();
        self.history.push(HistoryEntry {
            action: event.action(),
            from,
            to: self.status,
            by: stamp.by,
            at: stamp.at,
            notes: stamp.notes.clone(),
        });
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RequisitionCommand::Create(cmd) => self.handle_create(cmd),
            RequisitionCommand::Transition(cmd) => {
                if !self.is_created() {
                    return Err(TransitionError::NotFound);
                }
                guard(self, cmd.action.kind(), &cmd.actor)?;
                let stamp = Stamp::new(
                    cmd.actor.user_id,
                    cmd.occurred_at,
                    cmd.action.notes().map(str::to_string),
                );
                self.decide(&cmd.action, stamp)
            }
        }
    }
}

impl Requisition {
    fn handle_create(&self, cmd: &CreateRequisition) -> Result<Vec<RequisitionEvent>, TransitionError> {
        if self.is_created() {
            return Err(TransitionError::AlreadyExists);
        }
        if self.id != cmd.id {
            return Err(TransitionError::validation("requisition id mismatch"));
        }

        let new = &cmd.new;
        if new.requisition_no.trim().is_empty() {
            return Err(TransitionError::validation("requisition number cannot be empty"));
        }
        if new.items.is_empty() {
            return Err(TransitionError::validation(
                "requisition must have at least one item",
            ));
        }

        let mut seen: BTreeSet<ItemId> = BTreeSet::new();
        let mut items = Vec::with_capacity(new.items.len());
        for (idx, line) in new.items.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if line.quantity <= 0 {
                return Err(TransitionError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            if line.quantity > MAX_LINE_QUANTITY {
                return Err(TransitionError::validation(format!(
                    "line {line_no}: quantity cannot exceed {MAX_LINE_QUANTITY}"
                )));
            }
            if !seen.insert(line.item_id) {
                return Err(TransitionError::validation(format!(
                    "line {line_no}: item {} appears more than once",
                    line.item_id
                )));
            }
            items.push(RequisitionItem {
                line_no,
                item_id: line.item_id,
                unit_id: line.unit_id,
                quantity: line.quantity,
                response: None,
                issued_quantity: None,
                received: false,
            });
        }

        Ok(vec![RequisitionEvent::Created {
            requisition_no: new.requisition_no.trim().to_string(),
            requesting_site: new.requesting_site,
            priority: new.priority,
            items,
            stamp: Stamp::new(cmd.prepared_by, cmd.occurred_at, new.notes.clone()),
        }])
    }

    fn decide(&self, action: &Action, stamp: Stamp) -> Result<Vec<RequisitionEvent>, TransitionError> {
        match action {
            Action::Forward { to_site, .. } => {
                if *to_site == self.requesting_site {
                    return Err(TransitionError::validation(
                        "cannot forward a requisition to the requesting site",
                    ));
                }
                Ok(vec![RequisitionEvent::Forwarded {
                    to_site: *to_site,
                    stamp,
                }])
            }
            Action::Respond { responses, .. } => self.decide_respond(responses, stamp),
            Action::Reject { .. } => {
                if stamp.notes.is_none() {
                    return Err(TransitionError::validation("a rejection reason is required"));
                }
                Ok(vec![RequisitionEvent::Rejected { stamp }])
            }
            Action::ForwardRemaining { to_site, .. } => {
                if *to_site == self.requesting_site {
                    return Err(TransitionError::validation(
                        "cannot forward remaining items to the requesting site",
                    ));
                }
                if Some(*to_site) == self.forwarded_to_site {
                    return Err(TransitionError::validation(
                        "remaining items must go to a different site",
                    ));
                }
                Ok(vec![RequisitionEvent::RemainingForwarded {
                    to_site: *to_site,
                    stamp,
                }])
            }
            Action::PurchaseRemaining { .. } => {
                Ok(vec![RequisitionEvent::RemainingPurchaseApproved { stamp }])
            }
            Action::Issue { .. } => {
                let issued = self.items.iter().map(|i| (i.line_no, i.quantity)).collect();
                Ok(vec![RequisitionEvent::Issued { issued, stamp }])
            }
            Action::Receive { lines, .. } => self.decide_receive(lines, stamp),
        }
    }

    fn decide_respond(
        &self,
        responses: &[LineResponse],
        stamp: Stamp,
    ) -> Result<Vec<RequisitionEvent>, TransitionError> {
        let mut answered = BTreeSet::new();
        for response in responses {
            let item = self.item(response.line_no).ok_or_else(|| {
                TransitionError::validation(format!("unknown line {}", response.line_no))
            })?;
            if !answered.insert(response.line_no) {
                return Err(TransitionError::validation(format!(
                    "line {} answered twice",
                    response.line_no
                )));
            }
            if response.quantity < 0 {
                return Err(TransitionError::validation(format!(
                    "line {}: quantity cannot be negative",
                    response.line_no
                )));
            }
            if response.quantity > item.quantity {
                return Err(TransitionError::validation(format!(
                    "line {}: quantity {} exceeds the {} requested",
                    response.line_no, response.quantity, item.quantity
                )));
            }
        }
        if let Some(missing) = self.items.iter().find(|i| !answered.contains(&i.line_no)) {
            return Err(TransitionError::validation(format!(
                "line {} has no response",
                missing.line_no
            )));
        }

        let full = responses.iter().all(|r| {
            r.can_fulfill && self.item(r.line_no).is_some_and(|i| i.quantity == r.quantity)
        });
        let outcome = if full {
            RequisitionStatus::Approved
        } else {
            RequisitionStatus::PartiallyApproved
        };

        let mut responses = responses.to_vec();
        responses.sort_by_key(|r| r.line_no);
        Ok(vec![RequisitionEvent::Responded {
            responses,
            outcome,
            stamp,
        }])
    }

    fn decide_receive(
        &self,
        lines: &BTreeSet<u32>,
        stamp: Stamp,
    ) -> Result<Vec<RequisitionEvent>, TransitionError> {
        if let Some(unknown) = lines.iter().find(|l| self.item(**l).is_none()) {
            return Err(TransitionError::validation(format!("unknown line {unknown}")));
        }

        let newly: Vec<&RequisitionItem> = self
            .items
            .iter()
            .filter(|i| !i.received && (lines.is_empty() || lines.contains(&i.line_no)))
            .collect();
        if newly.is_empty() {
            return Ok(Vec::new());
        }

        let source = AdjustmentSource::Requisition {
            requisition_id: self.id.0,
        };
        let adjustments = newly
            .iter()
            .map(|i| InventoryAdjustment {
                site_id: self.requesting_site,
                item_id: i.item_id,
                delta: i.issued_quantity.unwrap_or(i.quantity),
                source: source.clone(),
            })
            .collect();
        let complete = self
            .items
            .iter()
            .all(|i| i.received || newly.iter().any(|n| n.line_no == i.line_no));

        Ok(vec![RequisitionEvent::LinesReceived {
            lines: newly.iter().map(|i| i.line_no).collect(),
            adjustments,
            complete,
            stamp,
        }])
    }
}
