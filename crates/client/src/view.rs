//! Requisition screen state derived from the domain model.

use serde::Serialize;

use fleetops_core::{Actor, ItemId, UnitId};
use fleetops_requisitions::{
    ActionKind, Requisition, RequisitionId, RequisitionStatus, allowed_actions,
};

/// A button offered next to a requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionButton {
    pub kind: ActionKind,
    pub label: &'static str,
    pub path_segment: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineView {
    pub line_no: u32,
    pub item_id: ItemId,
    pub unit_id: UnitId,
    pub requested: i64,
    pub approved: Option<i64>,
    pub issued: Option<i64>,
    pub received: bool,
    /// Still waiting to arrive at the requesting site.
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequisitionView {
    pub id: RequisitionId,
    pub requisition_no: String,
    pub status: RequisitionStatus,
    pub status_label: &'static str,
    pub priority: &'static str,
    pub actions: Vec<ActionButton>,
    pub lines: Vec<LineView>,
}

impl RequisitionView {
    pub fn project(requisition: &Requisition, actor: &Actor) -> Self {
        let rejected = requisition.status() == RequisitionStatus::Rejected;
        let actions = allowed_actions(requisition, actor)
            .into_iter()
            .map(|kind| ActionButton {
                kind,
                label: kind.label(),
                path_segment: kind.path_segment(),
            })
            .collect();
        let lines = requisition
            .items()
            .iter()
            .map(|item| LineView {
                line_no: item.line_no,
                item_id: item.item_id,
                unit_id: item.unit_id,
                requested: item.quantity,
                approved: item
                    .response
                    .as_ref()
                    .map(|r| if r.can_fulfill { r.quantity } else { 0 }),
                issued: item.issued_quantity,
                received: item.received,
                pending: !item.received && !rejected,
            })
            .collect();

        Self {
            id: requisition.id_typed(),
            requisition_no: requisition.requisition_no().to_string(),
            status: requisition.status(),
            status_label: requisition.status().label(),
            priority: requisition.priority().as_str(),
            actions,
            lines,
        }
    }

    pub fn can(&self, kind: ActionKind) -> bool {
        self.actions.iter().any(|a| a.kind == kind)
    }

    pub fn pending_lines(&self) -> impl Iterator<Item = &LineView> {
        self.lines.iter().filter(|l| l.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleetops_core::{SiteId, UserId};
    use fleetops_requisitions::{Action, NewLine, NewRequisition, Priority, create, transition};

    fn pending(requesting: SiteId) -> Requisition {
        create(
            RequisitionId::generate(),
            NewRequisition {
                requisition_no: "REQ-9".into(),
                requesting_site: requesting,
                priority: Priority::High,
                items: vec![NewLine {
                    item_id: ItemId::new(),
                    unit_id: UnitId::new(),
                    quantity: 4,
                }],
                notes: None,
            },
            UserId::new(),
            Utc::now(),
        )
        .unwrap()
        .requisition
    }

    #[test]
    fn admin_sees_forward_on_a_pending_requisition() {
        let requisition = pending(SiteId::new());
        let view = RequisitionView::project(&requisition, &Actor::admin(UserId::new()));

        assert_eq!(view.status_label, "Pending");
        assert_eq!(view.priority, "high");
        assert!(view.can(ActionKind::Forward));
        assert!(!view.can(ActionKind::Issue));
        assert_eq!(view.pending_lines().count(), 1);
    }

    #[test]
    fn requesting_site_has_nothing_to_do_while_pending() {
        let site = SiteId::new();
        let requisition = pending(site);
        let view = RequisitionView::project(&requisition, &Actor::site_user(UserId::new(), site));
        assert!(view.actions.is_empty());
    }

    #[test]
    fn destination_sees_respond_and_reject_after_forwarding() {
        let destination = SiteId::new();
        let forwarded = transition(
            &pending(SiteId::new()),
            Action::Forward {
                to_site: destination,
                notes: None,
            },
            Actor::admin(UserId::new()),
            Utc::now(),
        )
        .unwrap()
        .requisition;

        let view = RequisitionView::project(
            &forwarded,
            &Actor::site_user(UserId::new(), destination),
        );
        let kinds: Vec<_> = view.actions.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Respond, ActionKind::Reject]);
        assert_eq!(view.actions[0].path_segment, "respond");
    }
}
