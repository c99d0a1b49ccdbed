use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetops_core::{Actor, Aggregate, AggregateId, AggregateRoot, DomainError, MachineId, SiteId, Stamp};
use fleetops_events::Event;
use fleetops_listing::Listable;

/// Machine transfer identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub AggregateId);

impl TransferId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for TransferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for TransferId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Approved => "approved",
            TransferStatus::Rejected => "rejected",
            TransferStatus::Completed => "completed",
        }
    }
}

/// Aggregate root: moving a machine from one site to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineTransfer {
    id: TransferId,
    machine_id: Option<MachineId>,
    from_site: Option<SiteId>,
    to_site: Option<SiteId>,
    status: TransferStatus,
    requested: Option<Stamp>,
    decided: Option<Stamp>,
    received: Option<Stamp>,
    version: u64,
}

impl MachineTransfer {
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            machine_id: None,
            from_site: None,
            to_site: None,
            status: TransferStatus::Pending,
            requested: None,
            decided: None,
            received: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn machine_id(&self) -> Option<MachineId> {
        self.machine_id
    }

    pub fn from_site(&self) -> Option<SiteId> {
        self.from_site
    }

    pub fn to_site(&self) -> Option<SiteId> {
        self.to_site
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn requested(&self) -> Option<&Stamp> {
        self.requested.as_ref()
    }

    pub fn decided(&self) -> Option<&Stamp> {
        self.decided.as_ref()
    }

    pub fn received(&self) -> Option<&Stamp> {
        self.received.as_ref()
    }

    fn is_created(&self) -> bool {
        self.requested.is_some()
    }
}

impl AggregateRoot for MachineTransfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Listable for MachineTransfer {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        self.requested
            .iter()
            .filter_map(|s| s.notes.as_deref())
            .map(Cow::Borrowed)
            .collect()
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "status" => Some(Cow::Borrowed(self.status.as_str())),
            "machine" => self.machine_id.map(|m| Cow::Owned(m.to_string())),
            "from_site" => self.from_site.map(|s| Cow::Owned(s.to_string())),
            "to_site" => self.to_site.map(|s| Cow::Owned(s.to_string())),
            _ => None,
        }
    }
}

/// Command: RequestTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTransfer {
    pub machine_id: MachineId,
    pub from_site: SiteId,
    pub to_site: SiteId,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Payload for approve / reject / complete.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferDecision {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    Request {
        request: RequestTransfer,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    },
    Approve {
        decision: TransferDecision,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    },
    Reject {
        decision: TransferDecision,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    },
    Complete {
        decision: TransferDecision,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferEvent {
    Requested {
        machine_id: MachineId,
        from_site: SiteId,
        to_site: SiteId,
        stamp: Stamp,
    },
    Approved {
        stamp: Stamp,
    },
    Rejected {
        stamp: Stamp,
    },
    /// The machine arrived; its home site is now `to_site`.
    Completed {
        machine_id: MachineId,
        to_site: SiteId,
        stamp: Stamp,
    },
}

impl TransferEvent {
    fn stamp(&self) -> &Stamp {
        match self {
            TransferEvent::Requested { stamp, .. }
            | TransferEvent::Approved { stamp }
            | TransferEvent::Rejected { stamp }
            | TransferEvent::Completed { stamp, .. } => stamp,
        }
    }
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::Requested { .. } => "machines.transfer.requested",
            TransferEvent::Approved { .. } => "machines.transfer.approved",
            TransferEvent::Rejected { .. } => "machines.transfer.rejected",
            TransferEvent::Completed { .. } => "machines.transfer.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.stamp().at
    }
}

impl Aggregate for MachineTransfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::Requested {
                machine_id,
                from_site,
                to_site,
                stamp,
            } => {
                self.machine_id = Some(*machine_id);
                self.from_site = Some(*from_site);
                self.to_site = Some(*to_site);
                self.status = TransferStatus::Pending;
                self.requested = Some(stamp.clone());
            }
            TransferEvent::Approved { stamp } => {
                self.status = TransferStatus::Approved;
                self.decided = Some(stamp.clone());
            }
            TransferEvent::Rejected { stamp } => {
                self.status = TransferStatus::Rejected;
                self.decided = Some(stamp.clone());
            }
            TransferEvent::Completed { stamp, .. } => {
                self.status = TransferStatus::Completed;
                self.received = Some(stamp.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::Request {
                request,
                actor,
                occurred_at,
            } => self.handle_request(request, actor, *occurred_at),
            TransferCommand::Approve {
                decision,
                actor,
                occurred_at,
            } => {
                self.ensure_decidable(actor)?;
                Ok(vec![TransferEvent::Approved {
                    stamp: Stamp::new(actor.user_id, *occurred_at, decision.notes.clone()),
                }])
            }
            TransferCommand::Reject {
                decision,
                actor,
                occurred_at,
            } => {
                self.ensure_decidable(actor)?;
                let stamp = Stamp::new(actor.user_id, *occurred_at, decision.notes.clone());
                if stamp.notes.is_none() {
                    return Err(DomainError::validation("a rejection reason is required"));
                }
                Ok(vec![TransferEvent::Rejected { stamp }])
            }
            TransferCommand::Complete {
                decision,
                actor,
                occurred_at,
            } => self.handle_complete(decision, actor, *occurred_at),
        }
    }
}

impl MachineTransfer {
    fn handle_request(
        &self,
        request: &RequestTransfer,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<Vec<TransferEvent>, DomainError> {
        if self.is_created() {
            return Err(DomainError::conflict("transfer already exists"));
        }
        if request.from_site == request.to_site {
            return Err(DomainError::validation(
                "a machine cannot be transferred to the site it is already at",
            ));
        }
        if !actor.admin && actor.site_id != Some(request.from_site) {
            return Err(DomainError::unauthorized(
                "only the sending site or an admin may request a transfer",
            ));
        }

        Ok(vec![TransferEvent::Requested {
            machine_id: request.machine_id,
            from_site: request.from_site,
            to_site: request.to_site,
            stamp: Stamp::new(actor.user_id, at, request.notes.clone()),
        }])
    }

    fn ensure_decidable(&self, actor: &Actor) -> Result<(), DomainError> {
        if !self.is_created() {
            return Err(DomainError::not_found());
        }
        if self.status != TransferStatus::Pending {
            return Err(DomainError::conflict(format!(
                "transfer is already {}",
                self.status.as_str()
            )));
        }
        if !actor.admin {
            return Err(DomainError::unauthorized(
                "only an admin may approve or reject transfers",
            ));
        }
        Ok(())
    }

    fn handle_complete(
        &self,
        decision: &TransferDecision,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<Vec<TransferEvent>, DomainError> {
        let (Some(machine_id), Some(to_site)) = (self.machine_id, self.to_site) else {
            return Err(DomainError::not_found());
        };
        if self.status != TransferStatus::Approved {
            return Err(DomainError::conflict(format!(
                "only approved transfers can be completed (transfer is {})",
                self.status.as_str()
            )));
        }
        if !actor.at_site(Some(to_site)) {
            return Err(DomainError::unauthorized(
                "only a user of the receiving site may complete a transfer",
            ));
        }

        Ok(vec![TransferEvent::Completed {
            machine_id,
            to_site,
            stamp: Stamp::new(actor.user_id, at, decision.notes.clone()),
        }])
    }
}
