//! Stores and cross-store orchestration behind the HTTP handlers.
//!
//! Workflow aggregates (requisitions, transfers, procurements) go through the
//! [`CommandDispatcher`] so every change lands in the audit log; their latest
//! state is then projected into an [`InMemoryStore`] for listing. Stock side
//! effects are staged on the [`StockLedger`] before the append and reversed
//! if the append fails. Workflow writes hold one lock from load to upsert.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use fleetops_catalog::{Item, ItemGroup, Machine, Reference, Site, Unit, User};
use fleetops_core::{Actor, Aggregate, DomainError, DomainResult, Entity, ItemId, SiteId, UnitId};
use fleetops_inventory::InventoryAdjustment;
use fleetops_infra::{
    CommandDispatcher, Decision, DispatchError, InMemoryEventStore, InMemoryStore, KeyValueStore,
    StockLedger, StoreError, StoredEvent,
};
use fleetops_machines::{
    LogbookEntry, LogbookEntryId, MachineTransfer, RequestTransfer, TransferCommand,
    TransferDecision, TransferEvent, TransferId, TransferStatus,
};
use fleetops_purchasing::{
    Approve, CreateProcurement, NewPaymentSlip, PaymentId, PaymentSlip, Procurement,
    ProcurementCommand, ProcurementId, ReceiveGoods,
};
use fleetops_requisitions::{
    Action, CreateRequisition, NewRequisition, Requisition, RequisitionCommand, RequisitionId,
    TransitionCommand,
};

use crate::app::dto::NewProcurement;

pub type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>>;

pub const REQUISITION_STREAM: &str = "requisitions.requisition";
pub const TRANSFER_STREAM: &str = "machines.transfer";
pub const PROCUREMENT_STREAM: &str = "purchasing.procurement";

/// Lifecycle step on an existing transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    Approve,
    Reject,
    Complete,
}

impl TransferStep {
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Lifecycle step on an existing procurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcurementStep {
    Approve,
    Receive,
}

impl ProcurementStep {
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "approve" => Some(Self::Approve),
            "receive" => Some(Self::Receive),
            _ => None,
        }
    }
}

pub struct AppServices {
    dispatcher: Dispatcher,
    /// Serialises workflow writes: unique numbers, and the log, stock and
    /// read models moving together per command.
    writes: Mutex<()>,

    requisitions: InMemoryStore<RequisitionId, Requisition>,
    transfers: InMemoryStore<TransferId, MachineTransfer>,
    procurements: InMemoryStore<ProcurementId, Procurement>,
    payments: InMemoryStore<PaymentId, PaymentSlip>,
    logbook: InMemoryStore<LogbookEntryId, LogbookEntry>,
    stock: StockLedger,

    units: InMemoryStore<UnitId, Unit>,
    item_groups: InMemoryStore<fleetops_core::ItemGroupId, ItemGroup>,
    items: InMemoryStore<ItemId, Item>,
    sites: InMemoryStore<SiteId, Site>,
    users: InMemoryStore<fleetops_core::UserId, User>,
    machines: InMemoryStore<fleetops_core::MachineId, Machine>,
}

/// Typed access to the store holding one kind of reference record.
pub trait ReferenceStore<R: Reference> {
    fn references(&self) -> &InMemoryStore<R::Id, R>;
}

macro_rules! reference_store {
    ($ty:ty, $field:ident) => {
        impl ReferenceStore<$ty> for AppServices {
            fn references(&self) -> &InMemoryStore<<$ty as Entity>::Id, $ty> {
                &self.$field
            }
        }
    };
}

reference_store!(Unit, units);
reference_store!(ItemGroup, item_groups);
reference_store!(Item, items);
reference_store!(Site, sites);
reference_store!(User, users);
reference_store!(Machine, machines);

fn store_error(err: StoreError) -> DomainError {
    match err {
        StoreError::Duplicate(what) => DomainError::conflict(format!("{what} already exists")),
        StoreError::Poisoned => DomainError::invariant("store lock poisoned"),
    }
}

fn same_number(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn requisition_factory(id: fleetops_core::AggregateId) -> Requisition {
    Requisition::empty(RequisitionId::new(id))
}

fn transfer_factory(id: fleetops_core::AggregateId) -> MachineTransfer {
    MachineTransfer::empty(TransferId::new(id))
}

fn procurement_factory(id: fleetops_core::AggregateId) -> Procurement {
    Procurement::empty(ProcurementId::new(id))
}

impl Default for AppServices {
    fn default() -> Self {
        Self::new()
    }
}

impl AppServices {
    pub fn new() -> Self {
        Self {
            dispatcher: CommandDispatcher::new(Arc::new(InMemoryEventStore::new())),
            writes: Mutex::new(()),
            requisitions: InMemoryStore::new(),
            transfers: InMemoryStore::new(),
            procurements: InMemoryStore::new(),
            payments: InMemoryStore::new(),
            logbook: InMemoryStore::new(),
            stock: StockLedger::new(),
            units: InMemoryStore::new(),
            item_groups: InMemoryStore::new(),
            items: InMemoryStore::new(),
            sites: InMemoryStore::new(),
            users: InMemoryStore::new(),
            machines: InMemoryStore::new(),
        }
    }

    pub fn stock(&self) -> &StockLedger {
        &self.stock
    }

    fn writes(&self) -> DomainResult<MutexGuard<'_, ()>> {
        self.writes
            .lock()
            .map_err(|_| DomainError::invariant("write lock poisoned"))
    }

    /// Apply a decision's stock adjustments, append its events, and undo the
    /// adjustments if the append is refused.
    fn commit_with_stock<A>(
        &self,
        decision: Decision<A>,
        adjustments: &[InventoryAdjustment],
        at: DateTime<Utc>,
    ) -> Result<fleetops_infra::Dispatched<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: fleetops_events::Event + serde::Serialize,
    {
        self.stock.apply_batch(adjustments, at)?;
        match self.dispatcher.commit(decision) {
            Ok(dispatched) => Ok(dispatched),
            Err(err) => {
                let undo: Vec<InventoryAdjustment> = adjustments
                    .iter()
                    .map(|a| InventoryAdjustment {
                        delta: -a.delta,
                        ..a.clone()
                    })
                    .collect();
                if let Err(undo_err) = self.stock.apply_batch(&undo, at) {
                    tracing::error!(error = %undo_err, "failed to reverse staged stock adjustments");
                }
                Err(err)
            }
        }
    }

    pub fn site(&self, id: SiteId) -> Option<Site> {
        self.sites.get(&id)
    }

    pub fn item(&self, id: ItemId) -> Option<Item> {
        self.items.get(&id)
    }

    fn known_site(&self, id: SiteId) -> DomainResult<Site> {
        self.sites
            .get(&id)
            .ok_or_else(|| DomainError::validation(format!("unknown site {id}")))
    }

    fn known_item(&self, id: ItemId) -> DomainResult<Item> {
        self.items
            .get(&id)
            .ok_or_else(|| DomainError::validation(format!("unknown item {id}")))
    }

    fn known_unit(&self, id: UnitId) -> DomainResult<Unit> {
        self.units
            .get(&id)
            .ok_or_else(|| DomainError::validation(format!("unknown unit {id}")))
    }

    // -------------------------
    // Requisitions
    // -------------------------

    pub fn requisitions(&self) -> Vec<Requisition> {
        self.requisitions.list()
    }

    pub fn requisition(&self, id: RequisitionId) -> Option<Requisition> {
        self.requisitions.get(&id)
    }

    pub fn requisition_events(&self, id: RequisitionId) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.history(id.0)
    }

    pub fn create_requisition(
        &self,
        new: NewRequisition,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<Requisition, DispatchError> {
        self.known_site(new.requesting_site)?;
        for line in &new.items {
            self.known_item(line.item_id)?;
            self.known_unit(line.unit_id)?;
        }

        let _writes = self.writes()?;
        if self
            .requisitions
            .list()
            .iter()
            .any(|r| same_number(r.requisition_no(), &new.requisition_no))
        {
            return Err(DomainError::conflict(format!(
                "requisition number {} already exists",
                new.requisition_no.trim()
            ))
            .into());
        }

        let id = RequisitionId::generate();
        let command = RequisitionCommand::Create(CreateRequisition {
            id,
            new,
            prepared_by: actor.user_id,
            occurred_at: at,
        });
        let dispatched =
            self.dispatcher
                .dispatch(id.0, REQUISITION_STREAM, command, requisition_factory)?;
        let requisition = dispatched.aggregate;

        self.requisitions
            .insert_unique(id, requisition.clone(), &|a, b| {
                same_number(a.requisition_no(), b.requisition_no())
            })
            .map_err(store_error)?;

        tracing::info!(
            requisition_id = %id,
            requisition_no = requisition.requisition_no(),
            "requisition created"
        );
        Ok(requisition)
    }

    pub fn transition_requisition(
        &self,
        id: RequisitionId,
        action: Action,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Result<Requisition, DispatchError> {
        if let Action::Forward { to_site, .. } | Action::ForwardRemaining { to_site, .. } = &action {
            self.known_site(*to_site)?;
        }

        let kind = action.kind();
        let command = RequisitionCommand::Transition(TransitionCommand {
            action,
            actor,
            occurred_at: at,
        });

        let _writes = self.writes()?;
        let decision =
            self.dispatcher
                .decide(id.0, REQUISITION_STREAM, command, requisition_factory)?;
        if decision.events.is_empty() {
            tracing::debug!(requisition_id = %id, action = %kind, "transition changed nothing");
            return Ok(decision.aggregate);
        }

        let adjustments: Vec<_> = decision
            .events
            .iter()
            .flat_map(|e| e.adjustments().iter().cloned())
            .collect();
        let requisition = self.commit_with_stock(decision, &adjustments, at)?.aggregate;
        self.requisitions.upsert(id, requisition.clone());

        tracing::info!(
            requisition_id = %id,
            action = %kind,
            status = %requisition.status(),
            adjustments = adjustments.len(),
            "requisition transitioned"
        );
        Ok(requisition)
    }

    // -------------------------
    // Logbook
    // -------------------------

    pub fn machine(&self, id: fleetops_core::MachineId) -> Option<Machine> {
        self.machines.get(&id)
    }

    pub fn logbook(&self) -> Vec<LogbookEntry> {
        self.logbook.list()
    }

    pub fn logbook_entry(&self, id: LogbookEntryId) -> Option<LogbookEntry> {
        self.logbook.get(&id)
    }

    pub fn record_logbook(&self, entry: LogbookEntry) -> DomainResult<LogbookEntry> {
        self.logbook
            .insert_unique(entry.id, entry.clone(), &|a, b| {
                a.machine_id == b.machine_id && a.date == b.date
            })
            .map_err(|_| {
                DomainError::conflict(format!(
                    "machine {} already has a logbook entry for {}",
                    entry.machine_id, entry.date
                ))
            })?;
        tracing::info!(
            entry_id = %entry.id,
            machine_id = %entry.machine_id,
            diesel_used = entry.figures.diesel_used,
            "logbook entry recorded"
        );
        Ok(entry)
    }

    // -------------------------
    // Machine transfers
    // -------------------------

    pub fn transfers(&self) -> Vec<MachineTransfer> {
        self.transfers.list()
    }

    pub fn transfer(&self, id: TransferId) -> Option<MachineTransfer> {
        self.transfers.get(&id)
    }

    pub fn request_transfer(
        &self,
        request: RequestTransfer,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Result<MachineTransfer, DispatchError> {
        let machine = self.machines.get(&request.machine_id).ok_or_else(|| {
            DomainError::validation(format!("unknown machine {}", request.machine_id))
        })?;
        self.known_site(request.from_site)?;
        self.known_site(request.to_site)?;
        if machine.site_id != Some(request.from_site) {
            return Err(DomainError::validation(format!(
                "machine {} is not at site {}",
                machine.registration_no, request.from_site
            ))
            .into());
        }

        let _writes = self.writes()?;
        let open = self.transfers.list().into_iter().any(|t| {
            t.machine_id() == Some(request.machine_id)
                && matches!(t.status(), TransferStatus::Pending | TransferStatus::Approved)
        });
        if open {
            return Err(DomainError::conflict(format!(
                "machine {} already has an open transfer",
                machine.registration_no
            ))
            .into());
        }

        let id = TransferId::generate();
        let command = TransferCommand::Request {
            request,
            actor,
            occurred_at: at,
        };
        let dispatched = self
            .dispatcher
            .dispatch(id.0, TRANSFER_STREAM, command, transfer_factory)?;
        self.transfers.upsert(id, dispatched.aggregate.clone());

        tracing::info!(transfer_id = %id, machine_id = %machine.id, "machine transfer requested");
        Ok(dispatched.aggregate)
    }

    pub fn advance_transfer(
        &self,
        id: TransferId,
        step: TransferStep,
        decision: TransferDecision,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Result<MachineTransfer, DispatchError> {
        let command = match step {
            TransferStep::Approve => TransferCommand::Approve {
                decision,
                actor,
                occurred_at: at,
            },
            TransferStep::Reject => TransferCommand::Reject {
                decision,
                actor,
                occurred_at: at,
            },
            TransferStep::Complete => TransferCommand::Complete {
                decision,
                actor,
                occurred_at: at,
            },
        };
        let _writes = self.writes()?;
        let dispatched = self
            .dispatcher
            .dispatch(id.0, TRANSFER_STREAM, command, transfer_factory)?;

        for event in &dispatched.events {
            if let TransferEvent::Completed {
                machine_id,
                to_site,
                ..
            } = event
            {
                if let Some(mut machine) = self.machines.get(machine_id) {
                    machine.site_id = Some(*to_site);
                    self.machines.upsert(*machine_id, machine);
                }
                tracing::info!(%machine_id, %to_site, "machine moved");
            }
        }
        self.transfers.upsert(id, dispatched.aggregate.clone());

        tracing::info!(transfer_id = %id, status = dispatched.aggregate.status().as_str(), "machine transfer updated");
        Ok(dispatched.aggregate)
    }

    // -------------------------
    // Procurements & payments
    // -------------------------

    pub fn procurements(&self) -> Vec<Procurement> {
        self.procurements.list()
    }

    pub fn procurement(&self, id: ProcurementId) -> Option<Procurement> {
        self.procurements.get(&id)
    }

    pub fn create_procurement(
        &self,
        new: NewProcurement,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Result<Procurement, DispatchError> {
        self.known_site(new.site_id)?;
        for line in &new.lines {
            self.known_item(line.item_id)?;
        }
        if let Some(requisition_id) = new.requisition_id {
            if self.requisitions.get(&requisition_id).is_none() {
                return Err(DomainError::validation(format!(
                    "unknown requisition {requisition_id}"
                ))
                .into());
            }
        }

        let _writes = self.writes()?;
        if self
            .procurements
            .list()
            .iter()
            .any(|p| same_number(p.procurement_no(), &new.procurement_no))
        {
            return Err(DomainError::conflict(format!(
                "procurement number {} already exists",
                new.procurement_no.trim()
            ))
            .into());
        }

        let id = ProcurementId::generate();
        let command = ProcurementCommand::CreateProcurement(CreateProcurement {
            procurement_id: id,
            procurement_no: new.procurement_no,
            vendor: new.vendor,
            site_id: new.site_id,
            requisition_id: new.requisition_id.map(|r| r.0),
            lines: new.lines,
            notes: new.notes,
            actor,
            occurred_at: at,
        });
        let dispatched =
            self.dispatcher
                .dispatch(id.0, PROCUREMENT_STREAM, command, procurement_factory)?;
        self.procurements.upsert(id, dispatched.aggregate.clone());

        tracing::info!(
            procurement_id = %id,
            procurement_no = dispatched.aggregate.procurement_no(),
            "procurement created"
        );
        Ok(dispatched.aggregate)
    }

    pub fn advance_procurement(
        &self,
        id: ProcurementId,
        step: ProcurementStep,
        notes: Option<String>,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Result<Procurement, DispatchError> {
        let command = match step {
            ProcurementStep::Approve => ProcurementCommand::Approve(Approve {
                procurement_id: id,
                actor,
                notes,
                occurred_at: at,
            }),
            ProcurementStep::Receive => ProcurementCommand::ReceiveGoods(ReceiveGoods {
                procurement_id: id,
                actor,
                notes,
                occurred_at: at,
            }),
        };
        let _writes = self.writes()?;
        let decision =
            self.dispatcher
                .decide(id.0, PROCUREMENT_STREAM, command, procurement_factory)?;
        let adjustments: Vec<_> = decision
            .events
            .iter()
            .flat_map(|e| e.adjustments().iter().cloned())
            .collect();
        let dispatched = self.commit_with_stock(decision, &adjustments, at)?;
        self.procurements.upsert(id, dispatched.aggregate.clone());

        tracing::info!(
            procurement_id = %id,
            status = dispatched.aggregate.status().as_str(),
            adjustments = adjustments.len(),
            "procurement updated"
        );
        Ok(dispatched.aggregate)
    }

    pub fn payments(&self) -> Vec<PaymentSlip> {
        self.payments.list()
    }

    pub fn payment(&self, id: PaymentId) -> Option<PaymentSlip> {
        self.payments.get(&id)
    }

    pub fn record_payment(
        &self,
        new: NewPaymentSlip,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> DomainResult<PaymentSlip> {
        let _writes = self.writes()?;
        let procurement = self.procurements.get(&new.procurement_id).ok_or_else(|| {
            DomainError::validation(format!("unknown procurement {}", new.procurement_id))
        })?;
        let already_paid: i64 = self
            .payments
            .list()
            .iter()
            .filter(|p| p.procurement_id == new.procurement_id)
            .map(|p| p.amount)
            .sum();

        let slip = PaymentSlip::record(
            PaymentId::generate(),
            new,
            &procurement,
            already_paid,
            actor.user_id,
            at,
        )?;
        self.payments
            .insert_unique(slip.id, slip.clone(), &|a, b| same_number(&a.slip_no, &b.slip_no))
            .map_err(|_| {
                DomainError::conflict(format!("payment slip {} already exists", slip.slip_no))
            })?;

        tracing::info!(
            payment_id = %slip.id,
            procurement_id = %slip.procurement_id,
            amount = slip.amount,
            "payment recorded"
        );
        Ok(slip)
    }

    /// Load a small reference data set for local runs.
    pub fn seed_demo(&self) {
        let sites = [
            ("Central Store", "HQ", "Colombo"),
            ("Kandy Road Site", "KRS", "Kadawatha"),
            ("Southern Bypass Site", "SBS", "Galle"),
        ]
        .map(|(name, code, location)| Site {
            id: SiteId::new(),
            name: name.into(),
            code: code.into(),
            location: location.into(),
        });
        for site in &sites {
            self.sites.upsert(site.id, site.clone());
        }

        let bags = Unit {
            id: UnitId::new(),
            name: "Bags".into(),
            symbol: "bag".into(),
        };
        let litres = Unit {
            id: UnitId::new(),
            name: "Litres".into(),
            symbol: "l".into(),
        };
        let materials = ItemGroup {
            id: fleetops_core::ItemGroupId::new(),
            name: "Building materials".into(),
        };
        let fuel = ItemGroup {
            id: fleetops_core::ItemGroupId::new(),
            name: "Fuel".into(),
        };
        let items = [
            ("Cement 50kg", "CEM-50", &materials, &bags),
            ("Diesel", "DSL", &fuel, &litres),
        ]
        .map(|(name, code, group, unit)| Item {
            id: ItemId::new(),
            name: name.into(),
            code: code.into(),
            group_id: Some(group.id),
            unit_id: Some(unit.id),
            description: String::new(),
        });

        for unit in [bags, litres] {
            self.units.upsert(unit.id, unit);
        }
        for group in [materials, fuel] {
            self.item_groups.upsert(group.id, group);
        }
        for item in &items {
            self.items.upsert(item.id, item.clone());
        }

        let excavator = Machine {
            id: fleetops_core::MachineId::new(),
            name: "CAT 320 Excavator".into(),
            registration_no: "WP CAA-1234".into(),
            kind: "excavator".into(),
            site_id: Some(sites[1].id),
        };
        self.machines.upsert(excavator.id, excavator);

        tracing::info!(
            sites = sites.len(),
            items = items.len(),
            "demo reference data loaded"
        );
    }
}
