//! Purchasing domain module (procurements and payment slips, event-sourced).
//!
//! Business rules only: no IO, no HTTP, no storage.

pub mod payment;
pub mod procurement;

pub use payment::{NewPaymentSlip, PaymentId, PaymentMethod, PaymentSlip, format_amount};
pub use procurement::{
    AddLine, Approve, CreateProcurement, GoodsReceived, NewProcurementLine, Procurement,
    ProcurementApproved, ProcurementCommand, ProcurementCreated, ProcurementEvent, ProcurementId,
    ProcurementLine, ProcurementLineAdded, ProcurementStatus, ReceiveGoods,
};
