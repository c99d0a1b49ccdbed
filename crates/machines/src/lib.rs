//! Machine operations: daily logbook figures and transfers between sites.

pub mod logbook;
pub mod transfer;

pub use logbook::{
    FieldErrors, LogbookEntry, LogbookEntryId, LogbookFigures, LogbookReadings, NewLogbookEntry,
    round2,
};
pub use transfer::{
    MachineTransfer, RequestTransfer, TransferCommand, TransferDecision, TransferEvent, TransferId,
    TransferStatus,
};
