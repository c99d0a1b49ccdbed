use thiserror::Error;

use fleetops_core::DomainError;

use crate::action::{ActionKind, Party};
use crate::model::RequisitionStatus;

/// Why an action is not legal right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IllegalReason {
    /// The action does not apply to the current status.
    WrongState,
    /// The status is right but the actor does not play one of these parts.
    RoleNotPermitted(Vec<Party>),
}

impl core::fmt::Display for IllegalReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IllegalReason::WrongState => f.write_str("not allowed in this state"),
            IllegalReason::RoleNotPermitted(parties) => {
                f.write_str("only ")?;
                for (i, party) in parties.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{party}")?;
                }
                f.write_str(" may do this")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} a {status} requisition: {reason}")]
    IllegalTransition {
        action: ActionKind,
        status: RequisitionStatus,
        reason: IllegalReason,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("requisition not found")]
    NotFound,

    #[error("requisition already exists")]
    AlreadyExists,
}

impl TransitionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_role_error(&self) -> bool {
        matches!(
            self,
            TransitionError::IllegalTransition {
                reason: IllegalReason::RoleNotPermitted(_),
                ..
            }
        )
    }
}

impl From<TransitionError> for DomainError {
    fn from(err: TransitionError) -> Self {
        match &err {
            TransitionError::IllegalTransition {
                reason: IllegalReason::WrongState,
                ..
            } => DomainError::conflict(err.to_string()),
            TransitionError::IllegalTransition { .. } => DomainError::unauthorized(err.to_string()),
            TransitionError::Validation(msg) => DomainError::validation(msg.clone()),
            TransitionError::NotFound => DomainError::not_found(),
            TransitionError::AlreadyExists => DomainError::conflict(err.to_string()),
        }
    }
}
