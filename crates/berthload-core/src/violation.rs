//! Lifecycle rule violations

use berthload_api::RequestStatus;
use berthload_util::{BerthError, RequestId};
use thiserror::Error;

/// A lifecycle rule the request's current state does not satisfy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("request {id} is {status}, not draft")]
    NotDraft { id: RequestId, status: RequestStatus },

    #[error("request {id} has no ships")]
    NoShips { id: RequestId },

    #[error("request {id} has no 20ft or 40ft containers")]
    NoContainers { id: RequestId },

    #[error("request {id} is {status}, not formed")]
    NotFormed { id: RequestId, status: RequestStatus },

    #[error("request {id} is {status} and can no longer change")]
    Terminal { id: RequestId, status: RequestStatus },
}

impl Violation {
    /// Stable machine-readable rule name
    pub fn rule(&self) -> &'static str {
        match self {
            Self::NotDraft { .. } => "request_not_draft",
            Self::NoShips { .. } => "request_has_no_ships",
            Self::NoContainers { .. } => "request_has_no_containers",
            Self::NotFormed { .. } => "request_not_formed",
            Self::Terminal { .. } => "request_is_terminal",
        }
    }
}

impl From<Violation> for BerthError {
    fn from(v: Violation) -> Self {
        BerthError::precondition(v.rule(), v.to_string())
    }
}
