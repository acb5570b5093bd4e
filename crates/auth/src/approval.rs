use core::str::FromStr;

use serde::{Deserialize, Serialize};

use rollcall_core::DomainError;

/// Registration workflow status, distinct from authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    /// Registered, waiting for an administrator.
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalState {
    /// Legacy profile rows only carry an `approved` flag; there is no way to
    /// express a rejection with it.
    pub fn from_flag(approved: bool) -> Self {
        if approved {
            ApprovalState::Approved
        } else {
            ApprovalState::Pending
        }
    }

    pub fn is_approved(&self) -> bool {
        *self == ApprovalState::Approved
    }
}

impl core::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ApprovalState::Pending => f.write_str("pending"),
            ApprovalState::Approved => f.write_str("approved"),
            ApprovalState::Rejected => f.write_str("rejected"),
        }
    }
}

impl FromStr for ApprovalState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalState::Pending),
            "approved" => Ok(ApprovalState::Approved),
            "rejected" => Ok(ApprovalState::Rejected),
            other => Err(DomainError::validation(format!("unknown approval state '{other}'"))),
        }
    }
}
