use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rollcall_core::{DomainError, PrincipalId};

use crate::{ApprovalState, Role};

/// Opaque identity token issued by the identity backend.
///
/// Never printed: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityToken(String);

impl IdentityToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("IdentityToken(<redacted>)")
    }
}

/// Where a principal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalOrigin {
    /// Resolved through the identity backend.
    #[default]
    Backend,
    /// Loaded from the local demo store.
    Demo,
}

/// Role and approval of an identified principal, as far as it is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Standing {
    /// Profile lookup still in flight.
    Unknown,
    /// Profile lookup finished without a profile.
    Missing,
    Known { role: Role, approval: ApprovalState },
}

/// The caller, as seen by the access guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub token: Option<IdentityToken>,
    pub standing: Standing,
    pub origin: PrincipalOrigin,
}

impl Principal {
    /// No identity token. Never satisfies any requirement.
    pub fn anonymous() -> Self {
        Self {
            token: None,
            standing: Standing::Missing,
            origin: PrincipalOrigin::Backend,
        }
    }

    /// Token known, role not resolved yet.
    pub fn authenticated(token: IdentityToken) -> Self {
        Self {
            token: Some(token),
            standing: Standing::Unknown,
            origin: PrincipalOrigin::Backend,
        }
    }

    /// Principal read from the local demo store.
    pub fn demo(token: IdentityToken, role: Role, approval: ApprovalState) -> Self {
        Self {
            token: Some(token),
            standing: Standing::Known { role, approval },
            origin: PrincipalOrigin::Demo,
        }
    }

    pub fn with_standing(mut self, role: Role, approval: ApprovalState) -> Self {
        self.standing = Standing::Known { role, approval };
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        match self.standing {
            Standing::Known { role, .. } => Some(role),
            Standing::Unknown | Standing::Missing => None,
        }
    }

    pub fn approval(&self) -> Option<ApprovalState> {
        match self.standing {
            Standing::Known { approval, .. } => Some(approval),
            Standing::Unknown | Standing::Missing => None,
        }
    }
}

/// A profile row as stored by the identity backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProfileRow")]
pub struct UserProfile {
    pub id: PrincipalId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(rename = "approval_status")]
    pub approval: ApprovalState,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn standing(&self) -> Standing {
        Standing::Known {
            role: self.role,
            approval: self.approval,
        }
    }
}

/// Wire shape of a profile row.
///
/// Older rows carry a boolean `approved`; newer ones carry `approval_status`,
/// which wins when both are present. Rows with neither are treated as pending.
#[derive(Deserialize)]
struct ProfileRow {
    id: PrincipalId,
    email: String,
    #[serde(default)]
    full_name: String,
    role: String,
    #[serde(default)]
    approved: Option<bool>,
    #[serde(default)]
    approval_status: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = DomainError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let role = row.role.parse()?;
        let approval = match (row.approval_status.as_deref(), row.approved) {
            (Some(status), _) => status.parse()?,
            (None, Some(flag)) => ApprovalState::from_flag(flag),
            (None, None) => ApprovalState::Pending,
        };

        Ok(Self {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            role,
            approval,
            created_at: row.created_at,
        })
    }
}
