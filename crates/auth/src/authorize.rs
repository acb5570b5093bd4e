use serde::{Deserialize, Serialize};

use crate::{ApprovalState, Principal, PrincipalOrigin, Role, RouteRequirement, Standing};

/// Approval-gate exceptions.
///
/// Deployments disagree on whether admins and demo principals must be approved
/// before using the portal, so both exceptions are explicit switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPolicy {
    /// Admins may enter admin destinations while pending or rejected.
    pub admin_bypasses_approval: bool,
    /// Principals from the local demo store skip the approval gate entirely.
    pub demo_skips_approval: bool,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            admin_bypasses_approval: true,
            demo_skips_approval: false,
        }
    }
}

impl GuardPolicy {
    pub fn with_admin_bypass(mut self, enabled: bool) -> Self {
        self.admin_bypasses_approval = enabled;
        self
    }

    pub fn with_demo_skip(mut self, enabled: bool) -> Self {
        self.demo_skips_approval = enabled;
        self
    }
}

/// What the caller should do with a requested destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    RedirectToHome,
    /// Identified and permitted, but still waiting for approval.
    ShowPendingNotice,
    /// Session not settled yet; render a loading indicator.
    Pending,
}

/// Why a decision was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardReason {
    SessionLoading,
    NoIdentityToken,
    RoleUnknown,
    ProfileMissing,
    RoleNotPermitted,
    Approved,
    AdminBypass,
    DemoBypass,
    ApprovalPending,
    ApprovalRejected,
}

impl GuardReason {
    pub fn decision(self) -> Decision {
        match self {
            GuardReason::SessionLoading | GuardReason::RoleUnknown => Decision::Pending,
            GuardReason::NoIdentityToken
            | GuardReason::ProfileMissing
            | GuardReason::RoleNotPermitted
            | GuardReason::ApprovalRejected => Decision::RedirectToHome,
            GuardReason::Approved | GuardReason::AdminBypass | GuardReason::DemoBypass => {
                Decision::Allow
            }
            GuardReason::ApprovalPending => Decision::ShowPendingNotice,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            GuardReason::SessionLoading | GuardReason::RoleUnknown => "Loading...",
            GuardReason::NoIdentityToken => "Please sign in to continue.",
            GuardReason::ProfileMissing => "No profile is registered for this account.",
            GuardReason::RoleNotPermitted => "Your account cannot open this page.",
            GuardReason::Approved => "Access granted.",
            GuardReason::AdminBypass => "Access granted (administrator).",
            GuardReason::DemoBypass => "Access granted (demo account).",
            GuardReason::ApprovalPending => "Your account is waiting for admin approval.",
            GuardReason::ApprovalRejected => "Your registration was not approved.",
        }
    }
}

/// Detailed explanation of a guard decision, for logs and audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationExplanation {
    pub decision: Decision,
    pub reason: GuardReason,
    pub role: Option<Role>,
    pub approval: Option<ApprovalState>,
    pub permitted_roles: Vec<Role>,
}

/// Explain the guard decision for `principal` on `requirement`.
pub fn explain(
    principal: &Principal,
    requirement: &RouteRequirement,
    policy: &GuardPolicy,
) -> AuthorizationExplanation {
    let reason = reason_for(principal, requirement, policy);
    AuthorizationExplanation {
        decision: reason.decision(),
        reason,
        role: principal.role(),
        approval: principal.approval(),
        permitted_roles: requirement.roles().collect(),
    }
}

/// Decide whether `principal` may view a destination guarded by `requirement`.
///
/// - No IO
/// - No panics
/// - Never `Allow` without an identity token and a known, permitted role
pub fn authorize(
    principal: &Principal,
    requirement: &RouteRequirement,
    policy: &GuardPolicy,
) -> Decision {
    let explanation = explain(principal, requirement, policy);
    tracing::debug!(
        decision = ?explanation.decision,
        reason = ?explanation.reason,
        role = ?explanation.role,
        "access guard evaluated"
    );
    explanation.decision
}

fn reason_for(
    principal: &Principal,
    requirement: &RouteRequirement,
    policy: &GuardPolicy,
) -> GuardReason {
    if principal.token.is_none() {
        return GuardReason::NoIdentityToken;
    }

    let (role, approval) = match principal.standing {
        Standing::Unknown => return GuardReason::RoleUnknown,
        Standing::Missing => return GuardReason::ProfileMissing,
        Standing::Known { role, approval } => (role, approval),
    };

    if !requirement.permits(role) {
        return GuardReason::RoleNotPermitted;
    }

    match approval {
        ApprovalState::Approved => GuardReason::Approved,
        _ if role == Role::Admin && policy.admin_bypasses_approval => GuardReason::AdminBypass,
        _ if principal.origin == PrincipalOrigin::Demo && policy.demo_skips_approval => {
            GuardReason::DemoBypass
        }
        ApprovalState::Pending => GuardReason::ApprovalPending,
        ApprovalState::Rejected => GuardReason::ApprovalRejected,
    }
}
