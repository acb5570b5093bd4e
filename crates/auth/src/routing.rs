//! Navigation on top of the guard: home redirect, then authorization.

use serde::Serialize;

use crate::{Decision, Destination, GuardPolicy, SessionState};

/// What to do with a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "destination", rename_all = "snake_case")]
pub enum Navigation {
    Render(Destination),
    Redirect(Destination),
    /// Render the "waiting for approval" notice in place of the destination.
    PendingNotice(Destination),
    /// Render a loading indicator.
    Loading,
}

/// Dashboard to send an approved principal to when they land on the entry page.
///
/// Only applies when `current` is exactly [`Destination::Entry`]; navigation
/// to any other destination is never overridden.
pub fn home_redirect(state: &SessionState, current: Destination) -> Option<Destination> {
    if current != Destination::Entry {
        return None;
    }
    let profile = state.profile()?;
    if !profile.approval.is_approved() {
        return None;
    }
    Some(Destination::dashboard_for(profile.role))
}

/// Resolve a navigation to `path` for the current session.
pub fn navigate(state: &SessionState, path: &str, policy: &GuardPolicy) -> Navigation {
    let destination = Destination::from_path(path);

    if let Some(home) = home_redirect(state, destination) {
        tracing::debug!(from = %destination, to = %home, "redirecting to role dashboard");
        return Navigation::Redirect(home);
    }

    let Some(requirement) = destination.requirement() else {
        return Navigation::Render(destination);
    };

    match state.decide(&requirement, policy) {
        Decision::Allow => Navigation::Render(destination),
        Decision::RedirectToHome => Navigation::Redirect(Destination::Entry),
        Decision::ShowPendingNotice => Navigation::PendingNotice(destination),
        Decision::Pending => Navigation::Loading,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use rollcall_core::PrincipalId;

    use super::*;
    use crate::{ApprovalState, IdentityToken, ProfileState, Role, Session, UserProfile};

    fn signed_in(role: Role, approval: ApprovalState) -> SessionState {
        let id = PrincipalId::new();
        SessionState::Authenticated {
            session: Session::new(id, IdentityToken::new("tok")),
            profile: ProfileState::RoleKnown(UserProfile {
                id,
                email: "someone@example.edu".to_string(),
                full_name: "Someone".to_string(),
                role,
                approval,
                created_at: Utc::now(),
            }),
        }
    }

    #[test]
    fn approved_principal_on_entry_goes_to_dashboard() {
        let state = signed_in(Role::Teacher, ApprovalState::Approved);
        assert_eq!(
            navigate(&state, "/", &GuardPolicy::default()),
            Navigation::Redirect(Destination::TeacherDashboard)
        );
    }

    #[test]
    fn home_redirect_never_overrides_other_destinations() {
        let state = signed_in(Role::Student, ApprovalState::Approved);
        assert_eq!(home_redirect(&state, Destination::StudentDashboard), None);
        assert_eq!(home_redirect(&state, Destination::NotFound), None);
        assert_eq!(
            navigate(&state, "/student", &GuardPolicy::default()),
            Navigation::Render(Destination::StudentDashboard)
        );
    }

    #[test]
    fn pending_principal_stays_on_entry() {
        let state = signed_in(Role::Student, ApprovalState::Pending);
        assert_eq!(home_redirect(&state, Destination::Entry), None);
        assert_eq!(
            navigate(&state, "/", &GuardPolicy::default()),
            Navigation::Render(Destination::Entry)
        );
        assert_eq!(
            navigate(&state, "/student", &GuardPolicy::default()),
            Navigation::PendingNotice(Destination::StudentDashboard)
        );
    }

    #[test]
    fn loading_session_shows_loader_on_guarded_pages_only() {
        let state = SessionState::Loading;
        assert_eq!(navigate(&state, "/admin", &GuardPolicy::default()), Navigation::Loading);
        assert_eq!(
            navigate(&state, "/", &GuardPolicy::default()),
            Navigation::Render(Destination::Entry)
        );
    }

    #[test]
    fn anonymous_is_bounced_from_dashboards() {
        assert_eq!(
            navigate(&SessionState::Anonymous, "/teacher", &GuardPolicy::default()),
            Navigation::Redirect(Destination::Entry)
        );
    }

    #[test]
    fn unknown_paths_render_not_found() {
        let state = signed_in(Role::Admin, ApprovalState::Approved);
        assert_eq!(
            navigate(&state, "/fees", &GuardPolicy::default()),
            Navigation::Render(Destination::NotFound)
        );
    }
}
