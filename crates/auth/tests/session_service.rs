use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use rollcall_auth::{
    ApprovalState, Decision, Destination, GuardPolicy, IdentityToken, InMemoryIdentityProvider,
    ProfileState, Role, RouteRequirement, Session, SessionConfig, SessionError, SessionService,
    SessionState, UserProfile,
};
use rollcall_core::{PrincipalId, Scope};

fn config() -> SessionConfig {
    SessionConfig::default().with_retry_delay(Duration::from_millis(1))
}

fn profile(id: PrincipalId, role: Role, approval: ApprovalState) -> UserProfile {
    UserProfile {
        id,
        email: format!("{role}@example.edu"),
        full_name: format!("Test {role}"),
        role,
        approval,
        created_at: Utc::now(),
    }
}

/// Provider with a signed-in user holding the given role.
fn provider_with(role: Role, approval: ApprovalState) -> (Arc<InMemoryIdentityProvider>, Session) {
    let id = PrincipalId::new();
    let session = Session::new(id, IdentityToken::new(format!("token-{id}")));
    let provider = InMemoryIdentityProvider::new().with_session(session.clone());
    provider.insert_profile(&profile(id, role, approval));
    (Arc::new(provider), session)
}

async fn wait_until(
    service: &SessionService,
    mut pred: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    let mut rx = service.watch();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
        .await
        .expect("session never reached the expected state")
        .expect("session service dropped its state")
        .clone();
    state
}

#[tokio::test]
async fn starts_loading_and_settles_anonymous_without_session() {
    let provider = Arc::new(InMemoryIdentityProvider::new());
    let service = SessionService::start(provider.clone(), config());

    assert_eq!(service.state(), SessionState::Loading);
    assert_eq!(
        service.decision(&RouteRequirement::only(Role::Student), &GuardPolicy::default()),
        Decision::Pending
    );

    let settled = service.settled().await.unwrap();
    assert_eq!(settled, SessionState::Anonymous);
    assert_eq!(
        settled.decide(&RouteRequirement::only(Role::Student), &GuardPolicy::default()),
        Decision::RedirectToHome
    );
}

#[tokio::test]
async fn approved_student_is_allowed_once_settled() {
    let (provider, session) = provider_with(Role::Student, ApprovalState::Approved);
    let service = SessionService::start(provider, config());

    let settled = service.settled().await.unwrap();
    assert_eq!(settled.token(), Some(&session.token));
    assert_eq!(settled.profile().map(|p| p.role), Some(Role::Student));

    let decision = service
        .decide(&RouteRequirement::only(Role::Student), &GuardPolicy::default(), &Scope::new())
        .await;
    assert_eq!(decision, Some(Decision::Allow));
}

#[tokio::test]
async fn pending_teacher_gets_notice_and_pending_admin_bypasses() {
    let (teacher, _) = provider_with(Role::Teacher, ApprovalState::Pending);
    let service = SessionService::start(teacher, config());
    service.settled().await.unwrap();
    assert_eq!(
        service.decision(&RouteRequirement::only(Role::Teacher), &GuardPolicy::default()),
        Decision::ShowPendingNotice
    );

    let (admin, _) = provider_with(Role::Admin, ApprovalState::Pending);
    let service = SessionService::start(admin, config());
    service.settled().await.unwrap();
    assert_eq!(
        service.decision(&RouteRequirement::only(Role::Admin), &GuardPolicy::default()),
        Decision::Allow
    );
}

#[tokio::test]
async fn role_lookup_in_flight_is_pending() {
    let (provider, _) = provider_with(Role::Student, ApprovalState::Approved);
    provider.set_profile_delay(Duration::from_millis(200));
    let service = SessionService::start(provider, config());

    wait_until(&service, |s| {
        matches!(s, SessionState::Authenticated { profile: ProfileState::RoleUnknown, .. })
    })
    .await;

    assert_eq!(
        service.decision(&RouteRequirement::only(Role::Student), &GuardPolicy::default()),
        Decision::Pending
    );

    let settled = service.settled().await.unwrap();
    assert_eq!(
        settled.decide(&RouteRequirement::only(Role::Student), &GuardPolicy::default()),
        Decision::Allow
    );
}

#[tokio::test]
async fn transient_session_failures_are_retried() {
    let (provider, _) = provider_with(Role::Student, ApprovalState::Approved);
    provider.fail_session_lookups(2);
    let service = SessionService::start(provider.clone(), config());

    let settled = service.settled().await.unwrap();
    assert!(settled.profile().is_some());
    assert_eq!(provider.session_lookups(), 3);
}

#[tokio::test]
async fn exhausted_session_lookup_is_anonymous() {
    let (provider, _) = provider_with(Role::Student, ApprovalState::Approved);
    provider.fail_session_lookups(10);
    let service = SessionService::start(provider.clone(), config().with_lookup_attempts(3));

    assert_eq!(service.settled().await.unwrap(), SessionState::Anonymous);
    assert_eq!(provider.session_lookups(), 3);
}

#[tokio::test]
async fn exhausted_profile_lookup_is_missing_and_denied() {
    let (provider, _) = provider_with(Role::Teacher, ApprovalState::Approved);
    provider.fail_profile_lookups(10);
    let service = SessionService::start(provider, config());

    let settled = service.settled().await.unwrap();
    assert!(matches!(
        settled,
        SessionState::Authenticated { profile: ProfileState::Missing, .. }
    ));
    assert_eq!(
        settled.decide(&RouteRequirement::only(Role::Teacher), &GuardPolicy::default()),
        Decision::RedirectToHome
    );
}

#[tokio::test]
async fn sign_in_event_resolves_new_principal() {
    let provider = Arc::new(InMemoryIdentityProvider::new());
    let service = SessionService::start(provider.clone(), config());
    assert_eq!(service.settled().await.unwrap(), SessionState::Anonymous);

    let id = PrincipalId::new();
    provider.insert_profile(&profile(id, Role::Admin, ApprovalState::Approved));
    provider.sign_in(Session::new(id, IdentityToken::new("fresh")));

    let state = wait_until(&service, |s| s.profile().is_some()).await;
    assert_eq!(state.profile().map(|p| p.role), Some(Role::Admin));
}

#[tokio::test]
async fn profile_is_refetched_only_when_token_changes() {
    let (provider, session) = provider_with(Role::Student, ApprovalState::Pending);
    let service = SessionService::start(provider.clone(), config());
    service.settled().await.unwrap();
    assert_eq!(provider.profile_lookups(), 1);

    // Same token again: nothing to refresh.
    provider.sign_in(session.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(provider.profile_lookups(), 1);

    // Approval happened server-side; the refreshed token carries it.
    provider.insert_profile(&profile(session.user_id, Role::Student, ApprovalState::Approved));
    let refreshed = Session::new(session.user_id, IdentityToken::new("rotated"));
    provider.refresh(refreshed.clone());

    let state = wait_until(&service, |s| {
        s.token() == Some(&refreshed.token) && s.is_settled()
    })
    .await;
    assert_eq!(provider.profile_lookups(), 2);
    assert_eq!(state.profile().map(|p| p.approval), Some(ApprovalState::Approved));
}

#[tokio::test]
async fn profile_for_signed_out_session_is_discarded() {
    let (provider, _) = provider_with(Role::Student, ApprovalState::Approved);
    provider.set_profile_delay(Duration::from_millis(100));
    let service = SessionService::start(provider.clone(), config());

    wait_until(&service, |s| {
        matches!(s, SessionState::Authenticated { profile: ProfileState::RoleUnknown, .. })
    })
    .await;

    assert_eq!(service.sign_out().await, Ok(Destination::Entry));
    assert_eq!(service.state(), SessionState::Anonymous);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(service.state(), SessionState::Anonymous);
}

#[tokio::test]
async fn backend_sign_out_during_profile_lookup_lands_immediately() {
    let (provider, _) = provider_with(Role::Student, ApprovalState::Approved);
    provider.set_profile_delay(Duration::from_millis(300));
    let service = SessionService::start(provider.clone(), config());

    wait_until(&service, |s| {
        matches!(s, SessionState::Authenticated { profile: ProfileState::RoleUnknown, .. })
    })
    .await;

    provider.expire();
    tokio::time::timeout(
        Duration::from_millis(150),
        wait_until(&service, |s| *s == SessionState::Anonymous),
    )
    .await
    .expect("sign-out waited for the profile lookup");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(service.state(), SessionState::Anonymous);
    assert_eq!(
        service.decision(&RouteRequirement::only(Role::Student), &GuardPolicy::default()),
        Decision::RedirectToHome
    );
}

#[tokio::test]
async fn token_refresh_during_profile_lookup_abandons_old_answer() {
    let (provider, session) = provider_with(Role::Student, ApprovalState::Pending);
    provider.set_profile_delay(Duration::from_millis(300));
    let service = SessionService::start(provider.clone(), config());

    wait_until(&service, |s| {
        matches!(s, SessionState::Authenticated { profile: ProfileState::RoleUnknown, .. })
    })
    .await;

    provider.insert_profile(&profile(session.user_id, Role::Student, ApprovalState::Approved));
    let refreshed = Session::new(session.user_id, IdentityToken::new("rotated"));
    provider.refresh(refreshed.clone());

    tokio::time::timeout(
        Duration::from_millis(150),
        wait_until(&service, |s| {
            s.token() == Some(&refreshed.token) && !s.is_settled()
        }),
    )
    .await
    .expect("refresh waited for the profile lookup");

    let settled = service.settled().await.unwrap();
    assert_eq!(settled.token(), Some(&refreshed.token));
    assert_eq!(settled.profile().map(|p| p.approval), Some(ApprovalState::Approved));
    assert_eq!(provider.profile_lookups(), 2);
}

#[tokio::test]
async fn sign_out_clears_session_and_redirects_to_entry() {
    let (provider, _) = provider_with(Role::Teacher, ApprovalState::Approved);
    let service = SessionService::start(provider.clone(), config());
    service.settled().await.unwrap();

    let destination = service.sign_out().await.unwrap();
    assert_eq!(destination, Destination::Entry);
    assert_eq!(service.state(), SessionState::Anonymous);
    assert_eq!(provider.sign_outs(), 1);
}

#[tokio::test]
async fn cancelled_scope_discards_decision() {
    let (provider, _) = provider_with(Role::Student, ApprovalState::Approved);
    provider.set_profile_delay(Duration::from_secs(30));
    let service = SessionService::start(provider, config());

    let scope = Scope::new();
    let unmount = {
        let scope = scope.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            scope.cancel();
        }
    };

    let requirement = RouteRequirement::only(Role::Student);
    let policy = GuardPolicy::default();
    let (decision, ()) = tokio::join!(
        service.decide(&requirement, &policy, &scope),
        unmount
    );
    assert_eq!(decision, None);
}

#[tokio::test]
async fn no_state_changes_after_shutdown() {
    let provider = Arc::new(InMemoryIdentityProvider::new());
    let service = SessionService::start(provider.clone(), config());
    service.settled().await.unwrap();

    service.shutdown();
    assert!(service.is_shut_down());

    let id = PrincipalId::new();
    provider.insert_profile(&profile(id, Role::Student, ApprovalState::Approved));
    provider.sign_in(Session::new(id, IdentityToken::new("late")));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(service.state(), SessionState::Anonymous);
    assert_eq!(service.sign_out().await, Err(SessionError::Closed));
    assert_eq!(service.settled().await, Err(SessionError::Closed));
    assert_eq!(
        service
            .decide(&RouteRequirement::only(Role::Student), &GuardPolicy::default(), &Scope::new())
            .await,
        Some(Decision::RedirectToHome)
    );
}
