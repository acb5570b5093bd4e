//! `rollcall-auth` — access guard and session ownership for the portal.
//!
//! The guard is a pure function of the principal, the destination's
//! requirement and the approval policy. The session service is the one piece of
//! shared mutable state and is constructed explicitly around an injected
//! identity provider.

pub mod approval;
pub mod authorize;
pub mod in_memory;
pub mod principal;
pub mod requirement;
pub mod roles;
pub mod routing;
pub mod session;

pub use approval::ApprovalState;
pub use authorize::{
    AuthorizationExplanation, Decision, GuardPolicy, GuardReason, authorize, explain,
};
pub use in_memory::InMemoryIdentityProvider;
pub use principal::{IdentityToken, Principal, PrincipalOrigin, Standing, UserProfile};
pub use requirement::{Destination, RouteRequirement};
pub use roles::Role;
pub use routing::{Navigation, home_redirect, navigate};
pub use session::{
    AuthEvent, IdentityProvider, ProfileState, Session, SessionConfig, SessionError,
    SessionService, SessionState,
};
