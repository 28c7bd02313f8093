//! Admin trust and session security.
//!
//! Components, leaf first:
//! - [`lockout::LockoutTracker`]: failed-attempt counting and time-boxed lockout.
//! - [`csrf::CsrfGuard`]: double-submit tokens and origin validation.
//! - [`credential::ServiceCredentialVerifier`]: HMAC-SHA256 callback credentials.
//! - [`session::SessionManager`]: live admin sessions; owns the lockout tracker.
//! - [`gate::AccessGate`]: composes the above into one admit/deny decision.
//!
//! Shared state lives in an explicitly constructed `SessionManager` behind an
//! `Arc`; there are no globals.

pub mod authorization;
pub mod config;
pub mod cookies;
pub mod credential;
pub mod csrf;
pub mod error;
pub mod gate;
pub mod ip;
pub mod lockout;
pub mod principal;
pub mod reaper;
pub mod secure;
pub mod session;

pub use authorization::{
    AuditContext, AuditOutcome, AuthorizationReason, AuthorizationResult,
    EmailAuthorizationService, User, UserDirectory, ADMIN_ROLE,
};
pub use config::{ConfigError, SecurityConfig};
pub use credential::{
    require_service_credential, CredentialError, ServiceCredential, ServiceCredentialVerifier,
};
pub use csrf::CsrfGuard;
pub use error::GateError;
pub use gate::AccessGate;
pub use ip::IpAllowList;
pub use lockout::LockoutTracker;
pub use principal::{attach_principal, ClientInfo, Principal, PrincipalResolver};
pub use reaper::spawn_reaper;
pub use session::{AdminSession, AuthMethod, SessionHandle, SessionManager};
