//! Domain services.
//!
//! `AuthService` is the orchestrator; the lockout engine, permission
//! resolver, token service and audit recorder are its collaborators and
//! are individually testable against the in-memory store.

pub mod audit;
pub mod auth;
pub mod error;
pub mod jwt;
pub mod lockout;
pub mod rbac;

pub use audit::AuditRecorder;
pub use auth::{AuthService, AuthSession, RefreshedAccess};
pub use error::{AuthError, ErrorResponse};
pub use jwt::{BranchAccess, IdentityClaims, RefreshClaims, TokenService};
pub use lockout::LockoutEngine;
pub use rbac::{PermissionResolver, ResolvedAccess};
