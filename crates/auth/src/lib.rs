//! `fleetops-auth` — authentication/authorization boundary.
//!
//! This crate is decoupled from HTTP and storage: it validates tokens and
//! answers "may this principal do X" questions.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize, permissions_for_role};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use roles::Role;
