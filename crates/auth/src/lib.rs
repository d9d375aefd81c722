//! `bloodline-auth`: consumption of the external identity layer.
//!
//! Tokens are issued elsewhere; this crate only verifies them and answers the
//! "is this principal staff?" question. It is decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod roles;

pub use authorize::{AuthzError, require_self_or_staff, require_staff};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use roles::Role;
