//! Bearer token verification.
//!
//! Identities are issued by an external provider. This service only verifies tokens, either
//! with a shared HS256 secret or against the provider's JWKS, and maps the `email` claim to a
//! ledger user.

pub mod jwks;
pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::TokenVerifier;
pub use models::{CurrentUser, JwtClaims, MaybeUser, Principal};
