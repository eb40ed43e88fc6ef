//! Bearer tokens for test identities.

use chrono::Utc;
use deepcheck_api::auth::JwtClaims;
use jsonwebtoken::{encode, EncodingKey, Header};

use super::JWT_SECRET;

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.com";

pub fn token_for(email: &str) -> String {
    let claims = JwtClaims {
        sub: format!("idp|{}", email),
        email: Some(email.to_string()),
        exp: Utc::now().timestamp() + 600,
        iat: Some(Utc::now().timestamp()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign test token")
}

pub fn bearer(email: &str) -> String {
    format!("Bearer {}", token_for(email))
}
