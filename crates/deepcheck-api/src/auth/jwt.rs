use deepcheck_core::config::AuthConfig;
use deepcheck_core::AppError;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};

use crate::auth::jwks::JwksClient;
use crate::auth::models::{JwtClaims, Principal};

/// Verifies bearer tokens issued by the identity provider.
pub struct TokenVerifier {
    shared_secret: Option<DecodingKey>,
    jwks: Option<JwksClient>,
    issuer: Option<String>,
    audience: Option<String>,
}

impl TokenVerifier {
    pub fn new(auth: &AuthConfig) -> anyhow::Result<Self> {
        let jwks = match auth.jwks_url {
            Some(ref url) => Some(JwksClient::new(url.clone(), None)?),
            None => None,
        };
        Ok(Self {
            shared_secret: auth
                .jwt_secret
                .as_ref()
                .map(|s| DecodingKey::from_secret(s.as_bytes())),
            jwks,
            issuer: auth.issuer.clone(),
            audience: auth.audience.clone(),
        })
    }

    /// HS256-only verifier.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            shared_secret: Some(DecodingKey::from_secret(secret.as_bytes())),
            jwks: None,
            issuer: None,
            audience: None,
        }
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;
        if let Some(ref issuer) = self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match self.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }

    async fn key_for(&self, algorithm: Algorithm, kid: Option<&str>) -> Result<DecodingKey, AppError> {
        match algorithm {
            Algorithm::HS256 => self
                .shared_secret
                .clone()
                .ok_or_else(|| AppError::Unauthorized("HS256 tokens are not accepted".to_string())),
            Algorithm::RS256 | Algorithm::ES256 => match self.jwks {
                Some(ref jwks) => jwks.decoding_key(kid).await,
                None => Err(AppError::Unauthorized(format!(
                    "{:?} tokens are not accepted",
                    algorithm
                ))),
            },
            other => Err(AppError::Unauthorized(format!(
                "Unsupported algorithm: {:?}",
                other
            ))),
        }
    }

    pub async fn verify(&self, token: &str) -> Result<Principal, AppError> {
        let header = decode_header(token)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token header: {}", e)))?;
        let key = self.key_for(header.alg, header.kid.as_deref()).await?;

        let data = decode::<JwtClaims>(token, &key, &self.validation(header.alg)).map_err(|e| {
            tracing::debug!("JWT validation failed: {}", e);
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token has expired".to_string())
                }
                ErrorKind::InvalidIssuer => {
                    AppError::Unauthorized("Invalid token issuer".to_string())
                }
                ErrorKind::InvalidAudience => {
                    AppError::Unauthorized("Invalid token audience".to_string())
                }
                ErrorKind::ImmatureSignature => {
                    AppError::Unauthorized("Token is not yet valid (nbf)".to_string())
                }
                _ => AppError::Unauthorized(format!("Invalid or expired token: {}", e)),
            }
        })?;

        let email = data
            .claims
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Token has no email claim".to_string()))?;

        Ok(Principal {
            subject: data.claims.sub,
            email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    fn sign(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn exp() -> i64 {
        chrono::Utc::now().timestamp() + 600
    }

    #[tokio::test]
    async fn test_valid_token_yields_lowercased_email() {
        let token = sign(json!({"sub": "idp|1", "email": "Ada@Example.com", "exp": exp()}), SECRET);
        let principal = TokenVerifier::from_secret(SECRET).verify(&token).await.unwrap();
        assert_eq!(principal.subject, "idp|1");
        assert_eq!(principal.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let token = sign(json!({"sub": "x", "email": "a@b.co", "exp": exp()}), "another-secret-another-secret-1234");
        let err = TokenVerifier::from_secret(SECRET).verify(&token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let token = sign(
            json!({"sub": "x", "email": "a@b.co", "exp": chrono::Utc::now().timestamp() - 60}),
            SECRET,
        );
        let err = TokenVerifier::from_secret(SECRET).verify(&token).await.unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized: Token has expired");
    }

    #[tokio::test]
    async fn test_token_without_email_rejected() {
        let token = sign(json!({"sub": "x", "exp": exp()}), SECRET);
        let err = TokenVerifier::from_secret(SECRET).verify(&token).await.unwrap_err();
        assert!(err.to_string().contains("email"));
    }

    #[tokio::test]
    async fn test_issuer_and_audience_enforced() {
        let verifier = TokenVerifier::new(&AuthConfig {
            jwt_secret: Some(SECRET.to_string()),
            jwks_url: None,
            issuer: Some("https://id.example.com".to_string()),
            audience: Some("deepcheck".to_string()),
        })
        .unwrap();

        let good = sign(
            json!({"sub": "x", "email": "a@b.co", "exp": exp(),
                   "iss": "https://id.example.com", "aud": "deepcheck"}),
            SECRET,
        );
        assert!(verifier.verify(&good).await.is_ok());

        let wrong_aud = sign(
            json!({"sub": "x", "email": "a@b.co", "exp": exp(),
                   "iss": "https://id.example.com", "aud": "other"}),
            SECRET,
        );
        assert!(verifier.verify(&wrong_aud).await.is_err());
    }
}
