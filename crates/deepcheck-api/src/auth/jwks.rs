//! RS256/ES256 key lookup with JWKS rotation.

use chrono::{DateTime, Utc};
use deepcheck_core::AppError;
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

const DEFAULT_CACHE_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(rename = "kty")]
    pub key_type: String,
    #[serde(rename = "kid")]
    pub key_id: Option<String>,
    #[serde(rename = "n")]
    pub modulus: Option<String>,
    #[serde(rename = "e")]
    pub exponent: Option<String>,
    #[serde(rename = "x")]
    pub x_coordinate: Option<String>,
    #[serde(rename = "y")]
    pub y_coordinate: Option<String>,
    #[serde(rename = "crv")]
    pub curve: Option<String>,
}

#[derive(Clone)]
struct CachedKey {
    key: DecodingKey,
    expires_at: DateTime<Utc>,
}

/// Fetches and caches the identity provider's signing keys.
pub struct JwksClient {
    http_client: reqwest::Client,
    jwks_url: String,
    cache: RwLock<HashMap<String, CachedKey>>,
    cache_ttl_seconds: i64,
}

impl JwksClient {
    pub fn new(jwks_url: impl Into<String>, cache_ttl_seconds: Option<i64>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http_client,
            jwks_url: jwks_url.into(),
            cache: RwLock::new(HashMap::new()),
            cache_ttl_seconds: cache_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        })
    }

    async fn fetch_jwks(&self) -> Result<Jwks, AppError> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AppError::Unauthorized(format!("Failed to fetch JWKS: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Unauthorized(format!(
                "JWKS endpoint returned error: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Unauthorized(format!("Failed to parse JWKS: {}", e)))
    }

    fn to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, AppError> {
        let missing = |what: &str| AppError::Unauthorized(format!("JWK missing {}", what));
        match jwk.key_type.as_str() {
            "RSA" => {
                let n = jwk.modulus.as_ref().ok_or_else(|| missing("modulus"))?;
                let e = jwk.exponent.as_ref().ok_or_else(|| missing("exponent"))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| AppError::Unauthorized(format!("Failed to create RSA key: {}", e)))
            }
            "EC" => {
                let x = jwk.x_coordinate.as_ref().ok_or_else(|| missing("x coordinate"))?;
                let y = jwk.y_coordinate.as_ref().ok_or_else(|| missing("y coordinate"))?;
                let curve = jwk.curve.as_deref().ok_or_else(|| missing("curve"))?;
                if curve != "P-256" {
                    return Err(AppError::Unauthorized(format!(
                        "Unsupported EC curve: {} (only P-256 is supported)",
                        curve
                    )));
                }
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| AppError::Unauthorized(format!("Failed to create EC key: {}", e)))
            }
            other => Err(AppError::Unauthorized(format!(
                "Unsupported key type: {}",
                other
            ))),
        }
    }

    /// Key for `kid`, or the first published key when the token names none.
    pub async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, AppError> {
        let cache_key = kid.unwrap_or("default").to_string();

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&cache_key) {
                if cached.expires_at > Utc::now() {
                    return Ok(cached.key.clone());
                }
            }
        }

        let jwks = self.fetch_jwks().await?;
        let jwk = match kid {
            Some(kid) => jwks
                .keys
                .iter()
                .find(|k| k.key_id.as_deref() == Some(kid))
                .ok_or_else(|| AppError::Unauthorized(format!("Key ID {} not found in JWKS", kid)))?,
            None => jwks
                .keys
                .first()
                .ok_or_else(|| AppError::Unauthorized("No keys found in JWKS".to_string()))?,
        };
        let key = Self::to_decoding_key(jwk)?;

        self.cache.write().await.insert(
            cache_key,
            CachedKey {
                key: key.clone(),
                expires_at: Utc::now() + chrono::Duration::seconds(self.cache_ttl_seconds),
            },
        );

        Ok(key)
    }
}
