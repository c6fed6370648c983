//! Authentication Module
//!
//! Bearer JWT verification for the catalog API. Tokens are issued by the
//! external identity provider; this service only checks the HS256 signature,
//! the expiry (against an injectable clock, with skew tolerance) and the
//! optional issuer, and turns the subject into the caller's [`OwnerId`].
//!
//! Verification sits behind the [`TokenVerifier`] trait so the middleware
//! does not depend on the token format.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pins_core::{Clock, ConfigError, OwnerId, SystemClock};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

// ============================================================================
// SECRET WRAPPER
// ============================================================================

/// JWT signing secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Wrap a secret, rejecting empty values.
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "jwt_secret".to_string(),
            });
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Token verification settings.
#[derive(Clone)]
pub struct AuthConfig {
    /// Signing secret. Without one, every presented token is rejected and
    /// only public routes are reachable.
    pub jwt_secret: Option<JwtSecret>,
    pub jwt_algorithm: Algorithm,
    /// Expected `iss` claim, when set.
    pub jwt_issuer: Option<String>,
    /// Lifetime of tokens minted by [`generate_jwt_token`].
    pub jwt_expiration_secs: i64,
    pub jwt_clock_skew_secs: i64,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .finish_non_exhaustive()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_algorithm: Algorithm::HS256,
            jwt_issuer: None,
            jwt_expiration_secs: 3600,
            jwt_clock_skew_secs: 60,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `PINS_JWT_SECRET`: JWT signing secret (unset = token auth disabled)
    /// - `PINS_JWT_ISSUER`: Required `iss` claim (optional)
    /// - `PINS_JWT_EXPIRATION_SECS`: Lifetime of minted tokens (default: 3600)
    /// - `PINS_JWT_CLOCK_SKEW_SECS`: Clock skew tolerance (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let jwt_secret = std::env::var("PINS_JWT_SECRET")
            .ok()
            .and_then(|s| JwtSecret::new(s).ok());
        if jwt_secret.is_none() {
            tracing::warn!("PINS_JWT_SECRET is not set; authenticated routes will reject every request");
        }

        Self {
            jwt_secret,
            jwt_issuer: std::env::var("PINS_JWT_ISSUER")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            jwt_expiration_secs: std::env::var("PINS_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jwt_expiration_secs),
            jwt_clock_skew_secs: std::env::var("PINS_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jwt_clock_skew_secs),
            ..defaults
        }
    }

    /// Configuration with a fixed secret, for tests and tooling.
    pub fn with_secret(secret: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            jwt_secret: Some(JwtSecret::new(secret.into())?),
            ..Self::default()
        })
    }

    fn secret(&self) -> ApiResult<&JwtSecret> {
        self.jwt_secret
            .as_ref()
            .ok_or_else(|| ApiError::invalid_token("Token authentication is not configured"))
    }
}

// ============================================================================
// CLAIMS AND CONTEXT
// ============================================================================

/// JWT claims accepted by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (owner id)
    pub sub: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The authenticated caller, inserted into request extensions by the auth
/// middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub owner_id: OwnerId,
    pub email: Option<String>,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            owner_id: OwnerId::new(claims.sub),
            email: claims.email,
        }
    }
}

// ============================================================================
// VERIFICATION
// ============================================================================

/// Turns a bearer token into the caller's identity.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> ApiResult<AuthContext>;
}

/// Verifies locally signed JWTs.
#[derive(Debug, Clone)]
pub struct JwtTokenVerifier {
    config: Arc<AuthConfig>,
}

impl JwtTokenVerifier {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &str) -> ApiResult<AuthContext> {
        let claims = validate_jwt_token(&self.config, token)?;
        if claims.sub.trim().is_empty() {
            return Err(ApiError::invalid_token("Token subject is empty"));
        }
        Ok(claims.into())
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(header_value: &str) -> ApiResult<&str> {
    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::invalid_token("Authorization header must use Bearer scheme"))?
        .trim();
    if token.is_empty() {
        return Err(ApiError::invalid_token("Bearer token is empty"));
    }
    Ok(token)
}

fn validate_claim_times(now: i64, exp: i64, leeway_secs: i64) -> ApiResult<()> {
    if exp < now - leeway_secs {
        return Err(ApiError::token_expired());
    }
    Ok(())
}

/// Validate a JWT and extract its claims.
///
/// `jsonwebtoken` checks the signature only; expiry is checked here against
/// the configured clock so tests can control time.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.secret()?.expose().as_bytes());

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let token_data =
        decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidToken => {
                ApiError::invalid_token("Token is invalid")
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            _ => ApiError::invalid_token(format!("Token validation failed: {}", e)),
        })?;

    let claims = token_data.claims;

    validate_claim_times(
        config.clock.now().timestamp(),
        claims.exp,
        config.jwt_clock_skew_secs,
    )?;

    if let Some(expected) = &config.jwt_issuer {
        if claims.iss.as_deref() != Some(expected.as_str()) {
            return Err(ApiError::invalid_token("Token issuer is not trusted"));
        }
    }

    Ok(claims)
}

/// Mint a token for `owner_id`. Used by tests and local tooling.
pub fn generate_jwt_token(
    config: &AuthConfig,
    owner_id: &OwnerId,
    email: Option<String>,
) -> ApiResult<String> {
    let now = config.clock.now().timestamp();
    let claims = Claims {
        sub: owner_id.to_string(),
        iat: now,
        exp: now + config.jwt_expiration_secs,
        iss: config.jwt_issuer.clone(),
        email,
    };

    let encoding_key = EncodingKey::from_secret(config.secret()?.expose().as_bytes());
    let header = Header::new(config.jwt_algorithm);

    encode(&header, &claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pins_core::ManualClock;
    use std::sync::Mutex;
    use std::time::Duration;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    fn config_with_clock(clock: Arc<ManualClock>) -> AuthConfig {
        AuthConfig {
            clock,
            ..AuthConfig::with_secret("test-secret-for-unit-tests").expect("secret")
        }
    }

    #[test]
    fn test_jwt_secret_is_redacted() {
        let secret = JwtSecret::new("super-secret".to_string()).expect("secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("12 chars"));
        assert!(JwtSecret::new(String::new()).is_err());
    }

    #[test]
    fn test_from_env_reads_secret_and_issuer() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|p| p.into_inner());
        let _secret = EnvVarGuard::set("PINS_JWT_SECRET", Some("from-env"));
        let _issuer = EnvVarGuard::set("PINS_JWT_ISSUER", Some("https://id.example.com"));
        let _skew = EnvVarGuard::set("PINS_JWT_CLOCK_SKEW_SECS", Some("5"));

        let config = AuthConfig::from_env();
        assert_eq!(config.jwt_secret.as_ref().map(JwtSecret::expose), Some("from-env"));
        assert_eq!(config.jwt_issuer.as_deref(), Some("https://id.example.com"));
        assert_eq!(config.jwt_clock_skew_secs, 5);
    }

    #[test]
    fn test_from_env_without_secret() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|p| p.into_inner());
        let _secret = EnvVarGuard::set("PINS_JWT_SECRET", None);

        let config = AuthConfig::from_env();
        assert!(config.jwt_secret.is_none());
        let err = validate_jwt_token(&config, "a.b.c").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToken);
    }

    #[test]
    fn test_token_round_trip() -> ApiResult<()> {
        let config = config_with_clock(Arc::new(ManualClock::at_epoch_2024()));
        let owner = OwnerId::new("alice");

        let token = generate_jwt_token(&config, &owner, Some("alice@example.com".to_string()))?;
        let claims = validate_jwt_token(&config, &token)?;

        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, 3600);
        let context = AuthContext::from(claims);
        assert_eq!(context.owner_id, owner);
        assert_eq!(context.email.as_deref(), Some("alice@example.com"));
        Ok(())
    }

    #[test]
    fn test_expired_token_rejected_after_skew() -> ApiResult<()> {
        let clock = Arc::new(ManualClock::at_epoch_2024());
        let config = config_with_clock(clock.clone());
        let token = generate_jwt_token(&config, &OwnerId::new("alice"), None)?;

        // inside the skew window
        clock.advance(Duration::from_secs(3600 + 30));
        assert!(validate_jwt_token(&config, &token).is_ok());

        clock.advance(Duration::from_secs(60));
        let err = validate_jwt_token(&config, &token).unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);
        Ok(())
    }

    #[test]
    fn test_wrong_secret_rejected() -> ApiResult<()> {
        let clock = Arc::new(ManualClock::at_epoch_2024());
        let config = config_with_clock(clock.clone());
        let token = generate_jwt_token(&config, &OwnerId::new("alice"), None)?;

        let other = AuthConfig {
            clock,
            ..AuthConfig::with_secret("a-different-secret").expect("secret")
        };
        let err = validate_jwt_token(&other, &token).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToken);
        Ok(())
    }

    #[test]
    fn test_issuer_enforced() -> ApiResult<()> {
        let clock = Arc::new(ManualClock::at_epoch_2024());
        let untrusted = config_with_clock(clock.clone());
        let token = generate_jwt_token(&untrusted, &OwnerId::new("alice"), None)?;

        let strict = AuthConfig {
            jwt_issuer: Some("https://id.example.com".to_string()),
            ..config_with_clock(clock)
        };
        assert!(validate_jwt_token(&strict, &token).is_err());

        let trusted = generate_jwt_token(&strict, &OwnerId::new("alice"), None)?;
        assert!(validate_jwt_token(&strict, &trusted).is_ok());
        Ok(())
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def").ok(), Some("abc.def"));
        assert!(extract_bearer_token("Basic abc").is_err());
        assert!(extract_bearer_token("Bearer   ").is_err());
    }

    #[tokio::test]
    async fn test_verifier_rejects_blank_subject() -> ApiResult<()> {
        let config = config_with_clock(Arc::new(ManualClock::at_epoch_2024()));
        let token = generate_jwt_token(&config, &OwnerId::new(" "), None)?;
        let verifier = JwtTokenVerifier::new(config);
        assert!(verifier.verify(&token).await.is_err());
        Ok(())
    }
}
