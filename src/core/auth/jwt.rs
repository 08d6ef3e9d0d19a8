//! Token authority: issues and verifies access and refresh tokens
//!
//! Both token kinds are HS256 JWTs, but each kind is signed with its own key
//! and carries its own lifetime. Access tokens are short-lived (15 minutes by
//! default), refresh tokens are long-lived (7 days by default).
//!
//! Verification never returns an error: callers branch on [`Verification`].

use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default access token lifetime
pub const DEFAULT_ACCESS_TOKEN_TTL: &str = "15m";

/// Default refresh token lifetime
pub const DEFAULT_REFRESH_TOKEN_TTL: &str = "7d";

/// Development-only signing keys. `Config::validate` rejects them in production.
pub const DEV_ACCESS_SECRET: &str = "taskauth-dev-access-secret-change-in-production";
pub const DEV_REFRESH_SECRET: &str = "taskauth-dev-refresh-secret-change-in-production";

const DEFAULT_ISSUER: &str = "taskauth";

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Key for signing access tokens
    pub access_secret: String,
    /// Key for signing refresh tokens, independent of the access key
    pub refresh_secret: String,
    /// Access token lifetime
    pub access_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_ttl: Duration,
    /// Token issuer
    pub issuer: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl JwtConfig {
    /// Create a new JWT configuration with default lifetimes
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Create config from environment variables, falling back to development keys
    pub fn from_env() -> Result<Self, JwtError> {
        let access_secret =
            std::env::var("JWT_SECRET").unwrap_or_else(|_| DEV_ACCESS_SECRET.to_string());
        let refresh_secret =
            std::env::var("JWT_REFRESH_SECRET").unwrap_or_else(|_| DEV_REFRESH_SECRET.to_string());

        let access_ttl = parse_ttl(
            &std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
                .unwrap_or_else(|_| DEFAULT_ACCESS_TOKEN_TTL.to_string()),
        )?;
        let refresh_ttl = parse_ttl(
            &std::env::var("JWT_REFRESH_TOKEN_EXPIRY")
                .unwrap_or_else(|_| DEFAULT_REFRESH_TOKEN_TTL.to_string()),
        )?;

        let issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string());

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
            issuer,
        })
    }

    /// Set access token lifetime
    pub fn access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    /// Set refresh token lifetime
    pub fn refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// Parse a lifetime literal such as `90s`, `15m`, `2h` or `7d`.
///
/// A bare number is read as seconds.
pub fn parse_ttl(value: &str) -> Result<Duration, JwtError> {
    let value = value.trim();
    let invalid = || JwtError::InvalidTtl(value.to_string());

    let (digits, unit) = match value.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&value[..idx], Some(c)),
        Some(_) => (value, None),
        None => return Err(invalid()),
    };

    let amount: i64 = digits.parse().map_err(|_| invalid())?;
    let ttl = match unit {
        None | Some('s') => Duration::try_seconds(amount),
        Some('m') => Duration::try_minutes(amount),
        Some('h') => Duration::try_hours(amount),
        Some('d') => Duration::try_days(amount),
        Some(_) => None,
    };
    ttl.ok_or_else(invalid)
}

/// JWT errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Invalid token lifetime: {0}")]
    InvalidTtl(String),

    #[error("Token encoding failed: {0}")]
    EncodingError(String),
}

/// Token kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID)
    pub sub: String,
    /// Account username
    pub username: String,
    /// Token kind
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Unique identifier for this token
    pub jti: String,
    /// Rotation generation, refresh tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
}

impl Claims {
    /// Get subject as UUID
    pub fn subject_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Outcome of verifying a token
#[derive(Debug, Clone)]
pub enum Verification {
    /// Signature, issuer, kind and expiry all check out
    Valid(Claims),
    /// Correctly signed but past its expiry
    Expired,
    /// Malformed, mis-signed, or of the wrong kind
    Invalid,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }

    pub fn into_claims(self) -> Option<Claims> {
        match self {
            Verification::Valid(claims) => Some(claims),
            _ => None,
        }
    }
}

/// A freshly signed token and its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Expiration (Unix timestamp)
    pub expires_at: i64,
}

/// Access + refresh token pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// JWT service for token operations
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    access_keys: std::sync::Arc<KeyPair>,
    refresh_keys: std::sync::Arc<KeyPair>,
}

impl JwtService {
    /// Create a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let access_keys = std::sync::Arc::new(KeyPair::from_secret(&config.access_secret));
        let refresh_keys = std::sync::Arc::new(KeyPair::from_secret(&config.refresh_secret));

        Self {
            config,
            access_keys,
            refresh_keys,
        }
    }

    /// Create JWT service from environment variables
    pub fn from_env() -> Result<Self, JwtError> {
        Ok(Self::new(JwtConfig::from_env()?))
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    fn sign(
        &self,
        token_type: TokenType,
        user_id: Uuid,
        username: &str,
        generation: Option<u64>,
    ) -> Result<IssuedToken, JwtError> {
        let (ttl, keys) = match token_type {
            TokenType::Access => (self.config.access_ttl, &self.access_keys),
            TokenType::Refresh => (self.config.refresh_ttl, &self.refresh_keys),
        };

        let now = Utc::now();
        let exp = now + ttl;

        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            token_type,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
            generation,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: exp.timestamp(),
        })
    }

    /// Issue an access token for an account
    pub fn issue_access(&self, user_id: Uuid, username: &str) -> Result<IssuedToken, JwtError> {
        self.sign(TokenType::Access, user_id, username, None)
    }

    /// Issue a refresh token for an account at the given rotation generation
    pub fn issue_refresh(
        &self,
        user_id: Uuid,
        username: &str,
        generation: u64,
    ) -> Result<IssuedToken, JwtError> {
        self.sign(TokenType::Refresh, user_id, username, Some(generation))
    }

    /// Issue an access + refresh pair for the same subject
    pub fn issue_pair(
        &self,
        user_id: Uuid,
        username: &str,
        generation: u64,
    ) -> Result<TokenPair, JwtError> {
        let access = self.issue_access(user_id, username)?;
        let refresh = self.issue_refresh(user_id, username, generation)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        })
    }

    fn verify(&self, token: &str, expected: TokenType) -> Verification {
        let keys = match expected {
            TokenType::Access => &self.access_keys,
            TokenType::Refresh => &self.refresh_keys,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        // Strict expiry
        validation.leeway = 0;

        match decode::<Claims>(token, &keys.decoding, &validation) {
            Ok(data) if data.claims.token_type == expected => Verification::Valid(data.claims),
            Ok(_) => Verification::Invalid,
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Verification::Expired,
                _ => Verification::Invalid,
            },
        }
    }

    /// Verify an access token against the access key
    pub fn verify_access(&self, token: &str) -> Verification {
        self.verify(token, TokenType::Access)
    }

    /// Verify a refresh token against the refresh key
    pub fn verify_refresh(&self, token: &str) -> Verification {
        self.verify(token, TokenType::Refresh)
    }

    /// Refresh token lifetime in whole seconds
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.config.refresh_ttl.num_seconds()
    }
}
