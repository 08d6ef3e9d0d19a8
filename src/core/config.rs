//! Server configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`,
//! then call `Config::validate()` before serving.

use std::str::FromStr;

use crate::core::auth::jwt::{DEV_ACCESS_SECRET, DEV_REFRESH_SECRET, JwtConfig, JwtError};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_COOKIE_PATH: &str = "/auth";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:4200";
const DEFAULT_LOG_LEVEL: &str = "debug";

/// Name of the cookie carrying the refresh token
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set to a non-default value in production")]
    InsecureSecret(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Access token lifetime must be shorter than refresh token lifetime")]
    TtlOrder,

    #[error(transparent)]
    Jwt(#[from] JwtError),
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "test" => Ok(Environment::Development),
            _ => Err(ConfigError::InvalidValue {
                key: "APP_ENV",
                value: s.to_string(),
            }),
        }
    }
}

/// SameSite policy for the refresh cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSitePolicy {
    Strict,
    #[default]
    Lax,
    None,
}

impl FromStr for SameSitePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSitePolicy::Strict),
            "lax" => Ok(SameSitePolicy::Lax),
            "none" => Ok(SameSitePolicy::None),
            _ => Err(ConfigError::InvalidValue {
                key: "COOKIE_SAME_SITE",
                value: s.to_string(),
            }),
        }
    }
}

/// Refresh cookie settings
#[derive(Debug, Clone, PartialEq)]
pub struct CookieConfig {
    pub name: String,
    /// Path the cookie is scoped to
    pub path: String,
    pub same_site: SameSitePolicy,
    /// HTTPS only
    pub secure: bool,
    pub max_age_secs: i64,
}

impl CookieConfig {
    /// Development defaults matched to a refresh lifetime
    pub fn for_refresh_ttl(max_age_secs: i64) -> Self {
        Self {
            name: REFRESH_COOKIE_NAME.to_string(),
            path: DEFAULT_COOKIE_PATH.to_string(),
            same_site: SameSitePolicy::Lax,
            secure: false,
            max_age_secs,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port
    pub port: u16,
    pub environment: Environment,
    /// Token signing keys and lifetimes
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    /// Browser origin allowed to call the API with credentials
    pub cors_origin: String,
    /// tracing filter directive
    pub log_level: String,
    /// Reject refresh tokens that were already rotated
    pub enforce_refresh_rotation: bool,
}

fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(None),
    }
}

fn env_bool(key: &'static str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue { key, value }),
        },
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Development configuration around the given JWT settings
    pub fn development(jwt: JwtConfig) -> Self {
        let cookie = CookieConfig::for_refresh_ttl(jwt.refresh_ttl.num_seconds());
        Self {
            port: DEFAULT_PORT,
            environment: Environment::Development,
            jwt,
            cookie,
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            enforce_refresh_rotation: true,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match std::env::var("APP_ENV").or_else(|_| std::env::var("NODE_ENV")) {
            Ok(value) => value.parse()?,
            Err(_) => Environment::Development,
        };

        let jwt = JwtConfig::from_env()?;
        let refresh_secs = jwt.refresh_ttl.num_seconds();

        let cookie = CookieConfig {
            name: REFRESH_COOKIE_NAME.to_string(),
            path: std::env::var("COOKIE_PATH").unwrap_or_else(|_| DEFAULT_COOKIE_PATH.to_string()),
            same_site: env_parse("COOKIE_SAME_SITE")?.unwrap_or_default(),
            secure: environment.is_production(),
            max_age_secs: env_parse("COOKIE_MAX_AGE")?.unwrap_or(refresh_secs),
        };

        Ok(Self {
            port: env_parse("PORT")?.unwrap_or(DEFAULT_PORT),
            environment,
            jwt,
            cookie,
            cors_origin: std::env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| DEFAULT_CORS_ORIGIN.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
            enforce_refresh_rotation: env_bool("ENFORCE_REFRESH_ROTATION")?.unwrap_or(true),
        })
    }

    /// Reject configurations that are unsafe to serve
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.access_ttl >= self.jwt.refresh_ttl {
            return Err(ConfigError::TtlOrder);
        }

        if self.environment.is_production() {
            if self.jwt.access_secret.is_empty() || self.jwt.access_secret == DEV_ACCESS_SECRET {
                return Err(ConfigError::InsecureSecret("JWT_SECRET"));
            }
            if self.jwt.refresh_secret.is_empty() || self.jwt.refresh_secret == DEV_REFRESH_SECRET
            {
                return Err(ConfigError::InsecureSecret("JWT_REFRESH_SECRET"));
            }
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn dev_config() -> Config {
        Config::development(JwtConfig::new(DEV_ACCESS_SECRET, DEV_REFRESH_SECRET))
    }

    #[test]
    fn test_development_defaults() {
        let config = dev_config();

        assert_eq!(config.port, 5000);
        assert!(!config.is_production());
        assert_eq!(config.cookie.name, "refreshToken");
        assert_eq!(config.cookie.path, "/auth");
        assert_eq!(config.cookie.max_age_secs, Duration::days(7).num_seconds());
        assert!(!config.cookie.secure);
        assert!(config.enforce_refresh_rotation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "Development".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_same_site_parse() {
        assert_eq!(
            "strict".parse::<SameSitePolicy>().unwrap(),
            SameSitePolicy::Strict
        );
        assert_eq!("LAX".parse::<SameSitePolicy>().unwrap(), SameSitePolicy::Lax);
        assert_eq!(
            "none".parse::<SameSitePolicy>().unwrap(),
            SameSitePolicy::None
        );
        assert!(matches!(
            "sometimes".parse::<SameSitePolicy>(),
            Err(ConfigError::InvalidValue {
                key: "COOKIE_SAME_SITE",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_production_rejects_default_secrets() {
        let mut config = dev_config();
        config.environment = Environment::Production;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InsecureSecret("JWT_SECRET"))
        ));

        config.jwt.access_secret = "real-access-secret".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InsecureSecret("JWT_REFRESH_SECRET"))
        ));

        config.jwt.refresh_secret = "real-refresh-secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_ttl_order() {
        let config = Config::development(
            JwtConfig::new("a", "r")
                .access_ttl(Duration::days(7))
                .refresh_ttl(Duration::minutes(5)),
        );

        assert!(matches!(config.validate(), Err(ConfigError::TtlOrder)));
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::InsecureSecret("JWT_SECRET").to_string(),
            "JWT_SECRET must be set to a non-default value in production"
        );
        assert_eq!(
            ConfigError::InvalidValue {
                key: "PORT",
                value: "abc".to_string()
            }
            .to_string(),
            "Invalid value for PORT: abc"
        );
    }

    #[test]
    fn test_config_from_env_returns_config() {
        // Actual values depend on environment, so only the shape is checked
        if let Ok(config) = Config::from_env() {
            assert_eq!(config.cookie.name, REFRESH_COOKIE_NAME);
        }
    }
}
