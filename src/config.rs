/// Configuration management for Tandem
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub quota: QuotaConfig,
    pub notifications: NotificationConfig,
    pub discovery: DiscoveryConfig,
    pub rate_limit: RateLimitConfig,
    pub jobs: JobsConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider that issues access tokens
    pub jwt_secret: String,
}

/// Daily super-like allowances
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub standard_daily_super_likes: u32,
    pub premium_daily_super_likes: u32,
}

impl QuotaConfig {
    pub fn allowance(&self, premium: bool) -> u32 {
        if premium {
            self.premium_daily_super_likes
        } else {
            self.standard_daily_super_likes
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            standard_daily_super_likes: 1,
            premium_daily_super_likes: 5,
        }
    }
}

/// Notification fan-out and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub broadcast_capacity: usize,
    /// Read notifications older than this are purged
    pub retention_days: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 1024,
            retention_days: 30,
        }
    }
}

/// Discovery feed paging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Like/pass writes per minute for a single user
    pub decisions_per_minute: u32,
    /// Requests per second across all unauthenticated callers
    pub unauthenticated_rps: u32,
}

/// Background job intervals, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub reconcile_interval: u64,
    pub notification_purge_interval: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> EngineResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("TANDEM_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("TANDEM_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| EngineError::Validation("Invalid port number".to_string()))?;
        let version = env::var("TANDEM_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("TANDEM_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("TANDEM_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("tandem.sqlite"));

        let jwt_secret = env::var("TANDEM_JWT_SECRET")
            .map_err(|_| EngineError::Validation("JWT secret required".to_string()))?;

        let quota_defaults = QuotaConfig::default();
        let quota = QuotaConfig {
            standard_daily_super_likes: env_or(
                "TANDEM_STANDARD_DAILY_SUPER_LIKES",
                quota_defaults.standard_daily_super_likes,
            ),
            premium_daily_super_likes: env_or(
                "TANDEM_PREMIUM_DAILY_SUPER_LIKES",
                quota_defaults.premium_daily_super_likes,
            ),
        };

        let notification_defaults = NotificationConfig::default();
        let notifications = NotificationConfig {
            broadcast_capacity: env_or(
                "TANDEM_NOTIFICATION_BROADCAST_CAPACITY",
                notification_defaults.broadcast_capacity,
            ),
            retention_days: env_or(
                "TANDEM_NOTIFICATION_RETENTION_DAYS",
                notification_defaults.retention_days,
            ),
        };

        let discovery_defaults = DiscoveryConfig::default();
        let discovery = DiscoveryConfig {
            default_limit: env_or("TANDEM_DISCOVERY_DEFAULT_LIMIT", discovery_defaults.default_limit),
            max_limit: env_or("TANDEM_DISCOVERY_MAX_LIMIT", discovery_defaults.max_limit),
        };

        let rate_limit = RateLimitConfig {
            enabled: env_or("TANDEM_RATE_LIMITS_ENABLED", true),
            decisions_per_minute: env_or("TANDEM_RATE_LIMIT_DECISIONS_PER_MINUTE", 120),
            unauthenticated_rps: env_or("TANDEM_RATE_LIMIT_UNAUTHENTICATED_RPS", 20),
        };

        let jobs = JobsConfig {
            reconcile_interval: env_or("TANDEM_RECONCILE_INTERVAL", 300),
            notification_purge_interval: env_or("TANDEM_NOTIFICATION_PURGE_INTERVAL", 86400),
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "tandem=debug,tower_http=debug".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig { jwt_secret },
            quota,
            notifications,
            discovery,
            rate_limit,
            jobs,
            logging: LoggingConfig {
                level: log_level,
                json: env_or("TANDEM_LOG_JSON", false),
            },
        })
    }

    /// Configuration suitable for tests and local tooling
    pub fn for_testing(jwt_secret: &str) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from("./data/tandem.sqlite"),
            },
            authentication: AuthConfig {
                jwt_secret: jwt_secret.to_string(),
            },
            quota: QuotaConfig::default(),
            notifications: NotificationConfig::default(),
            discovery: DiscoveryConfig::default(),
            rate_limit: RateLimitConfig {
                enabled: false,
                decisions_per_minute: 120,
                unauthenticated_rps: 20,
            },
            jobs: JobsConfig {
                reconcile_interval: 300,
                notification_purge_interval: 86400,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if self.service.hostname.is_empty() {
            return Err(EngineError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(EngineError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.quota.premium_daily_super_likes < self.quota.standard_daily_super_likes {
            return Err(EngineError::Validation(
                "Premium super-like allowance cannot be below the standard allowance".to_string(),
            ));
        }

        if self.notifications.broadcast_capacity == 0 {
            return Err(EngineError::Validation(
                "Notification broadcast capacity must be positive".to_string(),
            ));
        }

        if self.discovery.default_limit <= 0 || self.discovery.max_limit < self.discovery.default_limit {
            return Err(EngineError::Validation("Invalid discovery page limits".to_string()));
        }

        if self.rate_limit.enabled
            && (self.rate_limit.decisions_per_minute == 0 || self.rate_limit.unauthenticated_rps == 0)
        {
            return Err(EngineError::Validation(
                "Rate limits must be positive when enabled".to_string(),
            ));
        }

        Ok(())
    }
}
