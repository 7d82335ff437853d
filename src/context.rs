/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    conversations::ConversationStore,
    db,
    error::{EngineError, EngineResult},
    identity::UserDirectory,
    interactions::InteractionEngine,
    notifications::NotificationDispatcher,
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub users: Arc<UserDirectory>,
    pub engine: Arc<InteractionEngine>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> EngineResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        tracing::info!("Database ready at {:?}", config.storage.database);

        Ok(Self::with_pool(config, db))
    }

    /// Wire every service onto an existing, migrated pool
    pub fn with_pool(config: ServerConfig, db: SqlitePool) -> Self {
        let users = Arc::new(UserDirectory::new(db.clone()));
        let capacity = config.notifications.broadcast_capacity;

        let dispatcher = Arc::new(NotificationDispatcher::new(db.clone(), capacity));
        let conversations = Arc::new(ConversationStore::new(db.clone(), capacity));

        let engine = Arc::new(InteractionEngine::new(
            db.clone(),
            users.clone(),
            config.quota,
            config.discovery.clone(),
            dispatcher,
            conversations,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config: Arc::new(config),
            db,
            users,
            engine,
            rate_limiter,
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> EngineResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                EngineError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
