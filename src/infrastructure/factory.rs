//! Repository factory for runtime backend selection.
//!
//! Builds the repository handles for the configured [`StorageMode`].
//!
//! ```ignore
//! let config = AppConfig::from_env()?;
//! let repositories = RepositoryFactory::new(config).create().await?;
//! ```

use std::sync::Arc;

use thiserror::Error;

use super::{
    AppConfig, CommentRepository, ConfigurationError, InMemoryStore, PostgresStore,
    RepositoryError, StorageMode, TaskRepository, UserRepository,
};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during factory initialization.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database connection error: {0}")]
    DatabaseConnection(String),

    /// Creating a configured seed user failed.
    #[error("Seeding user '{username}' failed: {source}")]
    Seed {
        username: String,
        source: RepositoryError,
    },
}

// =============================================================================
// Repositories
// =============================================================================

/// Collection of initialized repositories.
///
/// All three handles point at the same backing store.
#[derive(Clone)]
pub struct Repositories {
    pub task_repository: Arc<dyn TaskRepository + Send + Sync>,
    pub user_repository: Arc<dyn UserRepository + Send + Sync>,
    pub comment_repository: Arc<dyn CommentRepository + Send + Sync>,
}

impl Repositories {
    /// Wraps a store that implements every repository trait.
    #[must_use]
    pub fn from_store<S>(store: S) -> Self
    where
        S: TaskRepository + UserRepository + CommentRepository + Clone + Send + Sync + 'static,
    {
        Self {
            task_repository: Arc::new(store.clone()),
            user_repository: Arc::new(store.clone()),
            comment_repository: Arc::new(store),
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Repositories")
            .field("task_repository", &"Arc<dyn TaskRepository>")
            .field("user_repository", &"Arc<dyn UserRepository>")
            .field("comment_repository", &"Arc<dyn CommentRepository>")
            .finish()
    }
}

// =============================================================================
// Repository Factory
// =============================================================================

#[derive(Debug, Clone)]
pub struct RepositoryFactory {
    config: AppConfig,
}

impl RepositoryFactory {
    #[must_use]
    pub const fn new(config: AppConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Creates the repositories for the configured storage mode.
    ///
    /// In `PostgreSQL` mode the schema is bootstrapped first. In memory, the
    /// configured seed users are inserted.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError` if the database is unreachable, the schema
    /// bootstrap fails or a seed user cannot be created.
    pub async fn create(&self) -> Result<Repositories, FactoryError> {
        match self.config.storage_mode {
            StorageMode::InMemory => {
                let store = InMemoryStore::new();
                for user in &self.config.seed_users {
                    UserRepository::insert(&store, user.clone())
                        .await
                        .map_err(|source| FactoryError::Seed {
                            username: user.username.clone(),
                            source,
                        })?;
                    tracing::info!(username = %user.username, "Seeded user");
                }
                Ok(Repositories::from_store(store))
            }
            StorageMode::Postgres => {
                let database_url = self
                    .config
                    .database_url
                    .as_deref()
                    .ok_or(ConfigurationError::MissingDatabaseUrl)?;
                let store = PostgresStore::connect(database_url)
                    .await
                    .map_err(|error| FactoryError::DatabaseConnection(error.to_string()))?;
                store
                    .ensure_schema()
                    .await
                    .map_err(|error| FactoryError::DatabaseConnection(error.to_string()))?;
                Ok(Repositories::from_store(store))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
