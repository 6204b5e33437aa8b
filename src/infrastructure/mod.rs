//! Infrastructure layer: storage backends and configuration.

pub mod config;
pub mod factory;
pub mod in_memory;
pub mod postgres;
pub mod repository;

pub use config::{AppConfig, ConfigurationError, LogFormat, StorageMode};
pub use factory::{FactoryError, Repositories, RepositoryFactory};
pub use in_memory::{Fault, InMemoryStore};
pub use postgres::PostgresStore;
pub use repository::{
    CommentRepository, RepositoryError, TaskRepository, TaskTransaction, UserRepository,
};
