//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] mandi_feed::FeedError),

    #[error("Registry error: {0}")]
    Registry(#[from] mandi_registry::RegistryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] mandi_persistence::PersistenceError),

    #[error("Dispatcher error: {0}")]
    Dispatcher(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(String),
}

pub type AppResult<T> = Result<T, AppError>;
