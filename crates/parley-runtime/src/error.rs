//! Runtime error types.

use parley_framework::DispatchError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while setting up or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A shutdown signal handler could not be installed.
    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    /// A listen cycle failed outside the loop.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
