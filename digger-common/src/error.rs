//! Common error types for Crate Digger

use thiserror::Error;

/// Common result type for Crate Digger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Crate Digger crates
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
}
