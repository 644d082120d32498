//! Errors that end the agent.

use thiserror::Error;

/// The only error allowed to stop the loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// A Critical fault was raised; it has already been logged.
    #[error("critical fault: {0}")]
    Critical(String),
}
