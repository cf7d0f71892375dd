use std::io;

/// Internal error type. Crosses module boundaries inside the firmware;
/// distinct from the wire-level `LOAD_ERR`/`RESULT status=...` taxonomy
/// in [`crate::protocol`], which is what actually reaches the gateway.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] crate::sandbox::SandboxError),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("gpio error: {0}")]
    Gpio(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
