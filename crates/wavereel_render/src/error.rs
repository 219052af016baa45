use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("{0} not found")]
    ToolNotFound(String),

    #[error("{tool} failed ({status}):\n{tail}")]
    ToolFailed {
        tool: String,
        status: String,
        tail: String,
    },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] wavereel_core::error::CoreError),
}

impl RenderError {
    /// Map a spawn failure, reporting a missing executable by name.
    pub fn spawn(tool: &str, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            RenderError::ToolNotFound(tool.to_string())
        } else {
            RenderError::Io(e)
        }
    }

    /// Interruption ends the whole batch; every other error ends one job.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, RenderError::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
