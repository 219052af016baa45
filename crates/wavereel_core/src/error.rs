use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("unresolved graph label: [{0}]")]
    UnresolvedLabel(String),

    #[error("graph label produced twice while still open: [{0}]")]
    DuplicateLabel(String),

    #[error("graph references input {index} but only {count} inputs are declared")]
    InputOutOfRange { index: usize, count: usize },

    #[error("graph label never consumed: [{0}]")]
    DanglingLabel(String),

    #[error("graph does not produce final output [{0}]")]
    MissingOutput(String),

    #[error("invalid canvas {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },
}

pub type Result<T> = std::result::Result<T, CoreError>;
