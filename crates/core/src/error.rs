use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlotillaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job run failed: {0}")]
    Run(String),

    #[error("{0}")]
    Other(String),
}

impl FlotillaError {
    /// Shortcut for building a validation error from anything printable.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
