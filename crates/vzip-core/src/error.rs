use thiserror::Error;

pub type VzipResult<T> = Result<T, VzipError>;

#[derive(Debug, Error)]
pub enum VzipError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
