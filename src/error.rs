use thiserror::Error;

#[derive(Debug, Error)]
pub enum MultigrainError {
    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Solve error: {0}")]
    Solve(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MultigrainError>;
