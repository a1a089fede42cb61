use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Timeline service unreachable: {0}")]
    Unreachable(String),

    #[error("Timeline service rejected update: {0}")]
    Rejected(String),
}

pub type StatusResult<T> = Result<T, StatusError>;
