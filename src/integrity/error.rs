use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid digest {0:?}: expected 32 hex characters")]
    InvalidDigest(String),
}

pub type IntegrityResult<T> = Result<T, IntegrityError>;
