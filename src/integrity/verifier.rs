use crate::integrity::error::{IntegrityError, IntegrityResult};
use md5::{Digest, Md5};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Length of a hex-encoded MD5 digest
pub const DIGEST_HEX_LEN: usize = 32;

const READ_BUFFER_SIZE: usize = 8192;

/// Size and content digest of a file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub size: u64,
    pub digest: String,
}

pub struct IntegrityVerifier;

impl IntegrityVerifier {
    /// Calculate the hex MD5 digest of a byte slice
    pub fn calculate_checksum(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Calculate the hex MD5 digest of a file (streaming)
    pub async fn calculate_file_checksum(path: &Path) -> IntegrityResult<String> {
        let mut file = tokio::fs::File::open(path).await.map_err(|e| {
            IntegrityError::FileNotFound(format!("{}: {}", path.display(), e))
        })?;

        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Size of a file in bytes
    pub async fn file_size(path: &Path) -> IntegrityResult<u64> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            IntegrityError::FileNotFound(format!("{}: {}", path.display(), e))
        })?;
        Ok(metadata.len())
    }

    /// Size and digest in one call
    pub async fn fingerprint(path: &Path) -> IntegrityResult<FileFingerprint> {
        let size = Self::file_size(path).await?;
        let digest = Self::calculate_file_checksum(path).await?;
        Ok(FileFingerprint { size, digest })
    }

    /// Check that `digest` looks like a hex MD5 digest
    pub fn validate_digest(digest: &str) -> IntegrityResult<()> {
        if digest.len() != DIGEST_HEX_LEN || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IntegrityError::InvalidDigest(digest.to_string()));
        }
        Ok(())
    }

    /// Recompute a file's digest and compare it with `expected`.
    ///
    /// Hex case is ignored. Returns the computed digest on success.
    pub async fn verify_file(path: &Path, expected: &str) -> IntegrityResult<String> {
        let actual = Self::calculate_file_checksum(path).await?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(IntegrityError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(actual)
    }
}
