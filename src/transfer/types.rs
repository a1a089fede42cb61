//! Transfer, route and wire record types

use crate::integrity::IntegrityVerifier;
use crate::transfer::error::{TransferError, TransferResult};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// Current UTC time as an ISO-8601 string
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Ordered node identifiers from origin (`route[0]`) to final destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route(Vec<String>);

impl Route {
    pub fn new(nodes: Vec<String>) -> Self {
        Self(nodes)
    }

    pub fn nodes(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn origin(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn destination(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Node at `index`, if any
    pub fn node(&self, index: u32) -> Option<&str> {
        self.0.get(index as usize).map(String::as_str)
    }

    /// True iff `index` designates the final destination
    pub fn is_final(&self, index: u32) -> bool {
        index as usize + 1 >= self.0.len()
    }

    /// Node that follows `index`, or `None` at the destination
    pub fn next_hop(&self, index: u32) -> Option<&str> {
        if self.is_final(index) {
            return None;
        }
        self.node(index + 1)
    }
}

impl From<Vec<String>> for Route {
    fn from(nodes: Vec<String>) -> Self {
        Self(nodes)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" -> "))
    }
}

/// A file in transit, as seen by the node about to forward it
#[derive(Debug, Clone)]
pub struct Transfer {
    /// Generated once at the origin, preserved across hops
    pub transfer_id: String,
    pub filename: String,
    pub route: Route,
    /// Index of the node currently holding the file
    pub current_index: u32,
    /// Digest declared at the origin; `None` means compute from the local copy
    pub digest: Option<String>,
}

impl Transfer {
    /// Fresh transfer at the origin of `route`
    pub fn originate(filename: impl Into<String>, route: Route) -> Self {
        Self {
            transfer_id: uuid::Uuid::new_v4().to_string(),
            filename: filename.into(),
            route,
            current_index: 0,
            digest: None,
        }
    }

    /// Transfer continuing from a received frame
    pub fn from_metadata(metadata: &TransferMetadata) -> Self {
        Self {
            transfer_id: metadata.transfer_id.clone(),
            filename: metadata.filename.clone(),
            route: metadata.route.clone(),
            current_index: metadata.current_index,
            digest: Some(metadata.md5.clone()),
        }
    }
}

/// Metadata block of a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    pub transfer_id: String,
    pub filename: String,
    pub route: Route,
    /// Index of the receiving node in `route`
    pub current_index: u32,
    pub file_size: u64,
    pub md5: String,
    pub timestamp: String,
}

impl TransferMetadata {
    /// Whether the receiving node is the final destination
    pub fn is_destination(&self) -> bool {
        self.route.is_final(self.current_index)
    }

    /// Check field-level constraints serde cannot express
    pub fn validate(&self) -> TransferResult<()> {
        let id_ok = !self.transfer_id.is_empty()
            && self.transfer_id.len() <= MAX_TRANSFER_ID_LEN
            && self
                .transfer_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !id_ok {
            return Err(TransferError::Protocol(format!(
                "invalid transfer_id {:?}",
                self.transfer_id
            )));
        }
        validate_filename(&self.filename)?;
        if self.route.is_empty() {
            return Err(TransferError::Protocol("empty route".into()));
        }
        if self.current_index as usize >= self.route.len() {
            return Err(TransferError::Protocol(format!(
                "current_index {} out of range for route of length {}",
                self.current_index,
                self.route.len()
            )));
        }
        IntegrityVerifier::validate_digest(&self.md5)
            .map_err(|e| TransferError::Protocol(e.to_string()))?;
        Ok(())
    }
}

/// Longest accepted filename in bytes (NAME_MAX on common filesystems)
pub const MAX_FILENAME_LEN: usize = 255;

/// Longest accepted transfer id; the id is part of on-disk names
pub const MAX_TRANSFER_ID_LEN: usize = 64;

/// Reject anything but a single plain file name
pub fn validate_filename(filename: &str) -> TransferResult<()> {
    if filename.len() > MAX_FILENAME_LEN {
        return Err(TransferError::Protocol(format!(
            "filename is {} bytes, limit is {MAX_FILENAME_LEN}",
            filename.len()
        )));
    }

    let mut components = Path::new(filename).components();
    let valid = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !filename.contains(['/', '\\']);

    if !valid {
        return Err(TransferError::Protocol(format!(
            "invalid filename {filename:?}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

/// Receiver's reply after verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
    pub message: String,
    pub timestamp: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Ok,
            message: message.into(),
            timestamp: timestamp_now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            message: message.into(),
            timestamp: timestamp_now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AckStatus::Ok
    }
}

/// Status reported to the timeline service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferStatus {
    Pending,
    Done,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "PENDING"),
            TransferStatus::Done => write!(f, "DONE"),
        }
    }
}
