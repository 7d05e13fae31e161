use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A flow-graph schema version label such as `3.8`.
///
/// Ordering is the plain string ordering of the label, so `"3.10" < "3.7"`.
/// Detection tie-breaks and upgrade target lists both rely on this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion {
    label: String,
}

impl SchemaVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            label: format!("{}.{}", major, minor),
        }
    }

    /// Derive a version from a creation marker like `3.8.2` by keeping its
    /// first two dot-separated components.
    pub fn from_marker(marker: &str) -> Result<Self, SchemaVersionError> {
        let mut parts = marker.split('.');
        match (parts.next(), parts.next()) {
            (Some(major), Some(minor)) => Ok(Self {
                label: format!("{}.{}", major, minor),
            }),
            _ => Err(SchemaVersionError::InvalidFormat(marker.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(SchemaVersionError::InvalidFormat(s.to_string()));
        }

        Ok(Self {
            label: s.to_string(),
        })
    }
}

/// Outcome of version detection on a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectedVersion {
    Known(SchemaVersion),
    /// No marker and no indicator evidence.
    Undetermined,
    /// The document could not be inspected at all.
    DetectionFailed { reason: String },
}

impl DetectedVersion {
    pub fn known(&self) -> Option<&SchemaVersion> {
        match self {
            DetectedVersion::Known(version) => Some(version),
            _ => None,
        }
    }
}

impl fmt::Display for DetectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectedVersion::Known(version) => write!(f, "{}", version),
            DetectedVersion::Undetermined => f.write_str("Unknown"),
            DetectedVersion::DetectionFailed { .. } => f.write_str("Error"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaVersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),
}
