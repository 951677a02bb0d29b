//! Document processing status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a stored document as it moves through content extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Stored, not yet processed.
    Pending,
    /// Extraction is running.
    Processing,
    /// Extraction succeeded and records were written.
    Done,
    /// Extraction failed; the error is kept on the document.
    Failed,
}

impl DocumentStatus {
    /// The lowercase name stored in the database and the index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether a document in this status may enter `Processing`.
    pub fn can_start_processing(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a status string is not one of the four known values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown document status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for DocumentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}
