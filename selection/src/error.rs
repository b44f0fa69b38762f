//! Error taxonomy for the selection core.
//!
//! | Error             | Source                  | Retriable |
//! |-------------------|-------------------------|-----------|
//! | `ResolveError`    | option list fetches     | network only |
//! | `CascadeError`    | out-of-order selection  | no        |
//! | `ValidationError` | local input checks      | no        |
//! | `SubmitError`     | partition submission    | network / server / in-progress |
//!
//! A stale fetch result is not an error: it surfaces as
//! [`Resolution::Discarded`](crate::cascade::Resolution::Discarded).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::Level;

/// Failure while fetching or normalizing one level's option list.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ResolveError {
    /// Transport failure (connection refused, timeout, non-2xx status).
    #[error("Network error: {0}")]
    Network(String),

    /// Body was not JSON or did not match the endpoint's record schema.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// A dependent level was asked for without its parent id.
    #[error("Cannot resolve {0} options without a parent selection")]
    MissingParent(Level),
}

impl ResolveError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Selection applied in an order the cascade does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CascadeError {
    #[error("Cannot select {level} before {parent} is selected")]
    ParentNotSelected { level: Level, parent: Level },
}

/// Local validation failures. These never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No class selected")]
    MissingClass,

    #[error("Group size must be a whole number between {min} and {max}, got {input:?}")]
    InvalidGroupSize { input: String, min: u8, max: u8 },

    #[error("A student cannot be paired with or separated from themselves ({0})")]
    InvalidConstraint(String),

    #[error("Constraints were collected for class {scoped} but class {selected} is selected")]
    StaleConstraints { scoped: String, selected: String },
}

/// Failure while handing a request to the partitioning service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Partition service returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Malformed partition result: {0}")]
    Malformed(String),

    #[error("A submission is already in progress")]
    InProgress,
}

impl SubmitError {
    /// Whether the user can simply press "generate" again.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Network(_) | Self::InProgress => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}
