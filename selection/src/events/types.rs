//! Session events
//!
//! Every state change the options session applies is announced as one of
//! these, in the order it was applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraints::{ConstraintKind, StudentPair};
use crate::error::ResolveError;
use crate::options::Level;

/// All options-session events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A fetch for a level's options was dispatched
    OptionsRequested {
        level: Level,
        parent_id: Option<String>,
        epoch: u64,
        timestamp: DateTime<Utc>,
    },

    /// A level's option list was replaced
    OptionsLoaded {
        level: Level,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A live fetch failed; the level is in its error state
    OptionsFailed {
        level: Level,
        error: ResolveError,
        timestamp: DateTime<Utc>,
    },

    /// A superseded fetch completed and was ignored
    StaleResultDiscarded {
        level: Level,
        epoch: u64,
        current: u64,
        timestamp: DateTime<Utc>,
    },

    /// The user picked an entry at a level
    LevelSelected {
        level: Level,
        id: String,
        timestamp: DateTime<Utc>,
    },

    /// A pair was added to or removed from a constraint collection
    ConstraintChanged {
        kind: ConstraintKind,
        pair: StudentPair,
        added: bool,
        timestamp: DateTime<Utc>,
    },

    /// The constraint set was emptied
    ConstraintsReset {
        /// Class the constraints are now scoped to, if any
        class_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The affiliation panel was opened or closed
    PanelToggled {
        open: bool,
        timestamp: DateTime<Utc>,
    },

    /// Local validation refused to build a request
    ValidationFailed {
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A partition request was sent
    SubmissionStarted {
        class_id: String,
        group_size: u8,
        timestamp: DateTime<Utc>,
    },

    /// The partition result was handed to the downstream consumer
    PartitionComputed {
        class_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Submission failed; all selection state is intact
    SubmissionFailed {
        error: String,
        retriable: bool,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::OptionsRequested { timestamp, .. } => *timestamp,
            SessionEvent::OptionsLoaded { timestamp, .. } => *timestamp,
            SessionEvent::OptionsFailed { timestamp, .. } => *timestamp,
            SessionEvent::StaleResultDiscarded { timestamp, .. } => *timestamp,
            SessionEvent::LevelSelected { timestamp, .. } => *timestamp,
            SessionEvent::ConstraintChanged { timestamp, .. } => *timestamp,
            SessionEvent::ConstraintsReset { timestamp, .. } => *timestamp,
            SessionEvent::PanelToggled { timestamp, .. } => *timestamp,
            SessionEvent::ValidationFailed { timestamp, .. } => *timestamp,
            SessionEvent::SubmissionStarted { timestamp, .. } => *timestamp,
            SessionEvent::PartitionComputed { timestamp, .. } => *timestamp,
            SessionEvent::SubmissionFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::OptionsRequested { .. } => "options_requested",
            SessionEvent::OptionsLoaded { .. } => "options_loaded",
            SessionEvent::OptionsFailed { .. } => "options_failed",
            SessionEvent::StaleResultDiscarded { .. } => "stale_result_discarded",
            SessionEvent::LevelSelected { .. } => "level_selected",
            SessionEvent::ConstraintChanged { .. } => "constraint_changed",
            SessionEvent::ConstraintsReset { .. } => "constraints_reset",
            SessionEvent::PanelToggled { .. } => "panel_toggled",
            SessionEvent::ValidationFailed { .. } => "validation_failed",
            SessionEvent::SubmissionStarted { .. } => "submission_started",
            SessionEvent::PartitionComputed { .. } => "partition_computed",
            SessionEvent::SubmissionFailed { .. } => "submission_failed",
        }
    }

    /// Get the cascade level if this event is level-scoped
    pub fn level(&self) -> Option<Level> {
        match self {
            SessionEvent::OptionsRequested { level, .. }
            | SessionEvent::OptionsLoaded { level, .. }
            | SessionEvent::OptionsFailed { level, .. }
            | SessionEvent::StaleResultDiscarded { level, .. }
            | SessionEvent::LevelSelected { level, .. } => Some(*level),
            _ => None,
        }
    }
}
