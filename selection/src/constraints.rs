//! Pairing / separation affiliations collected before submission.
//!
//! A pair lives in at most one of the two collections at a time. Adding a
//! pair under one kind silently removes it from the other. The whole set is
//! scoped to one class and is reset when that class changes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// The algorithm should put both students in the same group.
    Paired,
    /// The algorithm should keep the students apart.
    Separated,
}

impl ConstraintKind {
    pub fn opposite(self) -> Self {
        match self {
            Self::Paired => Self::Separated,
            Self::Separated => Self::Paired,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paired => write!(f, "paired"),
            Self::Separated => write!(f, "separated"),
        }
    }
}

/// Unordered pair of two distinct student ids.
///
/// Stored lexically ordered, so `(a, b)` and `(b, a)` compare equal.
/// Serializes as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[String; 2]", into = "[String; 2]")]
pub struct StudentPair {
    low: String,
    high: String,
}

impl StudentPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Result<Self, ValidationError> {
        let (a, b) = (a.into(), b.into());
        if a == b {
            return Err(ValidationError::InvalidConstraint(a));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    pub fn students(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }
}

impl TryFrom<[String; 2]> for StudentPair {
    type Error = ValidationError;

    fn try_from([a, b]: [String; 2]) -> Result<Self, Self::Error> {
        Self::new(a, b)
    }
}

impl From<StudentPair> for [String; 2] {
    fn from(pair: StudentPair) -> Self {
        [pair.low, pair.high]
    }
}

impl fmt::Display for StudentPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.low, self.high)
    }
}

/// The two disjoint pair collections, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub paired: Vec<StudentPair>,
    pub separated: Vec<StudentPair>,
}

impl ConstraintSet {
    pub fn get(&self, kind: ConstraintKind) -> &[StudentPair] {
        match kind {
            ConstraintKind::Paired => &self.paired,
            ConstraintKind::Separated => &self.separated,
        }
    }

    fn get_mut(&mut self, kind: ConstraintKind) -> &mut Vec<StudentPair> {
        match kind {
            ConstraintKind::Paired => &mut self.paired,
            ConstraintKind::Separated => &mut self.separated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paired.is_empty() && self.separated.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paired.len() + self.separated.len()
    }
}

/// Owns the constraint set for one class plus the affiliation panel toggle.
#[derive(Debug, Clone, Default)]
pub struct ConstraintAggregator {
    set: ConstraintSet,
    class_id: Option<String>,
    panel_open: bool,
}

impl ConstraintAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `a`/`b` under `kind`, moving the pair out of the other kind.
    ///
    /// Returns `true` if the set changed.
    pub fn add_pair(
        &mut self,
        kind: ConstraintKind,
        a: impl Into<String>,
        b: impl Into<String>,
    ) -> Result<bool, ValidationError> {
        let pair = StudentPair::new(a, b)?;

        let opposite = self.set.get_mut(kind.opposite());
        let before = opposite.len();
        opposite.retain(|p| p != &pair);
        let moved = opposite.len() != before;

        let target = self.set.get_mut(kind);
        if target.contains(&pair) {
            return Ok(moved);
        }
        debug!(%kind, %pair, moved, "Constraint added");
        target.push(pair);
        Ok(true)
    }

    /// Drop `a`/`b` from `kind`. Returns `true` if it was present.
    pub fn remove_pair(&mut self, kind: ConstraintKind, a: &str, b: &str) -> bool {
        let Ok(pair) = StudentPair::new(a, b) else {
            return false;
        };
        let target = self.set.get_mut(kind);
        let before = target.len();
        target.retain(|p| p != &pair);
        target.len() != before
    }

    pub fn reset(&mut self) {
        if !self.set.is_empty() {
            debug!(dropped = self.set.len(), "Constraints reset");
        }
        self.set = ConstraintSet::default();
    }

    /// Bind to `class_id`. Resets when it differs from the current scope.
    ///
    /// Returns `true` if a reset happened.
    pub fn scope_to(&mut self, class_id: &str) -> bool {
        if self.class_id.as_deref() == Some(class_id) {
            return false;
        }
        self.reset();
        self.class_id = Some(class_id.to_string());
        true
    }

    /// Drop the class scope entirely, e.g. when the teacher changes.
    pub fn unscope(&mut self) {
        self.reset();
        self.class_id = None;
    }

    /// Flip the affiliation panel. Never touches the pair collections.
    pub fn toggle_visibility(&mut self) -> bool {
        self.panel_open = !self.panel_open;
        self.panel_open
    }

    pub fn close_panel(&mut self) {
        self.panel_open = false;
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn class_id(&self) -> Option<&str> {
        self.class_id.as_deref()
    }

    pub fn set(&self) -> &ConstraintSet {
        &self.set
    }

    pub fn paired(&self) -> &[StudentPair] {
        &self.set.paired
    }

    pub fn separated(&self) -> &[StudentPair] {
        &self.set.separated
    }
}
