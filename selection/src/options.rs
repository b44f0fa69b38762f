//! Cascade levels, normalized option entries and the per-endpoint record
//! schemas they are built from.
//!
//! Every remote body is decoded against an explicit schema for its level.
//! A body that does not match fails as [`ResolveError::Malformed`] here, at
//! the boundary, instead of leaking half-shaped data into the cascade.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ResolveError;

/// One tier of dependent selection.
///
/// Ordering follows the cascade: `Teacher < Class < StudentPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Teacher,
    Class,
    StudentPool,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Teacher, Level::Class, Level::StudentPool];

    pub fn parent(self) -> Option<Level> {
        match self {
            Self::Teacher => None,
            Self::Class => Some(Self::Teacher),
            Self::StudentPool => Some(Self::Class),
        }
    }

    pub fn child(self) -> Option<Level> {
        match self {
            Self::Teacher => Some(Self::Class),
            Self::Class => Some(Self::StudentPool),
            Self::StudentPool => None,
        }
    }

    /// Levels strictly below this one, nearest first.
    pub fn descendants(self) -> impl Iterator<Item = Level> {
        Self::ALL.into_iter().filter(move |l| *l > self)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Teacher => write!(f, "teacher"),
            Self::Class => write!(f, "class"),
            Self::StudentPool => write!(f, "student pool"),
        }
    }
}

/// A normalized dropdown entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    /// Value passed on to the next level or the request.
    pub id: String,
    /// Text shown to the user.
    pub display_label: String,
    /// The record exactly as the server sent it.
    pub raw: Value,
}

/// `GET /api/cims/teacherIDs` element.
#[derive(Debug, Clone, Deserialize)]
pub struct TeacherRecord {
    pub id: String,
}

/// `POST /api/cims/classes` element.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub class_id: String,
    pub class_code: String,
}

/// `POST /api/cims/students` element. Unlisted fields are kept in `extra`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub username: String,
    /// Some rosters omit this entirely, others send an empty string.
    #[serde(default)]
    pub given_name: Option<String>,
    pub forename: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl StudentRecord {
    /// Preferred name when present and non-empty, legal forename otherwise.
    pub fn display_name(&self) -> &str {
        match self.given_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.forename,
        }
    }
}

/// Decode one level's response body into option entries, in arrival order.
pub fn normalize(level: Level, body: Value) -> Result<Vec<OptionEntry>, ResolveError> {
    let Value::Array(items) = body else {
        return Err(ResolveError::Malformed(format!(
            "{level} response is not a JSON array"
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, raw)| {
            normalize_record(level, &raw)
                .map(|(id, display_label)| OptionEntry {
                    id,
                    display_label,
                    raw,
                })
                .map_err(|e| ResolveError::Malformed(format!("{level} record {idx}: {e}")))
        })
        .collect()
}

fn normalize_record(level: Level, raw: &Value) -> Result<(String, String), serde_json::Error> {
    match level {
        Level::Teacher => {
            let record = TeacherRecord::deserialize(raw)?;
            Ok((record.id.clone(), record.id))
        }
        Level::Class => {
            let record = ClassRecord::deserialize(raw)?;
            Ok((record.class_id, record.class_code))
        }
        Level::StudentPool => {
            let record = StudentRecord::deserialize(raw)?;
            let label = record.display_name().to_string();
            Ok((record.username, label))
        }
    }
}
