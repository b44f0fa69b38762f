//! Partition request assembly and local validation.
//!
//! Nothing here touches the network: every rejection is reported before a
//! request exists, so an invalid form never costs a round trip.

use serde::{Deserialize, Serialize};

use crate::cascade::SelectionCascade;
use crate::constraints::{ConstraintAggregator, StudentPair};
use crate::error::ValidationError;
use crate::options::Level;

pub const MIN_GROUP_SIZE: u8 = 2;
pub const MAX_GROUP_SIZE: u8 = 6;
/// Value the group-size input starts with.
pub const DEFAULT_GROUP_SIZE: u8 = 5;

/// Body of `POST /api/personalityData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionRequest {
    pub class_id: String,
    pub group_size: u8,
    pub paired_students: Vec<StudentPair>,
    pub separated_students: Vec<StudentPair>,
}

/// Parse the raw group-size field. Out-of-range values are rejected, not clamped.
pub fn parse_group_size(input: &str) -> Result<u8, ValidationError> {
    let invalid = || ValidationError::InvalidGroupSize {
        input: input.to_string(),
        min: MIN_GROUP_SIZE,
        max: MAX_GROUP_SIZE,
    };
    let size: i64 = input.trim().parse().map_err(|_| invalid())?;
    u8::try_from(size)
        .ok()
        .filter(|s| (MIN_GROUP_SIZE..=MAX_GROUP_SIZE).contains(s))
        .ok_or_else(invalid)
}

/// Assemble a request from the current cascade and constraint state.
pub fn build(
    cascade: &SelectionCascade,
    constraints: &ConstraintAggregator,
    group_size_input: &str,
) -> Result<PartitionRequest, ValidationError> {
    let class_id = cascade
        .selected(Level::Class)
        .ok_or(ValidationError::MissingClass)?;

    let group_size = parse_group_size(group_size_input)?;

    if let Some(scoped) = constraints.class_id() {
        if scoped != class_id && !constraints.set().is_empty() {
            return Err(ValidationError::StaleConstraints {
                scoped: scoped.to_string(),
                selected: class_id.to_string(),
            });
        }
    }

    Ok(PartitionRequest {
        class_id: class_id.to_string(),
        group_size,
        paired_students: constraints.paired().to_vec(),
        separated_students: constraints.separated().to_vec(),
    })
}
