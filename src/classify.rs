use serde::Serialize;

use crate::directory::{AssignmentDirectory, RequirementTable};
use crate::model::{LedgerKey, ProgressEntry, StatusTag, TagSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum SubstituteReason {
    /// Someone else taught the previous lecture of this chapter at this branch.
    HandOff { previous: String },
    /// The faculty has no assignment for this chapter at this branch.
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub tags: TagSet,
    pub completed: usize,
    pub required: u32,
    pub substitute: Option<SubstituteReason>,
}

impl Classification {
    pub fn primary(&self) -> StatusTag {
        if self.tags.contains(&StatusTag::Overshoot) {
            StatusTag::Overshoot
        } else {
            StatusTag::Regular
        }
    }

    pub fn next_lecture_number(&self) -> usize {
        self.completed + 1
    }

    pub fn requires_overshoot_remark(&self) -> bool {
        self.tags.contains(&StatusTag::Overshoot)
    }

    pub fn requires_substitute_remark(&self) -> bool {
        self.tags.contains(&StatusTag::Substitute)
    }
}

/// Tags for the next submission by `faculty` given the key's history so far.
///
/// The lecture that reaches the required count is still REGULAR; every one
/// after it is OVERSHOOT. A required count of 0 therefore makes even the first
/// submission OVERSHOOT.
pub fn classify<R, D>(
    key: &LedgerKey,
    faculty: &str,
    history: &[ProgressEntry],
    requirements: &R,
    directory: &D,
) -> Classification
where
    R: RequirementTable + ?Sized,
    D: AssignmentDirectory + ?Sized,
{
    let completed = history.len();
    let required = requirements.required_lecture_count(&key.chapter_id);

    let mut tags = TagSet::new();
    if completed as u64 >= u64::from(required) {
        tags.insert(StatusTag::Overshoot);
    } else {
        tags.insert(StatusTag::Regular);
    }

    // The previous lecture's faculty takes precedence over the assignment table.
    let substitute = match history.last() {
        Some(last) if last.faculty_name != faculty => Some(SubstituteReason::HandOff {
            previous: last.faculty_name.clone(),
        }),
        _ if !directory.is_assigned(faculty, &key.chapter_id, &key.branch_id) => {
            Some(SubstituteReason::Unassigned)
        }
        _ => None,
    };
    if substitute.is_some() {
        tags.insert(StatusTag::Substitute);
    }

    Classification {
        tags,
        completed,
        required,
        substitute,
    }
}
