use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LedgerError;

/// Identifies the one progress record kept for a chapter taught at a branch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerKey {
    pub chapter_id: String,
    pub branch_id: String,
}

impl LedgerKey {
    pub fn new(chapter_id: &str, branch_id: &str) -> Result<Self, LedgerError> {
        let chapter_id = chapter_id.trim();
        let branch_id = branch_id.trim();
        if chapter_id.is_empty() {
            return Err(LedgerError::validation("chapterId", "chapter is required"));
        }
        if branch_id.is_empty() {
            return Err(LedgerError::validation("branchId", "branch is required"));
        }
        Ok(Self {
            chapter_id: chapter_id.to_string(),
            branch_id: branch_id.to_string(),
        })
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.chapter_id, self.branch_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusTag {
    Regular,
    Overshoot,
    Substitute,
}

impl StatusTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusTag::Regular => "REGULAR",
            StatusTag::Overshoot => "OVERSHOOT",
            StatusTag::Substitute => "SUBSTITUTE",
        }
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusTag {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REGULAR" => Ok(StatusTag::Regular),
            "OVERSHOOT" => Ok(StatusTag::Overshoot),
            "SUBSTITUTE" => Ok(StatusTag::Substitute),
            other => Err(LedgerError::validation(
                "tag",
                format!("unknown status tag: {}", other),
            )),
        }
    }
}

pub type TagSet = BTreeSet<StatusTag>;

/// Primary classification of an entry. An overshoot always carries its remark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "primary", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Regular,
    Overshoot { remark: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitute {
    pub remark: String,
}

/// One lecture as submitted by a faculty member. Never changed once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub faculty_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub content_taught: String,
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitute: Option<Substitute>,
    pub submitted_at: DateTime<Utc>,
}

impl ProgressEntry {
    pub fn status_tags(&self) -> TagSet {
        let mut tags = TagSet::new();
        tags.insert(match self.kind {
            EntryKind::Regular => StatusTag::Regular,
            EntryKind::Overshoot { .. } => StatusTag::Overshoot,
        });
        if self.substitute.is_some() {
            tags.insert(StatusTag::Substitute);
        }
        tags
    }

    pub fn is_overshoot(&self) -> bool {
        matches!(self.kind, EntryKind::Overshoot { .. })
    }

    pub fn is_substitute(&self) -> bool {
        self.substitute.is_some()
    }

    pub fn overshoot_remark(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::Overshoot { remark } => Some(remark),
            EntryKind::Regular => None,
        }
    }

    pub fn substitute_remark(&self) -> Option<&str> {
        self.substitute.as_ref().map(|s| s.remark.as_str())
    }

    /// Fields are public, so entries built by hand are re-checked before append.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.faculty_name.trim().is_empty() {
            return Err(LedgerError::validation("facultyName", "faculty is required"));
        }
        if self.content_taught.trim().is_empty() {
            return Err(LedgerError::validation(
                "contentTaught",
                "content taught is required",
            ));
        }
        if let Some(remark) = self.overshoot_remark() {
            if remark.trim().is_empty() {
                return Err(LedgerError::validation(
                    "overshootRemark",
                    "overshoot remark is required",
                ));
            }
        }
        if let Some(remark) = self.substitute_remark() {
            if remark.trim().is_empty() {
                return Err(LedgerError::validation(
                    "substituteRemark",
                    "substitute remark is required",
                ));
            }
        }
        Ok(())
    }
}

/// Raw input from a faculty member before it is tagged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub faculty_name: String,
    pub faculty_code: Option<String>,
    pub subject: Option<String>,
    pub content_taught: String,
    pub overshoot_remark: Option<String>,
    pub substitute_remark: Option<String>,
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Submission {
    /// Checks the fields that do not depend on classification.
    pub fn validate_basic(&self) -> Result<(), LedgerError> {
        if self.faculty_name.trim().is_empty() {
            return Err(LedgerError::validation("facultyName", "faculty is required"));
        }
        if self.content_taught.trim().is_empty() {
            return Err(LedgerError::validation(
                "contentTaught",
                "content taught is required",
            ));
        }
        Ok(())
    }

    /// Builds the immutable entry for `tags`. Remarks whose tag is absent are dropped.
    pub fn into_entry(
        self,
        tags: &TagSet,
        submitted_at: DateTime<Utc>,
    ) -> Result<ProgressEntry, LedgerError> {
        self.validate_basic()?;

        let regular = tags.contains(&StatusTag::Regular);
        let overshoot = tags.contains(&StatusTag::Overshoot);
        if regular == overshoot {
            return Err(LedgerError::validation(
                "statusTags",
                "exactly one of REGULAR or OVERSHOOT is required",
            ));
        }

        let kind = if overshoot {
            let remark = non_empty(&self.overshoot_remark).ok_or_else(|| {
                LedgerError::validation("overshootRemark", "overshoot remark is required")
            })?;
            EntryKind::Overshoot { remark }
        } else {
            EntryKind::Regular
        };

        let substitute = if tags.contains(&StatusTag::Substitute) {
            let remark = non_empty(&self.substitute_remark).ok_or_else(|| {
                LedgerError::validation("substituteRemark", "substitute remark is required")
            })?;
            Some(Substitute { remark })
        } else {
            None
        };

        Ok(ProgressEntry {
            faculty_name: self.faculty_name.trim().to_string(),
            faculty_code: non_empty(&self.faculty_code),
            subject: non_empty(&self.subject),
            content_taught: self.content_taught.trim().to_string(),
            kind,
            substitute,
            submitted_at,
        })
    }
}

/// Chapter metadata copied onto a record when it is first created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterMeta {
    pub subject: Option<String>,
    pub required_lecture_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub record_id: String,
    #[serde(flatten)]
    pub key: LedgerKey,
    #[serde(default)]
    pub subject: Option<String>,
    pub required_lecture_count: u32,
    #[serde(default)]
    pub faculties: Vec<String>,
    pub entries: Vec<ProgressEntry>,
    pub derived_status_tags: TagSet,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerRecord {
    pub fn create(
        key: LedgerKey,
        meta: &ChapterMeta,
        entry: ProgressEntry,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            record_id: Uuid::new_v4().to_string(),
            key,
            subject: meta.subject.clone(),
            required_lecture_count: meta.required_lecture_count,
            faculties: Vec::new(),
            entries: Vec::new(),
            derived_status_tags: TagSet::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        record.push(entry, now);
        record
    }

    /// The record that results from appending `entry` to this one.
    pub fn appended(&self, entry: ProgressEntry, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.push(entry, now);
        next
    }

    fn push(&mut self, entry: ProgressEntry, now: DateTime<Utc>) {
        if !self.faculties.iter().any(|f| f == &entry.faculty_name) {
            self.faculties.push(entry.faculty_name.clone());
        }
        self.entries.push(entry);
        self.derived_status_tags = aggregate_tags(&self.entries);
        self.version += 1;
        self.updated_at = now;
    }

    pub fn lecture_number(&self) -> usize {
        self.entries.len()
    }
}

/// OVERSHOOT if any entry overshot, else REGULAR; SUBSTITUTE if any entry was a substitute.
pub fn aggregate_tags(entries: &[ProgressEntry]) -> TagSet {
    let mut tags = TagSet::new();
    if entries.iter().any(ProgressEntry::is_overshoot) {
        tags.insert(StatusTag::Overshoot);
    } else {
        tags.insert(StatusTag::Regular);
    }
    if entries.iter().any(ProgressEntry::is_substitute) {
        tags.insert(StatusTag::Substitute);
    }
    tags
}
