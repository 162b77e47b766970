//! Read-side helpers for the analysis view.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::LedgerError;
use crate::model::{LedgerRecord, ProgressEntry, StatusTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl FromStr for SortOrder {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" | "desc" | "descending" => Ok(SortOrder::Newest),
            "oldest" | "asc" | "ascending" => Ok(SortOrder::Oldest),
            other => Err(LedgerError::validation(
                "sort",
                format!("unknown sort order: {}", other),
            )),
        }
    }
}

/// Latest `submitted_at` in the record, or the Unix epoch when it has no entries.
pub fn latest_submission_date(record: &LedgerRecord) -> DateTime<Utc> {
    record
        .entries
        .iter()
        .map(|e| e.submitted_at)
        .max()
        .unwrap_or_default()
}

pub fn matches_search(record: &LedgerRecord, text: &str) -> bool {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    let hit = |field: &str| field.to_lowercase().contains(&needle);
    hit(&record.key.chapter_id)
        || hit(&record.key.branch_id)
        || record.subject.as_deref().map(hit).unwrap_or(false)
        || record.faculties.iter().any(|f| hit(f))
        || record
            .entries
            .iter()
            .filter_map(|e| e.faculty_code.as_deref())
            .any(hit)
}

pub fn search(mut records: Vec<LedgerRecord>, text: &str) -> Vec<LedgerRecord> {
    records.retain(|r| matches_search(r, text));
    records
}

pub fn filter_by_tag(mut records: Vec<LedgerRecord>, tag: StatusTag) -> Vec<LedgerRecord> {
    records.retain(|r| r.derived_status_tags.contains(&tag));
    records
}

/// Stable: records with equal dates keep their relative order.
pub fn sort_by_latest_date(mut records: Vec<LedgerRecord>, order: SortOrder) -> Vec<LedgerRecord> {
    match order {
        SortOrder::Oldest => records.sort_by_key(latest_submission_date),
        SortOrder::Newest => {
            records.sort_by(|a, b| latest_submission_date(b).cmp(&latest_submission_date(a)))
        }
    }
    records
}

/// Entries oldest first, for the "previous lectures" panel.
pub fn history(record: &LedgerRecord) -> Vec<&ProgressEntry> {
    let mut entries: Vec<&ProgressEntry> = record.entries.iter().collect();
    entries.sort_by_key(|e| e.submitted_at);
    entries
}

/// Every tag present on at least one record, for filter pickers.
pub fn distinct_tags(records: &[LedgerRecord]) -> Vec<StatusTag> {
    let tags: BTreeSet<StatusTag> = records
        .iter()
        .flat_map(|r| r.derived_status_tags.iter().copied())
        .collect();
    tags.into_iter().collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultySummary {
    pub records: usize,
    pub lectures: usize,
    pub overshoot_lectures: usize,
    pub substitute_lectures: usize,
    pub latest: Option<DateTime<Utc>>,
}

pub fn group_by_faculty(records: &[LedgerRecord]) -> BTreeMap<String, FacultySummary> {
    let mut out: BTreeMap<String, FacultySummary> = BTreeMap::new();
    for record in records {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for e in &record.entries {
            let summary = out.entry(e.faculty_name.clone()).or_default();
            if seen.insert(e.faculty_name.as_str()) {
                summary.records += 1;
            }
            summary.lectures += 1;
            if e.is_overshoot() {
                summary.overshoot_lectures += 1;
            }
            if e.is_substitute() {
                summary.substitute_lectures += 1;
            }
            if summary.latest.map(|l| e.submitted_at > l).unwrap_or(true) {
                summary.latest = Some(e.submitted_at);
            }
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisQuery {
    pub search: String,
    pub tag: Option<StatusTag>,
    pub order: SortOrder,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub records: Vec<LedgerRecord>,
    pub total: usize,
    pub available_tags: Vec<StatusTag>,
}

/// Search, then tag filter, then sort; `total` counts records before filtering.
pub fn analyze(records: Vec<LedgerRecord>, query: &AnalysisQuery) -> Analysis {
    let total = records.len();
    let available_tags = distinct_tags(&records);
    let mut shown = search(records, &query.search);
    if let Some(tag) = query.tag {
        shown = filter_by_tag(shown, tag);
    }
    Analysis {
        records: sort_by_latest_date(shown, query.order),
        total,
        available_tags,
    }
}
