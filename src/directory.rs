//! Who may teach what, and how many lectures each chapter needs.
//!
//! Both tables are provisioned by administrators and only read by the
//! classifier. [`Directory`] is an in-memory snapshot of them; the SQLite
//! writers below maintain the persisted copy the sidecar loads from.

use rusqlite::{params, Connection};
use std::collections::{BTreeMap, BTreeSet};

pub trait AssignmentDirectory {
    fn is_assigned(&self, faculty: &str, chapter: &str, branch: &str) -> bool;
}

pub trait RequirementTable {
    /// Lectures needed to complete `chapter`. Missing or unparseable data is 0.
    fn required_lecture_count(&self, chapter: &str) -> u32;
}

/// Lenient integer parse: leading digits after trimming, like a form field's
/// `parseInt`. Anything that does not start with a number is 0, negatives are
/// clamped to 0 and overflow saturates.
pub fn parse_required_count(raw: &str) -> u32 {
    let s = raw.trim();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits: &str = {
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        &rest[..end]
    };
    if digits.is_empty() || negative {
        return 0;
    }
    digits.parse::<u32>().unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    assignments: BTreeSet<(String, String, String)>,
    requirements: BTreeMap<String, String>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assignment(mut self, faculty: &str, chapter: &str, branch: &str) -> Self {
        self.assign(faculty, chapter, branch);
        self
    }

    pub fn with_requirement(mut self, chapter: &str, raw: &str) -> Self {
        self.set_requirement(chapter, raw);
        self
    }

    pub fn assign(&mut self, faculty: &str, chapter: &str, branch: &str) {
        self.assignments.insert((
            faculty.trim().to_string(),
            chapter.trim().to_string(),
            branch.trim().to_string(),
        ));
    }

    pub fn set_requirement(&mut self, chapter: &str, raw: &str) {
        self.requirements
            .insert(chapter.trim().to_string(), raw.trim().to_string());
    }

    /// Chapters `faculty` is assigned to anywhere, sorted.
    pub fn chapters_for(&self, faculty: &str) -> Vec<String> {
        let chapters: BTreeSet<&str> = self
            .assignments
            .iter()
            .filter(|(f, _, _)| f == faculty)
            .map(|(_, c, _)| c.as_str())
            .collect();
        chapters.into_iter().map(str::to_string).collect()
    }

    /// Branches where `faculty` is assigned to teach `chapter`, sorted.
    pub fn branches_for(&self, faculty: &str, chapter: &str) -> Vec<String> {
        let branches: BTreeSet<&str> = self
            .assignments
            .iter()
            .filter(|(f, c, _)| f == faculty && c == chapter)
            .map(|(_, _, b)| b.as_str())
            .collect();
        branches.into_iter().map(str::to_string).collect()
    }

    /// Snapshot of both persisted tables.
    pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
        let mut dir = Self::new();

        let mut stmt = conn.prepare("SELECT faculty, chapter, branch FROM faculty_assignments")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            dir.assignments.insert(row?);
        }

        let mut stmt = conn.prepare("SELECT chapter, required_raw FROM chapter_requirements")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (chapter, raw) = row?;
            dir.requirements.insert(chapter, raw);
        }

        Ok(dir)
    }
}

impl AssignmentDirectory for Directory {
    fn is_assigned(&self, faculty: &str, chapter: &str, branch: &str) -> bool {
        self.assignments.contains(&(
            faculty.to_string(),
            chapter.to_string(),
            branch.to_string(),
        ))
    }
}

impl RequirementTable for Directory {
    fn required_lecture_count(&self, chapter: &str) -> u32 {
        self.requirements
            .get(chapter)
            .map(|raw| parse_required_count(raw))
            .unwrap_or(0)
    }
}

/// Returns true when the assignment was newly added.
pub fn assign(conn: &Connection, faculty: &str, chapter: &str, branch: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO faculty_assignments(faculty, chapter, branch) VALUES(?1, ?2, ?3)",
        params![faculty.trim(), chapter.trim(), branch.trim()],
    )?;
    Ok(n > 0)
}

pub fn unassign(conn: &Connection, faculty: &str, chapter: &str, branch: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "DELETE FROM faculty_assignments WHERE faculty = ?1 AND chapter = ?2 AND branch = ?3",
        params![faculty.trim(), chapter.trim(), branch.trim()],
    )?;
    Ok(n > 0)
}

/// Stores the raw value as entered; parsing happens on read.
pub fn set_requirement(conn: &Connection, chapter: &str, raw: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO chapter_requirements(chapter, required_raw) VALUES(?1, ?2)
         ON CONFLICT(chapter) DO UPDATE SET required_raw = excluded.required_raw",
        params![chapter.trim(), raw.trim()],
    )?;
    Ok(())
}
