//! Shot file reconciliation.
//!
//! After a recording cycle the newest file in a camera's export directory
//! should be the movie for the shot that just happened. Reconciliation
//! makes sure it carries that shot's name, and refuses when the evidence
//! says otherwise:
//!
//! - no files at all: [`Outcome::Missing`]
//! - newest file already has the expected name and was written after the
//!   shot number changed: [`Outcome::AlreadyCorrect`]
//! - newest file predates the shot (left over from an earlier one): [`Outcome::Stale`]
//! - the expected name is taken by some other file: [`Outcome::Ambiguous`]
//! - otherwise the newest file is renamed: [`Outcome::Renamed`]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::model::{ExportedFile, FilenamePattern};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Renamed,
    AlreadyCorrect,
    Ambiguous,
    Stale,
    Missing,
}

impl Outcome {
    /// Whether the expected shot now has a correctly named file.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Renamed | Self::AlreadyCorrect)
    }
}

/// The result of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub outcome: Outcome,

    /// The correctly named file on success, otherwise the newest file looked at.
    pub file: Option<PathBuf>,

    /// Number of files in the export directory.
    pub files_seen: usize,
}

/// When a file counts as belonging to the current shot.
#[derive(Debug, Clone, Copy)]
pub struct Freshness {
    /// When the expected shot number appeared, if known.
    pub shot_changed_at: Option<Timestamp>,

    /// Files older than this cannot be from the latest shot.
    pub max_age: SignedDuration,
}

impl Freshness {
    fn is_stale(&self, file: &ExportedFile) -> bool {
        self.predates_shot_change(file) || file.age > self.max_age
    }

    fn predates_shot_change(&self, file: &ExportedFile) -> bool {
        self.shot_changed_at.is_some_and(|t| file.modified_at < t)
    }
}

/// List the files in `export_dir`, newest first.
///
/// Dot-files (lock or marker files some acquisition software leaves behind)
/// are skipped.
pub fn scan(
    export_dir: &Path,
    pattern: &FilenamePattern,
    now: Timestamp,
) -> Result<Vec<ExportedFile>, ReconcileError> {
    let scan_err = |source| ReconcileError::Scan {
        path: export_dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(export_dir).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let metadata = entry.metadata().map_err(scan_err)?;
        if !metadata.is_file() {
            continue;
        }
        let modified_at = timestamp(metadata.modified().map_err(scan_err)?);
        files.push(ExportedFile {
            path: entry.path(),
            modified_at,
            age: now.duration_since(modified_at),
            shot: pattern.shot_from(&name),
        });
    }
    files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    Ok(files)
}

fn timestamp(time: SystemTime) -> Timestamp {
    Timestamp::try_from(time).unwrap_or(Timestamp::UNIX_EPOCH)
}

/// Match the newest file in `export_dir` to `expected_shot`.
///
/// Calling this again on a directory it already reconciled is a no-op that
/// reports [`Outcome::AlreadyCorrect`].
pub fn reconcile(
    export_dir: &Path,
    expected_shot: u32,
    pattern: &FilenamePattern,
    freshness: Freshness,
    now: Timestamp,
) -> Result<Reconciliation, ReconcileError> {
    let files = scan(export_dir, pattern, now)?;
    let files_seen = files.len();
    let done = |outcome, file| Reconciliation {
        outcome,
        file,
        files_seen,
    };

    let Some(newest) = files.first() else {
        return Ok(done(Outcome::Missing, None));
    };
    if newest.shot == Some(expected_shot) {
        // A copy left behind by an earlier cycle under the same number.
        if freshness.predates_shot_change(newest) {
            return Ok(done(Outcome::Stale, Some(newest.path.clone())));
        }
        return Ok(done(Outcome::AlreadyCorrect, Some(newest.path.clone())));
    }
    if freshness.is_stale(newest) {
        return Ok(done(Outcome::Stale, Some(newest.path.clone())));
    }

    let target = export_dir.join(pattern.render(expected_shot));
    if target.exists() {
        return Ok(done(Outcome::Ambiguous, Some(newest.path.clone())));
    }
    fs::rename(&newest.path, &target).map_err(|source| ReconcileError::Rename {
        from: newest.path.clone(),
        to: target.clone(),
        source,
    })?;
    Ok(done(Outcome::Renamed, Some(target)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs::File;

    use tempfile::TempDir;

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_second(1_800_000_000 + secs).unwrap()
    }

    fn write(dir: &Path, name: &str, at: Timestamp) {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::from(at))
            .unwrap();
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn pattern() -> FilenamePattern {
        FilenamePattern::parse("{shot}.ats").unwrap()
    }

    fn fresh_since(t: Timestamp) -> Freshness {
        Freshness {
            shot_changed_at: Some(t),
            max_age: SignedDuration::from_secs(180),
        }
    }

    #[test]
    fn empty_dir_is_missing() {
        let dir = TempDir::new().unwrap();

        let result = reconcile(dir.path(), 11, &pattern(), fresh_since(t(0)), t(100)).unwrap();

        assert_eq!(result.outcome, Outcome::Missing);
        assert_eq!(result.files_seen, 0);
    }

    #[test]
    fn renames_newest_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "10.ats", t(-300));
        write(dir.path(), "Rec-0001.ats", t(90));

        let result = reconcile(dir.path(), 11, &pattern(), fresh_since(t(0)), t(100)).unwrap();

        assert_eq!(result.outcome, Outcome::Renamed);
        assert_eq!(result.file, Some(dir.path().join("11.ats")));
        assert_eq!(result.files_seen, 2);
        assert_eq!(names(dir.path()), vec!["10.ats", "11.ats"]);
    }

    #[test]
    fn second_call_is_already_correct_without_mutation() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "11.ats", t(90));
        let before = names(dir.path());

        let first = reconcile(dir.path(), 11, &pattern(), fresh_since(t(0)), t(100)).unwrap();
        let second = reconcile(dir.path(), 11, &pattern(), fresh_since(t(0)), t(101)).unwrap();

        assert_eq!(first.outcome, Outcome::AlreadyCorrect);
        assert_eq!(second.outcome, Outcome::AlreadyCorrect);
        assert_eq!(names(dir.path()), before);
        assert_eq!(
            fs::metadata(dir.path().join("11.ats")).unwrap().modified().unwrap(),
            SystemTime::from(t(90))
        );
    }

    #[test]
    fn correctly_named_file_from_before_shot_change_is_stale() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "11.ats", t(-40));

        let result = reconcile(dir.path(), 11, &pattern(), fresh_since(t(0)), t(100)).unwrap();

        assert_eq!(result.outcome, Outcome::Stale);
        assert_eq!(result.file, Some(dir.path().join("11.ats")));
        assert_eq!(names(dir.path()), vec!["11.ats"]);
    }

    #[test]
    fn correctly_named_file_is_accepted_when_shot_change_unknown() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "11.ats", t(-40));
        let freshness = Freshness {
            shot_changed_at: None,
            max_age: SignedDuration::MAX,
        };

        let result = reconcile(dir.path(), 11, &pattern(), freshness, t(100)).unwrap();

        assert_eq!(result.outcome, Outcome::AlreadyCorrect);
    }

    #[test]
    fn file_older_than_shot_change_is_stale() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "10.ats", t(-20));

        let result = reconcile(dir.path(), 11, &pattern(), fresh_since(t(0)), t(100)).unwrap();

        assert_eq!(result.outcome, Outcome::Stale);
        assert_eq!(names(dir.path()), vec!["10.ats"]);
    }

    #[test]
    fn old_file_is_stale_when_shot_change_unknown() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "movie.ats", t(-200));
        let freshness = Freshness {
            shot_changed_at: None,
            max_age: SignedDuration::from_secs(180),
        };

        let result = reconcile(dir.path(), 11, &pattern(), freshness, t(0)).unwrap();

        assert_eq!(result.outcome, Outcome::Stale);
    }

    #[test]
    fn recent_file_is_renamed_when_shot_change_unknown() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "movie.ats", t(-20));
        let freshness = Freshness {
            shot_changed_at: None,
            max_age: SignedDuration::from_secs(180),
        };

        let result = reconcile(dir.path(), 11, &pattern(), freshness, t(0)).unwrap();

        assert_eq!(result.outcome, Outcome::Renamed);
    }

    #[test]
    fn taken_name_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "11.ats", t(10));
        write(dir.path(), "Rec-0002.ats", t(90));

        let result = reconcile(dir.path(), 11, &pattern(), fresh_since(t(0)), t(100)).unwrap();

        assert_eq!(result.outcome, Outcome::Ambiguous);
        assert_eq!(result.file, Some(dir.path().join("Rec-0002.ats")));
        assert_eq!(names(dir.path()), vec!["11.ats", "Rec-0002.ats"]);
    }

    #[test]
    fn dot_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Rec-0001.ats", t(50));
        write(dir.path(), ".space", t(90));

        let result = reconcile(dir.path(), 11, &pattern(), fresh_since(t(0)), t(100)).unwrap();

        assert_eq!(result.outcome, Outcome::Renamed);
        assert_eq!(result.files_seen, 1);
    }

    #[test]
    fn scan_orders_newest_first() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "1.ats", t(10));
        write(dir.path(), "3.ats", t(30));
        write(dir.path(), "2.ats", t(20));

        let files = scan(dir.path(), &pattern(), t(40)).unwrap();

        let shots: Vec<_> = files.iter().map(|f| f.shot).collect();
        assert_eq!(shots, vec![Some(3), Some(2), Some(1)]);
        assert_eq!(files[0].age, SignedDuration::from_secs(10));
    }

    #[test]
    fn missing_export_dir_is_an_error() {
        let dir = TempDir::new().unwrap();

        assert!(matches!(
            reconcile(&dir.path().join("absent"), 11, &pattern(), fresh_since(t(0)), t(0)),
            Err(ReconcileError::Scan { .. })
        ));
    }
}
