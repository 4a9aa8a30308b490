//! Archive naming and day partitions.
//!
//! Files are laid out as
//! `<root>/<yyyy_MM_dd>/<subject>_<HH-mm-ss>_<seq>.<ext>`, where `seq` is one
//! more than the number of that subject's archives already in the partition.
//! The result depends only on the directory listing and the clock reading.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use regex::Regex;

use crate::error::Result;

/// Directory name format for a day partition.
pub const PARTITION_FORMAT: &str = "%Y_%m_%d";

/// Directory of the day partition for `date` under `root`.
pub fn day_partition(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(date.format(PARTITION_FORMAT).to_string())
}

/// Replace characters that are unsafe in file names.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Computes collision-free archive paths.
#[derive(Debug, Clone)]
pub struct NamingPolicy {
    extension: String,
}

impl NamingPolicy {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Archive file extension, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn subject_pattern(&self, subject: &str) -> Result<Regex> {
        let pattern = format!(
            r"^{}_\d{{2}}-\d{{2}}-\d{{2}}_\d+\.{}$",
            regex::escape(subject),
            regex::escape(&self.extension)
        );
        Ok(Regex::new(&pattern)?)
    }

    /// Count the subject's archives already present in `base_dir`.
    pub fn existing_count(&self, base_dir: &Path, subject_name: &str) -> Result<usize> {
        let subject = sanitize_name(subject_name);
        let pattern = self.subject_pattern(&subject)?;

        let entries = match fs::read_dir(base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        for entry in entries {
            let entry = entry?;
            if pattern.is_match(&entry.file_name().to_string_lossy()) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// The next free archive path for a subject.
    ///
    /// Two requests in the same second get different sequence numbers once
    /// the first file exists; an existing file is never returned.
    pub fn next_path(
        &self,
        base_dir: &Path,
        subject_name: &str,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        let subject = sanitize_name(subject_name);
        let time = now.format("%H-%M-%S");
        let mut seq = self.existing_count(base_dir, &subject)? + 1;
        loop {
            let candidate = base_dir.join(format!("{}_{}_{}.{}", subject, time, seq, self.extension));
            if !candidate.exists() {
                return Ok(candidate);
            }
            seq += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 17, 12, 30, 5).earliest().unwrap()
    }

    #[test]
    fn test_day_partition_format() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(
            day_partition(Path::new("/rec"), date),
            PathBuf::from("/rec/2024_01_09")
        );
    }

    #[test]
    fn test_first_path_in_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let policy = NamingPolicy::new("mcpr");
        let path = policy.next_path(tmp.path(), "alice", noon()).unwrap();
        assert_eq!(path, tmp.path().join("alice_12-30-05_1.mcpr"));
    }

    #[test]
    fn test_missing_dir_counts_zero() {
        let tmp = TempDir::new().unwrap();
        let policy = NamingPolicy::new("mcpr");
        let path = policy
            .next_path(&tmp.path().join("not-yet"), "alice", noon())
            .unwrap();
        assert!(path.ends_with("alice_12-30-05_1.mcpr"));
    }

    #[test]
    fn test_sequence_counts_only_this_subject() {
        let tmp = TempDir::new().unwrap();
        for name in [
            "alice_08-00-00_1.mcpr",
            "alice_09-00-00_2.mcpr",
            "bob_09-00-00_1.mcpr",
            "alice_notes.txt",
            "alicex_09-00-00_1.mcpr",
        ] {
            fs::write(tmp.path().join(name), b"").unwrap();
        }
        let policy = NamingPolicy::new("mcpr");
        assert_eq!(policy.existing_count(tmp.path(), "alice").unwrap(), 2);
        let path = policy.next_path(tmp.path(), "alice", noon()).unwrap();
        assert!(path.ends_with("alice_12-30-05_3.mcpr"));
    }

    #[test]
    fn test_same_second_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let policy = NamingPolicy::new("mcpr");
        let mut seen = HashSet::new();
        for _ in 0..5 {
            let path = policy.next_path(tmp.path(), "alice", noon()).unwrap();
            assert!(!path.exists());
            fs::write(&path, b"").unwrap();
            assert!(seen.insert(path));
        }
    }

    #[test]
    fn test_gap_after_deletion_skips_existing() {
        let tmp = TempDir::new().unwrap();
        let policy = NamingPolicy::new("mcpr");
        // seq 1 deleted, seq 2 still present with the same timestamp
        fs::write(tmp.path().join("alice_12-30-05_2.mcpr"), b"").unwrap();
        let path = policy.next_path(tmp.path(), "alice", noon()).unwrap();
        assert!(path.ends_with("alice_12-30-05_3.mcpr"));
    }

    #[test]
    fn test_deterministic() {
        let tmp = TempDir::new().unwrap();
        let policy = NamingPolicy::new("mcpr");
        let a = policy.next_path(tmp.path(), "alice", noon()).unwrap();
        let b = policy.next_path(tmp.path(), "alice", noon()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_name("Steve"), "Steve");
        assert_eq!(sanitize_name("a b"), "a_b");
        assert_eq!(sanitize_name(""), "unnamed");
    }
}
