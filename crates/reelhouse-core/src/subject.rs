//! Recorded subjects and the recording filter.

use uuid::Uuid;

use crate::config::{CheckBy, FilterConfig, RecordMode};

/// A live entity that can be recorded.
///
/// Sessions hold subjects only to ask whether they are still around; the
/// host owns the actual entity and may drop it at any time.
pub trait Subject: Send + Sync {
    /// Stable subject id.
    fn id(&self) -> Uuid;

    /// Display name, used for archive file names and metadata.
    fn name(&self) -> &str;

    /// Whether the subject is still connected.
    fn is_online(&self) -> bool;
}

/// Decides whether a subject should be recorded, per the configured
/// blacklist/whitelist policy.
#[derive(Debug, Clone)]
pub struct RecordingFilter {
    mode: RecordMode,
    check_by: CheckBy,
    entries: Vec<String>,
}

impl RecordingFilter {
    /// Build a filter from configuration. Only the list for the active mode
    /// is retained.
    pub fn from_config(config: &FilterConfig) -> Self {
        let list = match config.mode {
            RecordMode::Blacklist => &config.blacklist,
            RecordMode::Whitelist => &config.whitelist,
        };
        let entries = list
            .iter()
            .map(|e| match config.check_by {
                CheckBy::Name => e.to_lowercase(),
                CheckBy::Uuid => e.trim().to_lowercase(),
            })
            .collect();
        Self {
            mode: config.mode,
            check_by: config.check_by,
            entries,
        }
    }

    /// A filter that records everyone.
    pub fn allow_all() -> Self {
        Self {
            mode: RecordMode::Blacklist,
            check_by: CheckBy::Name,
            entries: vec![],
        }
    }

    fn listed(&self, subject: &dyn Subject) -> bool {
        let needle = match self.check_by {
            CheckBy::Name => subject.name().to_lowercase(),
            CheckBy::Uuid => subject.id().to_string(),
        };
        self.entries.iter().any(|e| *e == needle)
    }

    /// Whether the subject passes the filter.
    ///
    /// Name comparison is case-insensitive. An empty whitelist records
    /// everyone.
    pub fn should_record(&self, subject: &dyn Subject) -> bool {
        match self.mode {
            RecordMode::Blacklist => !self.listed(subject),
            RecordMode::Whitelist => self.entries.is_empty() || self.listed(subject),
        }
    }
}

impl Default for RecordingFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, Uuid);

    impl Subject for Named {
        fn id(&self) -> Uuid {
            self.1
        }
        fn name(&self) -> &str {
            self.0
        }
        fn is_online(&self) -> bool {
            true
        }
    }

    fn filter(mode: RecordMode, check_by: CheckBy, list: &[&str]) -> RecordingFilter {
        let list: Vec<String> = list.iter().map(|s| s.to_string()).collect();
        let config = FilterConfig {
            mode,
            check_by,
            blacklist: list.clone(),
            whitelist: list,
        };
        RecordingFilter::from_config(&config)
    }

    #[test]
    fn test_blacklist_by_name_is_case_insensitive() {
        let f = filter(RecordMode::Blacklist, CheckBy::Name, &["Steve"]);
        assert!(!f.should_record(&Named("steve", Uuid::new_v4())));
        assert!(f.should_record(&Named("alex", Uuid::new_v4())));
    }

    #[test]
    fn test_whitelist_by_uuid() {
        let id = Uuid::new_v4();
        let f = filter(RecordMode::Whitelist, CheckBy::Uuid, &[&id.to_string()]);
        assert!(f.should_record(&Named("anyone", id)));
        assert!(!f.should_record(&Named("anyone", Uuid::new_v4())));
    }

    #[test]
    fn test_empty_whitelist_records_everyone() {
        let f = filter(RecordMode::Whitelist, CheckBy::Name, &[]);
        assert!(f.should_record(&Named("alex", Uuid::new_v4())));
    }

    #[test]
    fn test_allow_all() {
        assert!(RecordingFilter::allow_all().should_record(&Named("x", Uuid::nil())));
    }
}
