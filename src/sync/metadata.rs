//! Item metadata exchanged with the remote archive

use crate::disk::DiskRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Metadata of one archive item. List fields compare as unordered sets.
///
/// Languages are published and pulled but never count as a difference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    pub title: String,
    pub description: String,
    pub mediatype: String,
    pub date: String,
    pub creators: Vec<String>,
    pub subjects: Vec<String>,
    pub collections: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

fn as_set(values: &[String]) -> BTreeSet<&str> {
    values.iter().map(String::as_str).collect()
}

fn same_set(a: &[String], b: &[String]) -> bool {
    as_set(a) == as_set(b)
}

impl RemoteMetadata {
    /// Metadata the local record would publish.
    pub fn from_record(record: &DiskRecord) -> Self {
        let meta = &record.metadata;
        Self {
            title: record.title.clone(),
            description: meta.description.clone(),
            mediatype: meta.mediatype.to_lowercase(),
            date: meta.date.clone(),
            creators: meta.creators.clone(),
            subjects: meta.subjects.clone(),
            collections: meta.collections.clone(),
            languages: meta.languages.clone(),
        }
    }

    /// Human-readable differences between `self` (local) and `remote`.
    /// Empty when the two are in sync.
    pub fn differences(&self, remote: &RemoteMetadata) -> Vec<String> {
        let mut diffs = Vec::new();
        if self.title != remote.title {
            diffs.push(format!(
                "Title: local='{}' vs archive='{}'",
                self.title, remote.title
            ));
        }
        if self.description != remote.description {
            diffs.push(format!(
                "Description differs (length: local={}, archive={})",
                self.description.chars().count(),
                remote.description.chars().count()
            ));
        }
        if self.mediatype != remote.mediatype {
            diffs.push(format!(
                "Media type: local='{}' vs archive='{}'",
                self.mediatype, remote.mediatype
            ));
        }
        if self.date != remote.date {
            diffs.push(format!(
                "Date: local='{}' vs archive='{}'",
                self.date, remote.date
            ));
        }
        if !same_set(&self.creators, &remote.creators) {
            diffs.push(format!(
                "Creators: local={:?} vs archive={:?}",
                self.creators, remote.creators
            ));
        }
        if !same_set(&self.subjects, &remote.subjects) {
            diffs.push(format!(
                "Subjects differ (local={}, archive={})",
                self.subjects.len(),
                remote.subjects.len()
            ));
        }
        if !same_set(&self.collections, &remote.collections) {
            diffs.push(format!(
                "Collections differ (local={}, archive={})",
                self.collections.len(),
                remote.collections.len()
            ));
        }
        diffs
    }

    /// Copy the non-empty fields of `self` into `record`, returning what changed.
    pub fn apply_to(&self, record: &mut DiskRecord) -> Vec<String> {
        let mut changes = Vec::new();
        let meta = &mut record.metadata;

        if !self.title.is_empty() && record.title != self.title {
            changes.push(format!("Title: '{}' -> '{}'", record.title, self.title));
            record.title = self.title.clone();
        }
        if !self.description.is_empty() && meta.description != self.description {
            changes.push(format!(
                "Description updated (length: {} chars)",
                self.description.chars().count()
            ));
            meta.description = self.description.clone();
        }
        if !self.mediatype.is_empty() && meta.mediatype != self.mediatype {
            changes.push(format!(
                "Media type: {} -> {}",
                meta.mediatype, self.mediatype
            ));
            meta.mediatype = self.mediatype.clone();
        }
        if !self.date.is_empty() && meta.date != self.date {
            changes.push(format!("Date: '{}' -> '{}'", meta.date, self.date));
            meta.date = self.date.clone();
        }
        if !self.creators.is_empty() && !same_set(&meta.creators, &self.creators) {
            changes.push(format!("Creators: {} from archive", self.creators.len()));
            meta.creators = self.creators.clone();
        }
        if !self.subjects.is_empty() && !same_set(&meta.subjects, &self.subjects) {
            changes.push(format!("Subjects: {} from archive", self.subjects.len()));
            meta.subjects = self.subjects.clone();
        }
        if !self.collections.is_empty() && !same_set(&meta.collections, &self.collections) {
            changes.push(format!(
                "Collections: {} from archive",
                self.collections.len()
            ));
            meta.collections = self.collections.clone();
        }
        if !self.languages.is_empty() && !same_set(&meta.languages, &self.languages) {
            changes.push(format!("Languages: {} from archive", self.languages.len()));
            meta.languages = self.languages.clone();
        }

        if !changes.is_empty() {
            record.touch();
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiskId;
    use std::path::PathBuf;

    fn record() -> DiskRecord {
        let mut record = DiskRecord::new(
            DiskId::new("victor-basic"),
            "Victor BASIC",
            PathBuf::from("/m/Victor BASIC"),
        );
        record.metadata.creators = vec!["Victor".into(), "Microsoft".into()];
        record.metadata.collections = vec!["softwarelibrary".into()];
        record
    }

    #[test]
    fn test_identical_metadata_has_no_differences() {
        let local = RemoteMetadata::from_record(&record());
        let mut remote = local.clone();
        remote.creators.reverse();
        assert!(local.differences(&remote).is_empty());
    }

    #[test]
    fn test_differences_are_described() {
        let local = RemoteMetadata::from_record(&record());
        let mut remote = local.clone();
        remote.title = "Victor BASIC 1.1".into();
        remote.subjects = vec!["basic".into()];

        let diffs = local.differences(&remote);
        assert_eq!(diffs.len(), 2);
        assert_eq!(
            diffs[0],
            "Title: local='Victor BASIC' vs archive='Victor BASIC 1.1'"
        );
        assert_eq!(diffs[1], "Subjects differ (local=0, archive=1)");
    }

    #[test]
    fn test_apply_copies_only_non_empty_fields() {
        let mut target = record();
        let remote = RemoteMetadata {
            title: "Victor BASIC 1.1".into(),
            date: "1983".into(),
            ..Default::default()
        };

        let changes = remote.apply_to(&mut target);
        assert_eq!(changes.len(), 2);
        assert_eq!(target.title, "Victor BASIC 1.1");
        assert_eq!(target.metadata.date, "1983");
        // Empty remote lists leave local ones alone.
        assert_eq!(target.metadata.creators.len(), 2);
        assert_eq!(target.metadata.mediatype, "software");
    }

    #[test]
    fn test_languages_are_pulled_but_never_a_difference() {
        let mut target = record();
        target.metadata.languages = vec!["English".into()];
        let local = RemoteMetadata::from_record(&target);
        let mut remote = local.clone();
        remote.languages = vec!["German".into()];
        assert!(local.differences(&remote).is_empty());

        let changes = remote.apply_to(&mut target);
        assert_eq!(changes, vec!["Languages: 1 from archive".to_string()]);
        assert_eq!(target.metadata.languages, vec!["German"]);
    }

    #[test]
    fn test_apply_is_a_no_op_when_equal() {
        let mut target = record();
        let remote = RemoteMetadata::from_record(&target);
        assert!(remote.apply_to(&mut target).is_empty());
    }
}
