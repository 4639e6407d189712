use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const LOOSE_FILES_LABEL: &str = "Files";

/// Durable record of one resumable batch. Serialized as a flat JSON object
/// into the single session slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: String,
    /// Unix time in milliseconds.
    pub created_at: i64,
    pub total_count: usize,
    pub batch_label: String,
    /// Every relative path of the original selection. Fixed at creation.
    #[serde(default)]
    pub batch_paths: BTreeSet<String>,
    #[serde(default)]
    pub completed_paths: BTreeSet<String>,
    pub target_folder_id: String,
}

impl UploadSession {
    pub fn new<P>(
        target_folder_id: impl Into<String>,
        batch_paths: impl IntoIterator<Item = P>,
        batch_label: String,
    ) -> Self
    where
        P: Into<String>,
    {
        let batch_paths: BTreeSet<String> = batch_paths.into_iter().map(Into::into).collect();
        let now = OffsetDateTime::now_utc();
        let created_at = (now.unix_timestamp_nanos() / 1_000_000) as i64;
        Self {
            id: format!("{created_at:x}-{:08x}", rand::random::<u32>()),
            created_at,
            total_count: batch_paths.len(),
            batch_label,
            batch_paths,
            completed_paths: BTreeSet::new(),
            target_folder_id: target_folder_id.into(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.batch_paths.contains(path)
    }

    /// Returns `false` when the path was already recorded or is not part of
    /// this batch; `completed_paths` never leaves `batch_paths`.
    pub fn mark_completed(&mut self, path: &str) -> bool {
        self.contains(path) && self.completed_paths.insert(path.to_string())
    }

    pub fn is_completed(&self, path: &str) -> bool {
        self.completed_paths.contains(path)
    }

    pub fn completed_count(&self) -> usize {
        self.completed_paths.len()
    }

    pub fn percent_complete(&self) -> u8 {
        if self.total_count == 0 {
            return 100;
        }
        let done = self.completed_count().min(self.total_count);
        ((done * 100 + self.total_count / 2) / self.total_count) as u8
    }
}

/// The first segment of the first item's relative path, or a generic label
/// for loose file selections.
pub fn batch_label_for(first_relative_path: Option<&str>) -> String {
    first_relative_path
        .and_then(|path| path.split('/').next())
        .filter(|root| !root.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| LOOSE_FILES_LABEL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_empty_with_fixed_total() {
        let session = UploadSession::new(
            "folder-1",
            ["Photos/a", "Photos/b", "Photos/c", "Photos/d"],
            "Photos".into(),
        );
        assert_eq!(session.total_count, 4);
        assert!(session.contains("Photos/c"));
        assert_eq!(session.target_folder_id, "folder-1");
        assert!(session.completed_paths.is_empty());
        assert!(session.created_at > 0);
        assert!(!session.id.is_empty());
    }

    #[test]
    fn marking_a_path_twice_records_it_once() {
        let mut session = UploadSession::new("f", ["a.txt", "b.txt"], "Files".into());
        assert!(session.mark_completed("a.txt"));
        assert!(!session.mark_completed("a.txt"));
        assert_eq!(session.completed_count(), 1);
        assert!(session.is_completed("a.txt"));
    }

    #[test]
    fn paths_outside_the_batch_are_never_completed() {
        let mut session = UploadSession::new("f", ["Photos/a.jpg"], "Photos".into());
        assert!(!session.mark_completed("Other/x.jpg"));
        assert!(session.completed_paths.is_empty());

        let duplicated = UploadSession::new("f", ["a", "a", "b"], "Files".into());
        assert_eq!(duplicated.total_count, 2);
    }

    #[test]
    fn percent_complete_rounds() {
        let mut session = UploadSession::new("f", ["a", "b", "c"], "Files".into());
        assert_eq!(session.percent_complete(), 0);
        session.mark_completed("a");
        assert_eq!(session.percent_complete(), 33);
        session.mark_completed("b");
        assert_eq!(session.percent_complete(), 67);
    }

    #[test]
    fn batch_label_uses_root_segment_or_generic_label() {
        assert_eq!(batch_label_for(Some("Photos/2024/a.jpg")), "Photos");
        assert_eq!(batch_label_for(Some("a.jpg")), "a.jpg");
        assert_eq!(batch_label_for(None), "Files");
        assert_eq!(batch_label_for(Some("")), "Files");
    }

    #[test]
    fn serializes_as_flat_camel_case_object() {
        let mut session = UploadSession::new("f", ["Docs/a.txt"], "Docs".into());
        session.mark_completed("Docs/a.txt");
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["totalCount"], 1);
        assert_eq!(value["batchLabel"], "Docs");
        assert_eq!(value["targetFolderId"], "f");
        assert_eq!(value["batchPaths"][0], "Docs/a.txt");
        assert_eq!(value["completedPaths"][0], "Docs/a.txt");

        let parsed: UploadSession = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, session);
    }
}
