//! Document-level change detection (spec §4.5).

use crate::models::{DetectedChange, Document};

/// Classify the current file state against the previously-stored document.
///
/// `file_hash` equality is intentionally not consulted here: per the spec's
/// decision table, a changed `file_hash` with an unchanged `content_hash`
/// still resolves to `Unchanged` (only metadata changed, e.g. re-saved with
/// different whitespace that normalizes away). The tracker uses `file_hash`
/// separately, *before* this function runs, as a cheap short-circuit to
/// skip parsing entirely when both size and file hash already match.
pub fn detect_document_change(prior: Option<&Document>, content_hash: &str) -> DetectedChange {
    match prior {
        None => DetectedChange::Created,
        Some(doc) if doc.is_deleted => DetectedChange::Restored,
        Some(doc) if doc.content_hash == content_hash => DetectedChange::Unchanged,
        Some(_) => DetectedChange::Modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn doc(content_hash: &str, is_deleted: bool) -> Document {
        Document {
            id: Uuid::new_v4(),
            file_path: "/a.txt".into(),
            file_name: "a.txt".into(),
            file_type: "txt".into(),
            file_size: 10,
            content_hash: content_hash.into(),
            current_version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_deleted,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn no_prior_is_created() {
        assert_eq!(detect_document_change(None, "abc"), DetectedChange::Created);
    }

    #[test]
    fn deleted_prior_is_restored_regardless_of_hash() {
        let d = doc("abc", true);
        assert_eq!(detect_document_change(Some(&d), "abc"), DetectedChange::Restored);
        assert_eq!(detect_document_change(Some(&d), "xyz"), DetectedChange::Restored);
    }

    #[test]
    fn matching_content_hash_is_unchanged() {
        let d = doc("abc", false);
        assert_eq!(detect_document_change(Some(&d), "abc"), DetectedChange::Unchanged);
    }

    #[test]
    fn differing_content_hash_is_modified() {
        let d = doc("abc", false);
        assert_eq!(detect_document_change(Some(&d), "xyz"), DetectedChange::Modified);
    }
}
