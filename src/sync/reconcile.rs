// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::archive::{Archive, ArchiveStore, EpisodeRecord, VersionEntry, VersionKind};
use crate::error::ArchiveError;

/// Records whose presence no longer matches the feed, by canonical URL
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_delete: Vec<String>,
    pub to_restore: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_restore.is_empty()
    }
}

/// Compare the archive against the set of canonical URLs the feed
/// currently carries. Live records missing from the feed are deletion
/// candidates; quarantined records present again are restore
/// candidates.
pub fn plan_reconcile(archive: &Archive, seen: &HashSet<String>) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for record in archive.records() {
        let present = seen.contains(&record.canonical_url);
        if !record.deleted && !present {
            plan.to_delete.push(record.canonical_url.clone());
        } else if record.deleted && present {
            plan.to_restore.push(record.canonical_url.clone());
        }
    }

    plan
}

/// Quarantine an episode that vanished from the feed.
///
/// The artifact, its sidecar, and all backups move into the quarantine
/// subdirectory together, and a deletion entry joins the history. A
/// record that was never downloaded is only flagged; there are no
/// files to move and nothing worth an entry. Returns whether files
/// were quarantined.
pub fn delete_episode(
    store: &ArchiveStore,
    record: &mut EpisodeRecord,
    now: DateTime<Utc>,
) -> Result<bool, ArchiveError> {
    if record.downloaded
        && let Some(filename) = record.current_filename.clone()
    {
        store.quarantine_family(&filename)?;

        record.push_version(VersionEntry {
            filename,
            kind: VersionKind::Deleted,
            archived_at: now,
            reason: "Removed from feed".to_string(),
            file_hash: record.content_hash.clone(),
            is_current: false,
        });
        record.deleted = true;
        record.current_filename = None;

        Ok(true)
    } else {
        record.deleted = true;
        Ok(false)
    }
}

/// Bring a quarantined episode back after it reappeared in the feed.
///
/// The file family moves back out of quarantine and the artifact named
/// by the deletion entry becomes current again. Returns whether files
/// were restored.
pub fn restore_episode(
    store: &ArchiveStore,
    record: &mut EpisodeRecord,
    now: DateTime<Utc>,
) -> Result<bool, ArchiveError> {
    record.deleted = false;

    let Some(filename) = record.last_deleted_entry().map(|e| e.filename.clone()) else {
        return Ok(false);
    };

    store.restore_family(&filename)?;

    record.push_version(VersionEntry {
        filename: filename.clone(),
        kind: VersionKind::Current,
        archived_at: now,
        reason: "Restored".to_string(),
        file_hash: record.content_hash.clone(),
        is_current: true,
    });
    record.current_filename = Some(filename);

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    const FILENAME: &str = "2024-01-15-0011aabbccdd.mp3";

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    fn downloaded_record(url: &str, local_id: &str) -> EpisodeRecord {
        let mut record = EpisodeRecord::new(
            url.to_string(),
            local_id.to_string(),
            "Episode".to_string(),
            None,
            None,
        );
        record.downloaded = true;
        record.current_filename = Some(FILENAME.to_string());
        record.content_hash = Some("abc123".to_string());
        record.push_version(VersionEntry {
            filename: FILENAME.to_string(),
            kind: VersionKind::Current,
            archived_at: at(10),
            reason: "Initial download".to_string(),
            file_hash: Some("abc123".to_string()),
            is_current: true,
        });
        record
    }

    fn bare_record(url: &str, local_id: &str) -> EpisodeRecord {
        EpisodeRecord::new(
            url.to_string(),
            local_id.to_string(),
            "Episode".to_string(),
            None,
            None,
        )
    }

    #[test]
    fn plan_selects_vanished_and_reappeared_records() {
        let mut archive = Archive::new();
        archive
            .insert_new(downloaded_record("https://example.com/gone", "2024-01-01-aaaa"))
            .unwrap();
        archive
            .insert_new(downloaded_record("https://example.com/stays", "2024-01-02-bbbb"))
            .unwrap();
        archive
            .insert_new(bare_record("https://example.com/never-fetched", "2024-01-03-cccc"))
            .unwrap();

        let mut returned = downloaded_record("https://example.com/back", "2024-01-04-dddd");
        returned.deleted = true;
        archive.insert_new(returned).unwrap();

        let mut still_gone = downloaded_record("https://example.com/still-gone", "2024-01-05-eeee");
        still_gone.deleted = true;
        archive.insert_new(still_gone).unwrap();

        let seen: HashSet<String> = [
            "https://example.com/stays".to_string(),
            "https://example.com/back".to_string(),
        ]
        .into();

        let plan = plan_reconcile(&archive, &seen);
        assert_eq!(
            plan.to_delete,
            vec![
                "https://example.com/gone".to_string(),
                "https://example.com/never-fetched".to_string(),
            ]
        );
        assert_eq!(plan.to_restore, vec!["https://example.com/back".to_string()]);
    }

    #[test]
    fn delete_quarantines_family_and_records_entry() {
        let dir = tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut record = downloaded_record("https://example.com/ep1", "2024-01-01-aaaa");

        std::fs::write(store.artifact_path(FILENAME), b"audio").unwrap();
        std::fs::write(store.sidecar_path(FILENAME), b"{}").unwrap();

        let moved = delete_episode(&store, &mut record, at(12)).unwrap();
        assert!(moved);

        assert!(!store.artifact_path(FILENAME).exists());
        assert!(dir.path().join("deleted").join(FILENAME).exists());

        assert!(record.deleted);
        assert_eq!(record.current_filename, None);

        let last = record.versions.last().unwrap();
        assert_eq!(last.kind, VersionKind::Deleted);
        assert_eq!(last.reason, "Removed from feed");
        assert_eq!(last.filename, FILENAME);
        assert_eq!(last.file_hash.as_deref(), Some("abc123"));

        // Nothing is current while quarantined.
        assert!(record.versions.iter().all(|v| !v.is_current));
    }

    #[test]
    fn delete_of_never_downloaded_record_only_flags() {
        let dir = tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut record = bare_record("https://example.com/ep1", "2024-01-01-aaaa");

        let moved = delete_episode(&store, &mut record, at(12)).unwrap();
        assert!(!moved);
        assert!(record.deleted);
        assert!(record.versions.is_empty());
        assert!(!dir.path().join("deleted").exists());
    }

    #[test]
    fn restore_brings_family_back_and_marks_current() {
        let dir = tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut record = downloaded_record("https://example.com/ep1", "2024-01-01-aaaa");

        std::fs::write(store.artifact_path(FILENAME), b"audio").unwrap();
        std::fs::write(store.sidecar_path(FILENAME), b"{}").unwrap();
        delete_episode(&store, &mut record, at(12)).unwrap();

        let restored = restore_episode(&store, &mut record, at(13)).unwrap();
        assert!(restored);

        assert!(store.artifact_path(FILENAME).exists());
        assert!(store.sidecar_path(FILENAME).exists());
        assert!(!dir.path().join("deleted").join(FILENAME).exists());

        assert!(!record.deleted);
        assert_eq!(record.current_filename.as_deref(), Some(FILENAME));

        let last = record.versions.last().unwrap();
        assert_eq!(last.kind, VersionKind::Current);
        assert_eq!(last.reason, "Restored");
        assert!(last.is_current);
        assert_eq!(record.current_entry(), Some(last));
    }

    #[test]
    fn restore_of_never_downloaded_record_only_clears_flag() {
        let dir = tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let mut record = bare_record("https://example.com/ep1", "2024-01-01-aaaa");
        record.deleted = true;

        let restored = restore_episode(&store, &mut record, at(13)).unwrap();
        assert!(!restored);
        assert!(!record.deleted);
        assert!(record.versions.is_empty());
    }
}
