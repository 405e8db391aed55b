use chrono::{DateTime, Utc};

use crate::archive::{ArchiveStore, EpisodeRecord, EpisodeSidecar, VersionEntry, VersionKind};
use crate::episode::FetchedArtifact;
use crate::error::ArchiveError;
use crate::feed::EpisodeDescriptor;

use super::change::MetadataDelta;

/// Timestamp format used in backup filenames
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

fn backup_timestamp(now: DateTime<Utc>) -> String {
    now.format(BACKUP_TIMESTAMP_FORMAT).to_string()
}

/// Record a download that materializes an episode: the first one, or a
/// re-download after the artifact went missing on disk.
///
/// Promotes the partial into place, writes the sidecar, and appends
/// the current entry. Metadata from the feed is taken as-is; before
/// the first download there is no artifact a metadata entry could
/// reference.
pub fn record_download(
    store: &ArchiveStore,
    record: &mut EpisodeRecord,
    descriptor: &EpisodeDescriptor,
    filename: &str,
    fetched: &FetchedArtifact,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), ArchiveError> {
    adopt_orphaned_backups(store, record, filename, now)?;

    store.promote_partial(filename)?;

    apply_descriptor_metadata(record, descriptor);
    record.content_hash = Some(fetched.content_hash.clone());
    record.content_length = Some(fetched.bytes_len);
    record.cache_token = fetched
        .cache_token
        .clone()
        .or_else(|| descriptor.cache_token.clone());
    record.downloaded = true;
    record.current_filename = Some(filename.to_string());

    let sidecar = EpisodeSidecar::from_record(record, filename, &descriptor.enclosure_url, now);
    store.write_sidecar(filename, &sidecar)?;

    record.push_version(VersionEntry {
        filename: filename.to_string(),
        kind: VersionKind::Current,
        archived_at: now,
        reason: reason.to_string(),
        file_hash: Some(fetched.content_hash.clone()),
        is_current: true,
    });

    Ok(())
}

/// Apply a confirmed content change: archive the superseded artifact
/// and sidecar under backup names, move the new content into place,
/// and append the entries describing what happened.
///
/// The backup rename strictly precedes the new content rename, so an
/// interruption can lose the new download but never the old artifact.
pub fn apply_content_change(
    store: &ArchiveStore,
    record: &mut EpisodeRecord,
    descriptor: &EpisodeDescriptor,
    filename: &str,
    fetched: &FetchedArtifact,
    delta: &MetadataDelta,
    now: DateTime<Utc>,
) -> Result<(), ArchiveError> {
    adopt_orphaned_backups(store, record, filename, now)?;

    let timestamp = backup_timestamp(now);
    let artifact_backup = store.preserve_artifact(filename, &timestamp)?;
    let sidecar_backup = store.preserve_sidecar(filename, &timestamp)?;

    if !delta.is_empty()
        && let Some(backup_name) = sidecar_backup
    {
        record.push_version(VersionEntry {
            filename: backup_name,
            kind: VersionKind::Metadata,
            archived_at: now,
            reason: format!("Metadata changed: {}", delta.describe()),
            file_hash: None,
            is_current: false,
        });
    }

    if let Some(backup_name) = artifact_backup {
        record.push_version(VersionEntry {
            filename: backup_name,
            kind: VersionKind::Content,
            archived_at: now,
            reason: "Content changed".to_string(),
            file_hash: record.content_hash.clone(),
            is_current: false,
        });
    }

    store.promote_partial(filename)?;

    apply_descriptor_metadata(record, descriptor);
    record.content_hash = Some(fetched.content_hash.clone());
    record.content_length = Some(fetched.bytes_len);
    record.cache_token = fetched
        .cache_token
        .clone()
        .or_else(|| descriptor.cache_token.clone());
    record.downloaded = true;
    record.current_filename = Some(filename.to_string());

    let sidecar = EpisodeSidecar::from_record(record, filename, &descriptor.enclosure_url, now);
    store.write_sidecar(filename, &sidecar)?;

    record.push_version(VersionEntry {
        filename: filename.to_string(),
        kind: VersionKind::Current,
        archived_at: now,
        reason: "Updated content".to_string(),
        file_hash: Some(fetched.content_hash.clone()),
        is_current: true,
    });

    Ok(())
}

/// Apply a metadata-only change. The media file is untouched and the
/// existing current entry stays current; the superseded sidecar is
/// archived and a single metadata entry names each changed field.
pub fn apply_metadata_change(
    store: &ArchiveStore,
    record: &mut EpisodeRecord,
    descriptor: &EpisodeDescriptor,
    delta: &MetadataDelta,
    now: DateTime<Utc>,
) -> Result<(), ArchiveError> {
    if let Some(filename) = record.current_filename.clone() {
        let timestamp = backup_timestamp(now);
        if let Some(backup_name) = store.preserve_sidecar(&filename, &timestamp)? {
            record.push_version(VersionEntry {
                filename: backup_name,
                kind: VersionKind::Metadata,
                archived_at: now,
                reason: format!("Metadata changed: {}", delta.describe()),
                file_hash: None,
                is_current: false,
            });
        }

        apply_descriptor_metadata(record, descriptor);

        // Keep the artifact's original download time in the sidecar.
        let downloaded_at = record
            .current_entry()
            .map(|entry| entry.archived_at)
            .unwrap_or(now);
        let sidecar =
            EpisodeSidecar::from_record(record, &filename, &descriptor.enclosure_url, downloaded_at);
        store.write_sidecar(&filename, &sidecar)?;
    } else {
        apply_descriptor_metadata(record, descriptor);
    }

    Ok(())
}

/// Refresh stored validators after the remote confirmed the content is
/// unchanged. No version entry; these fields are freshness hints, not
/// audited history.
pub fn refresh_validators(
    record: &mut EpisodeRecord,
    cache_token: Option<String>,
    content_length: Option<u64>,
) {
    if let Some(token) = cache_token {
        record.cache_token = Some(token);
    }
    if let Some(length) = content_length {
        record.content_length = Some(length);
    }
}

/// Adopt backups a crashed run left behind: files renamed to their
/// backup name whose version entry never made it into the document.
fn adopt_orphaned_backups(
    store: &ArchiveStore,
    record: &mut EpisodeRecord,
    filename: &str,
    now: DateTime<Utc>,
) -> Result<(), ArchiveError> {
    for backup_name in store.unreferenced_backups(filename, &record.versions)? {
        record.push_version(VersionEntry {
            filename: backup_name,
            kind: VersionKind::Content,
            archived_at: now,
            reason: "Recovered backup from interrupted run".to_string(),
            file_hash: None,
            is_current: false,
        });
    }
    Ok(())
}

fn apply_descriptor_metadata(record: &mut EpisodeRecord, descriptor: &EpisodeDescriptor) {
    record.title = descriptor.title.clone();
    record.description = descriptor.description.clone();
    record.published_at = descriptor.published_at;
}
