use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// What a single version entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
    /// A superseded media file, preserved under a backup name
    Content,
    /// A superseded metadata snapshot, preserved under a backup name
    Metadata,
    /// The file that serves the episode right now
    Current,
    /// The episode vanished from the feed and its files were quarantined
    Deleted,
}

/// One entry in an episode's append-only version history.
///
/// Entries are never removed or rewritten; the full publishing history
/// of an episode is reconstructable from this list alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub filename: String,
    pub kind: VersionKind,
    pub archived_at: DateTime<Utc>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    pub is_current: bool,
}

/// Everything the archive knows about one episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub canonical_url: String,
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_filename: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_token: Option<String>,
    pub downloaded: bool,
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<VersionEntry>,
}

impl EpisodeRecord {
    /// Create a record for a first sighting; nothing downloaded yet
    pub fn new(
        canonical_url: String,
        local_id: String,
        title: String,
        description: Option<String>,
        published_at: Option<DateTime<FixedOffset>>,
    ) -> Self {
        Self {
            canonical_url,
            local_id,
            current_filename: None,
            title,
            description,
            published_at,
            content_hash: None,
            content_length: None,
            cache_token: None,
            downloaded: false,
            deleted: false,
            versions: Vec::new(),
        }
    }

    /// Append a version entry, maintaining the single-current invariant.
    ///
    /// This is the only way entries enter the history. An entry marked
    /// current demotes every earlier entry; a deletion entry demotes all
    /// entries (nothing is current while quarantined). Content and
    /// metadata entries leave existing flags alone.
    pub fn push_version(&mut self, entry: VersionEntry) {
        if entry.is_current || entry.kind == VersionKind::Deleted {
            for version in &mut self.versions {
                version.is_current = false;
            }
        }
        self.versions.push(entry);
    }

    /// The entry describing the file that currently serves this episode
    pub fn current_entry(&self) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.is_current)
    }

    /// The most recent deletion entry, which remembers the filename the
    /// episode had when it was quarantined
    pub fn last_deleted_entry(&self) -> Option<&VersionEntry> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.kind == VersionKind::Deleted)
    }

    /// Whether a media file for this episode is present in the archive
    /// directory (as opposed to never downloaded or quarantined)
    pub fn has_current_artifact(&self) -> bool {
        self.downloaded && !self.deleted && self.current_filename.is_some()
    }
}

/// The persistent record set for one feed, keyed by canonical URL.
///
/// Keys are never removed; deletion is a flag on the record. The map is
/// ordered so the serialized document is deterministic.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Archive {
    records: BTreeMap<String, EpisodeRecord>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, canonical_url: &str) -> Option<&EpisodeRecord> {
        self.records.get(canonical_url)
    }

    pub fn get_mut(&mut self, canonical_url: &str) -> Option<&mut EpisodeRecord> {
        self.records.get_mut(canonical_url)
    }

    /// Insert a record for an episode seen for the first time.
    ///
    /// Rejects duplicate canonical URLs and local id collisions instead
    /// of silently overwriting history.
    pub fn insert_new(&mut self, record: EpisodeRecord) -> Result<(), ArchiveError> {
        if self.records.contains_key(&record.canonical_url) {
            return Err(ArchiveError::RecordExists {
                canonical_url: record.canonical_url,
            });
        }

        if let Some(existing) = self
            .records
            .values()
            .find(|r| r.local_id == record.local_id)
        {
            return Err(ArchiveError::DuplicateLocalId {
                local_id: record.local_id,
                first_url: existing.canonical_url.clone(),
                second_url: record.canonical_url,
            });
        }

        self.records.insert(record.canonical_url.clone(), record);
        Ok(())
    }

    pub fn records(&self) -> impl Iterator<Item = &EpisodeRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check the invariants a well-formed document must satisfy.
    ///
    /// Violations are fatal; the archive is never auto-healed.
    pub fn validate(&self) -> Result<(), ArchiveError> {
        let mut seen_ids: HashMap<&str, &str> = HashMap::new();

        for (key, record) in &self.records {
            if key != &record.canonical_url {
                return Err(ArchiveError::KeyMismatch {
                    key: key.clone(),
                    canonical_url: record.canonical_url.clone(),
                });
            }

            if let Some(first_url) = seen_ids.insert(&record.local_id, &record.canonical_url) {
                return Err(ArchiveError::DuplicateLocalId {
                    local_id: record.local_id.clone(),
                    first_url: first_url.to_string(),
                    second_url: record.canonical_url.clone(),
                });
            }

            let current_count = record.versions.iter().filter(|v| v.is_current).count();
            if current_count > 1 {
                return Err(ArchiveError::MultipleCurrentVersions {
                    canonical_url: record.canonical_url.clone(),
                });
            }
        }

        Ok(())
    }
}
