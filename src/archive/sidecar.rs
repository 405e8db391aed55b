use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::record::EpisodeRecord;

/// Human-inspectable JSON sidecar written next to each media file.
///
/// The archive document is the source of truth; the sidecar is a
/// convenience snapshot and gets archived alongside the media file
/// whenever either changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSidecar {
    pub filename: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub canonical_url: String,
    pub enclosure_url: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    pub downloaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_token: Option<String>,
}

impl EpisodeSidecar {
    /// Snapshot the record's current state for the given artifact
    pub fn from_record(
        record: &EpisodeRecord,
        filename: &str,
        enclosure_url: &Url,
        downloaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            filename: filename.to_string(),
            title: record.title.clone(),
            description: record.description.clone(),
            canonical_url: record.canonical_url.clone(),
            enclosure_url: enclosure_url.clone(),
            published_at: record.published_at.map(|dt| dt.to_rfc3339()),
            downloaded_at: downloaded_at.to_rfc3339(),
            content_hash: record.content_hash.clone(),
            content_length: record.content_length,
            cache_token: record.cache_token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn make_record() -> EpisodeRecord {
        let mut record = EpisodeRecord::new(
            "https://example.com/ep1".to_string(),
            "2024-01-15-0011aabbccdd".to_string(),
            "Test Episode".to_string(),
            Some("A test episode".to_string()),
            DateTime::parse_from_rfc2822("Mon, 15 Jan 2024 12:00:00 +0000").ok(),
        );
        record.content_hash = Some("abc123".to_string());
        record.content_length = Some(1234567);
        record.cache_token = Some("\"v1\"".to_string());
        record
    }

    #[test]
    fn from_record_snapshots_all_fields() {
        let record = make_record();
        let enclosure = Url::parse("https://example.com/ep1.mp3").unwrap();
        let sidecar = EpisodeSidecar::from_record(
            &record,
            "2024-01-15-0011aabbccdd.mp3",
            &enclosure,
            Utc::now(),
        );

        assert_eq!(sidecar.filename, "2024-01-15-0011aabbccdd.mp3");
        assert_eq!(sidecar.title, "Test Episode");
        assert_eq!(sidecar.canonical_url, "https://example.com/ep1");
        assert_eq!(sidecar.enclosure_url, enclosure);
        assert!(sidecar.published_at.is_some());
        assert_eq!(sidecar.content_hash, Some("abc123".to_string()));
        assert_eq!(sidecar.content_length, Some(1234567));
        assert_eq!(sidecar.cache_token, Some("\"v1\"".to_string()));
    }

    #[test]
    fn serializes_without_empty_optional_fields() {
        let mut record = make_record();
        record.description = None;
        record.cache_token = None;

        let enclosure = Url::parse("https://example.com/ep1.mp3").unwrap();
        let sidecar = EpisodeSidecar::from_record(&record, "ep.mp3", &enclosure, Utc::now());

        let json = serde_json::to_string_pretty(&sidecar).unwrap();
        assert!(!json.contains("description"));
        assert!(!json.contains("cache_token"));
        assert!(json.contains("enclosure_url"));
    }
}
