use crate::archive::EpisodeRecord;
use crate::feed::EpisodeDescriptor;

/// Longest old/new value rendered into a reason string
const MAX_REASON_VALUE: usize = 50;

/// Freshness signal for the content dimension.
///
/// The checks run cheapest first: record presence, artifact presence,
/// cache token, declared size. Suspected changes still need the bytes
/// fetched and hashed before they count as real.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSignal {
    /// No record exists for this canonical URL
    New,
    /// A record exists but nothing was ever downloaded
    NeverFetched,
    /// The record claims an artifact that is not on disk
    ArtifactMissing,
    /// The remote token matches the stored one; content presumed
    /// unchanged
    TokenMatch,
    /// Declared remote size differs from the stored artifact size
    SizeMismatch { stored: u64, declared: u64 },
    /// Remote token present and different from the stored one
    TokenChanged,
    /// No validator gave a signal; content presumed unchanged
    NoSignal,
}

impl ContentSignal {
    /// Whether the sync needs to transfer bytes for this episode
    pub fn needs_fetch(&self) -> bool {
        matches!(
            self,
            Self::New
                | Self::NeverFetched
                | Self::ArtifactMissing
                | Self::SizeMismatch { .. }
                | Self::TokenChanged
        )
    }

    /// Whether the fetch exists to verify a suspected change, as
    /// opposed to materializing a file we don't have
    pub fn suspects_change(&self) -> bool {
        matches!(self, Self::SizeMismatch { .. } | Self::TokenChanged)
    }
}

/// One changed metadata field with its old and new values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

impl FieldChange {
    fn describe(&self) -> String {
        format!(
            "{}: '{}' -> '{}'",
            self.field,
            truncate_value(&self.old),
            truncate_value(&self.new)
        )
    }
}

/// The set of metadata fields that differ between the feed and the
/// stored record
#[derive(Debug, Clone, Default)]
pub struct MetadataDelta {
    pub changes: Vec<FieldChange>,
}

impl MetadataDelta {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Render the delta the way version entry reasons record it
    pub fn describe(&self) -> String {
        self.changes
            .iter()
            .map(FieldChange::describe)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Combined classification of one episode against its stored record
#[derive(Debug, Clone)]
pub struct Classification {
    pub content: ContentSignal,
    pub metadata: MetadataDelta,
}

/// The five outcomes a comparison can land on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    New,
    Unchanged,
    ContentChanged,
    MetadataChanged,
    BothChanged,
}

impl Classification {
    pub fn outcome(&self) -> ChangeOutcome {
        if self.content == ContentSignal::New {
            return ChangeOutcome::New;
        }
        match (self.content.needs_fetch(), !self.metadata.is_empty()) {
            (true, true) => ChangeOutcome::BothChanged,
            (true, false) => ChangeOutcome::ContentChanged,
            (false, true) => ChangeOutcome::MetadataChanged,
            (false, false) => ChangeOutcome::Unchanged,
        }
    }
}

/// Compare an incoming episode against its stored record.
///
/// Pure: reads only its arguments, performs no I/O. The caller supplies
/// whether the record's artifact is actually on disk.
pub fn classify(
    incoming: &EpisodeDescriptor,
    stored: Option<&EpisodeRecord>,
    artifact_present: bool,
) -> Classification {
    let Some(record) = stored else {
        return Classification {
            content: ContentSignal::New,
            metadata: MetadataDelta::default(),
        };
    };

    Classification {
        content: content_signal(incoming, record, artifact_present),
        metadata: diff_metadata(incoming, record),
    }
}

fn content_signal(
    incoming: &EpisodeDescriptor,
    record: &EpisodeRecord,
    artifact_present: bool,
) -> ContentSignal {
    if !record.downloaded || record.content_hash.is_none() {
        return ContentSignal::NeverFetched;
    }

    if !artifact_present {
        return ContentSignal::ArtifactMissing;
    }

    if let (Some(fresh), Some(known)) = (&incoming.cache_token, &record.cache_token)
        && fresh == known
    {
        return ContentSignal::TokenMatch;
    }

    if let (Some(declared), Some(stored_len)) = (incoming.declared_length, record.content_length)
        && declared != stored_len
    {
        return ContentSignal::SizeMismatch {
            stored: stored_len,
            declared,
        };
    }

    // Token equality was handled above, so two present tokens differ.
    if incoming.cache_token.is_some() && record.cache_token.is_some() {
        return ContentSignal::TokenChanged;
    }

    ContentSignal::NoSignal
}

/// Field-by-field comparison of the metadata the archive tracks
pub fn diff_metadata(incoming: &EpisodeDescriptor, record: &EpisodeRecord) -> MetadataDelta {
    let mut changes = Vec::new();

    if incoming.title != record.title {
        changes.push(FieldChange {
            field: "title",
            old: record.title.clone(),
            new: incoming.title.clone(),
        });
    }

    if incoming.description != record.description {
        changes.push(FieldChange {
            field: "description",
            old: format_text(record.description.as_deref()),
            new: format_text(incoming.description.as_deref()),
        });
    }

    if incoming.published_at != record.published_at {
        changes.push(FieldChange {
            field: "published",
            old: format_date(record.published_at),
            new: format_date(incoming.published_at),
        });
    }

    MetadataDelta { changes }
}

fn format_text(value: Option<&str>) -> String {
    value.map(String::from).unwrap_or_else(|| "(none)".to_string())
}

fn format_date(value: Option<chrono::DateTime<chrono::FixedOffset>>) -> String {
    value
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "(none)".to_string())
}

fn truncate_value(value: &str) -> String {
    if value.chars().count() <= MAX_REASON_VALUE {
        value.to_string()
    } else {
        let kept: String = value.chars().take(MAX_REASON_VALUE - 3).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use url::Url;

    fn make_descriptor(title: &str) -> EpisodeDescriptor {
        EpisodeDescriptor {
            canonical_url: "https://example.com/ep1".to_string(),
            title: title.to_string(),
            description: Some("A description".to_string()),
            published_at: DateTime::parse_from_rfc2822("Mon, 15 Jan 2024 12:00:00 +0000").ok(),
            enclosure_url: Url::parse("https://example.com/ep1.mp3").unwrap(),
            declared_length: Some(1000),
            mime_type: Some("audio/mpeg".to_string()),
            cache_token: None,
        }
    }

    fn make_downloaded_record(title: &str) -> EpisodeRecord {
        let mut record = EpisodeRecord::new(
            "https://example.com/ep1".to_string(),
            "2024-01-15-0011aabbccdd".to_string(),
            title.to_string(),
            Some("A description".to_string()),
            DateTime::parse_from_rfc2822("Mon, 15 Jan 2024 12:00:00 +0000").ok(),
        );
        record.downloaded = true;
        record.current_filename = Some("2024-01-15-0011aabbccdd.mp3".to_string());
        record.content_hash = Some("aaaa".to_string());
        record.content_length = Some(1000);
        record.cache_token = Some("\"v1\"".to_string());
        record
    }

    #[test]
    fn classify_reports_new_when_no_record_exists() {
        let classification = classify(&make_descriptor("Episode"), None, false);
        assert_eq!(classification.content, ContentSignal::New);
        assert_eq!(classification.outcome(), ChangeOutcome::New);
    }

    #[test]
    fn classify_reports_never_fetched_for_undownloaded_record() {
        let record = EpisodeRecord::new(
            "https://example.com/ep1".to_string(),
            "2024-01-15-0011aabbccdd".to_string(),
            "Episode".to_string(),
            Some("A description".to_string()),
            DateTime::parse_from_rfc2822("Mon, 15 Jan 2024 12:00:00 +0000").ok(),
        );

        let classification = classify(&make_descriptor("Episode"), Some(&record), false);
        assert_eq!(classification.content, ContentSignal::NeverFetched);
        assert!(classification.content.needs_fetch());
        assert!(!classification.content.suspects_change());
    }

    #[test]
    fn classify_reports_missing_artifact() {
        let record = make_downloaded_record("Episode");
        let classification = classify(&make_descriptor("Episode"), Some(&record), false);
        assert_eq!(classification.content, ContentSignal::ArtifactMissing);
        assert!(classification.content.needs_fetch());
    }

    #[test]
    fn token_match_wins_over_size_mismatch() {
        let record = make_downloaded_record("Episode");
        let mut incoming = make_descriptor("Episode");
        incoming.cache_token = Some("\"v1\"".to_string());
        incoming.declared_length = Some(2000);

        let classification = classify(&incoming, Some(&record), true);
        assert_eq!(classification.content, ContentSignal::TokenMatch);
        assert_eq!(classification.outcome(), ChangeOutcome::Unchanged);
    }

    #[test]
    fn size_mismatch_is_a_suspected_change() {
        let record = make_downloaded_record("Episode");
        let mut incoming = make_descriptor("Episode");
        incoming.declared_length = Some(2000);

        let classification = classify(&incoming, Some(&record), true);
        assert_eq!(
            classification.content,
            ContentSignal::SizeMismatch {
                stored: 1000,
                declared: 2000
            }
        );
        assert!(classification.content.suspects_change());
        assert_eq!(classification.outcome(), ChangeOutcome::ContentChanged);
    }

    #[test]
    fn changed_token_is_a_suspected_change() {
        let record = make_downloaded_record("Episode");
        let mut incoming = make_descriptor("Episode");
        incoming.cache_token = Some("\"v2\"".to_string());

        let classification = classify(&incoming, Some(&record), true);
        assert_eq!(classification.content, ContentSignal::TokenChanged);
        assert!(classification.content.suspects_change());
    }

    #[test]
    fn no_validators_means_no_signal() {
        let mut record = make_downloaded_record("Episode");
        record.cache_token = None;
        record.content_length = None;
        let mut incoming = make_descriptor("Episode");
        incoming.declared_length = None;

        let classification = classify(&incoming, Some(&record), true);
        assert_eq!(classification.content, ContentSignal::NoSignal);
        assert_eq!(classification.outcome(), ChangeOutcome::Unchanged);
    }

    #[test]
    fn diff_detects_each_metadata_field() {
        let record = make_downloaded_record("Old Title");
        let mut incoming = make_descriptor("New Title");
        incoming.description = Some("New description".to_string());
        incoming.published_at =
            DateTime::parse_from_rfc2822("Tue, 16 Jan 2024 12:00:00 +0000").ok();

        let delta = diff_metadata(&incoming, &record);
        let fields: Vec<_> = delta.changes.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["title", "description", "published"]);

        let description = delta.describe();
        assert!(description.contains("title: 'Old Title' -> 'New Title'"));
        assert!(description.contains("description:"));
        assert!(description.contains("published:"));
    }

    #[test]
    fn diff_ignores_identical_metadata() {
        let record = make_downloaded_record("Episode");
        let delta = diff_metadata(&make_descriptor("Episode"), &record);
        assert!(delta.is_empty());
    }

    #[test]
    fn diff_treats_equal_instants_in_different_offsets_as_unchanged() {
        let record = make_downloaded_record("Episode");
        let mut incoming = make_descriptor("Episode");
        // Same instant as the stored date, expressed two hours east.
        incoming.published_at =
            DateTime::parse_from_rfc3339("2024-01-15T14:00:00+02:00").ok();

        let delta = diff_metadata(&incoming, &record);
        assert!(delta.is_empty());
    }

    #[test]
    fn diff_formats_missing_values() {
        let mut record = make_downloaded_record("Episode");
        record.description = None;
        let incoming = make_descriptor("Episode");

        let delta = diff_metadata(&incoming, &record);
        assert_eq!(delta.changes.len(), 1);
        assert_eq!(delta.changes[0].old, "(none)");
        assert_eq!(delta.changes[0].new, "A description");
    }

    #[test]
    fn describe_truncates_long_values() {
        let long = "x".repeat(80);
        let change = FieldChange {
            field: "description",
            old: long.clone(),
            new: "short".to_string(),
        };
        let delta = MetadataDelta {
            changes: vec![change],
        };

        let description = delta.describe();
        assert!(description.contains("..."));
        assert!(!description.contains(&long));
    }

    #[test]
    fn both_dimensions_changed_reports_both() {
        let record = make_downloaded_record("Old Title");
        let mut incoming = make_descriptor("New Title");
        incoming.cache_token = Some("\"v2\"".to_string());

        let classification = classify(&incoming, Some(&record), true);
        assert_eq!(classification.outcome(), ChangeOutcome::BothChanged);
    }
}
