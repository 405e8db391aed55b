// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use rss::{ChannelBuilder, EnclosureBuilder, GuidBuilder, ItemBuilder};

use crate::archive::{Archive, EpisodeRecord};
use crate::error::FeedError;

use super::parse::Podcast;

/// Filename of the rendered archival feed inside a feed directory
pub const ARCHIVE_FEED_FILENAME: &str = "archive_feed.xml";

/// Render the archival RSS feed from the record set.
///
/// Only episodes with a current artifact appear; quarantined and
/// never-downloaded records are invisible to feed consumers. Enclosure
/// URLs point at `{base_url}/{filename}`, or the bare filename when no
/// base URL is configured.
pub fn write_archive_feed(
    archive: &Archive,
    podcast: &Podcast,
    base_url: Option<&str>,
    dir: &Path,
) -> Result<(), FeedError> {
    let mut records: Vec<&EpisodeRecord> = archive
        .records()
        .filter(|r| r.has_current_artifact())
        .collect();

    // Newest first; undated episodes sort last.
    records.sort_by(|a, b| match (a.published_at, b.published_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let items: Vec<rss::Item> = records
        .iter()
        .filter_map(|record| record.current_filename.as_deref().map(|f| (record, f)))
        .map(|(record, filename)| build_item(record, filename, base_url))
        .collect();

    let channel = ChannelBuilder::default()
        .title(podcast.title.clone())
        .description(podcast.description.clone().unwrap_or_default())
        .link(
            podcast
                .link
                .as_ref()
                .map(|u| u.to_string())
                .unwrap_or_else(|| podcast.feed_url.to_string()),
        )
        .generator(Some("podvault".to_string()))
        .items(items)
        .build();

    let body = channel
        .pretty_write_to(Vec::new(), b' ', 2)
        .map_err(|source| FeedError::RenderFailed { source })?;

    let mut document = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n".to_vec();
    document.extend_from_slice(&body);

    let path = dir.join(ARCHIVE_FEED_FILENAME);
    std::fs::write(&path, document).map_err(|source| FeedError::WriteFailed { path, source })
}

fn build_item(record: &EpisodeRecord, filename: &str, base_url: Option<&str>) -> rss::Item {
    let enclosure_url = match base_url {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), filename),
        None => filename.to_string(),
    };

    let enclosure = EnclosureBuilder::default()
        .url(enclosure_url)
        .length(
            record
                .content_length
                .map(|l| l.to_string())
                .unwrap_or_default(),
        )
        .mime_type(mime_for_filename(filename).to_string())
        .build();

    let guid = GuidBuilder::default()
        .value(record.canonical_url.clone())
        .permalink(false)
        .build();

    ItemBuilder::default()
        .title(Some(record.title.clone()))
        .description(record.description.clone())
        .pub_date(record.published_at.map(|dt| dt.to_rfc2822()))
        .guid(Some(guid))
        .enclosure(Some(enclosure))
        .build()
}

fn mime_for_filename(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("mp4") => "video/mp4",
        Some("aac") => "audio/aac",
        Some("ogg") => "audio/ogg",
        Some("opus") => "audio/opus",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use tempfile::tempdir;
    use url::Url;

    fn make_podcast() -> Podcast {
        Podcast {
            title: "Test Podcast".to_string(),
            description: Some("A show".to_string()),
            link: Some(Url::parse("https://example.com").unwrap()),
            author: None,
            image_url: None,
            feed_url: Url::parse("https://example.com/feed.xml").unwrap(),
            episodes: Vec::new(),
        }
    }

    fn make_record(url: &str, local_id: &str, title: &str, date: &str) -> EpisodeRecord {
        let mut record = EpisodeRecord::new(
            url.to_string(),
            local_id.to_string(),
            title.to_string(),
            Some("desc".to_string()),
            Some(DateTime::parse_from_rfc2822(date).unwrap()),
        );
        record.downloaded = true;
        record.current_filename = Some(format!("{local_id}.mp3"));
        record.content_length = Some(1000);
        record
    }

    #[test]
    fn feed_contains_only_restorable_episodes_newest_first() {
        let dir = tempdir().unwrap();

        let mut archive = Archive::new();
        archive
            .insert_new(make_record(
                "https://example.com/old",
                "2024-01-01-aaaaaaaaaaaa",
                "Old Episode",
                "Mon, 01 Jan 2024 12:00:00 +0000",
            ))
            .unwrap();
        archive
            .insert_new(make_record(
                "https://example.com/new",
                "2024-02-01-bbbbbbbbbbbb",
                "New Episode",
                "Thu, 01 Feb 2024 12:00:00 +0000",
            ))
            .unwrap();

        let mut gone = make_record(
            "https://example.com/gone",
            "2024-03-01-cccccccccccc",
            "Deleted Episode",
            "Fri, 01 Mar 2024 12:00:00 +0000",
        );
        gone.deleted = true;
        archive.insert_new(gone).unwrap();

        archive
            .insert_new(EpisodeRecord::new(
                "https://example.com/pending".to_string(),
                "2024-04-01-dddddddddddd".to_string(),
                "Not Yet Downloaded".to_string(),
                None,
                None,
            ))
            .unwrap();

        write_archive_feed(
            &archive,
            &make_podcast(),
            Some("https://media.example.com/show/"),
            dir.path(),
        )
        .unwrap();

        let xml = std::fs::read_to_string(dir.path().join(ARCHIVE_FEED_FILENAME)).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<title>Test Podcast</title>"));
        assert!(xml.contains("Old Episode"));
        assert!(xml.contains("New Episode"));
        assert!(!xml.contains("Deleted Episode"));
        assert!(!xml.contains("Not Yet Downloaded"));

        // Trailing slash on the base URL must not double up.
        assert!(xml.contains(
            "url=\"https://media.example.com/show/2024-01-01-aaaaaaaaaaaa.mp3\""
        ));

        let new_pos = xml.find("New Episode").unwrap();
        let old_pos = xml.find("Old Episode").unwrap();
        assert!(new_pos < old_pos);
    }

    #[test]
    fn feed_round_trips_through_the_parser() {
        let dir = tempdir().unwrap();

        let mut archive = Archive::new();
        archive
            .insert_new(make_record(
                "https://example.com/ep1",
                "2024-01-01-aaaaaaaaaaaa",
                "Episode One",
                "Mon, 01 Jan 2024 12:00:00 +0000",
            ))
            .unwrap();

        write_archive_feed(
            &archive,
            &make_podcast(),
            Some("https://media.example.com/show"),
            dir.path(),
        )
        .unwrap();

        let xml = std::fs::read(dir.path().join(ARCHIVE_FEED_FILENAME)).unwrap();
        let feed_url = Url::parse("https://media.example.com/show/archive_feed.xml").unwrap();
        let parsed = crate::feed::parse_feed(&xml, feed_url).unwrap();

        assert_eq!(parsed.title, "Test Podcast");
        assert_eq!(parsed.episodes.len(), 1);
        assert_eq!(parsed.episodes[0].canonical_url, "https://example.com/ep1");
        assert_eq!(
            parsed.episodes[0].enclosure_url.as_str(),
            "https://media.example.com/show/2024-01-01-aaaaaaaaaaaa.mp3"
        );
        assert_eq!(parsed.episodes[0].declared_length, Some(1000));
        assert_eq!(
            parsed.episodes[0].mime_type,
            Some("audio/mpeg".to_string())
        );
    }

    #[test]
    fn feed_without_base_url_uses_bare_filenames() {
        let dir = tempdir().unwrap();

        let mut archive = Archive::new();
        archive
            .insert_new(make_record(
                "https://example.com/ep1",
                "2024-01-01-aaaaaaaaaaaa",
                "Episode One",
                "Mon, 01 Jan 2024 12:00:00 +0000",
            ))
            .unwrap();

        write_archive_feed(&archive, &make_podcast(), None, dir.path()).unwrap();

        let xml = std::fs::read_to_string(dir.path().join(ARCHIVE_FEED_FILENAME)).unwrap();
        assert!(xml.contains("url=\"2024-01-01-aaaaaaaaaaaa.mp3\""));
    }
}
