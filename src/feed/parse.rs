// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use url::Url;

use crate::error::FeedError;

/// Represents a parsed podcast feed
#[derive(Debug, Clone)]
pub struct Podcast {
    pub title: String,
    pub description: Option<String>,
    pub link: Option<Url>,
    pub author: Option<String>,
    pub image_url: Option<Url>,
    pub feed_url: Url,
    pub episodes: Vec<EpisodeDescriptor>,
}

/// One episode as the feed currently describes it.
///
/// The canonical URL is the episode's stable identity across runs; the
/// cache token starts out empty and is filled in by a HEAD probe when
/// the sync needs a freshness signal.
#[derive(Debug, Clone)]
pub struct EpisodeDescriptor {
    pub canonical_url: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<FixedOffset>>,
    pub enclosure_url: Url,
    pub declared_length: Option<u64>,
    pub mime_type: Option<String>,
    pub cache_token: Option<String>,
}

/// Parse RSS feed XML bytes into a Podcast struct
pub fn parse_feed(xml_bytes: &[u8], feed_url: Url) -> Result<Podcast, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let episodes = channel
        .items()
        .iter()
        .filter_map(|item| parse_episode(item).ok())
        .collect();

    let image_url = channel
        .image()
        .and_then(|img| Url::parse(img.url()).ok())
        .or_else(|| {
            channel
                .itunes_ext()
                .and_then(|ext| ext.image())
                .and_then(|url| Url::parse(url).ok())
        });

    let author = channel
        .itunes_ext()
        .and_then(|ext| ext.author().map(String::from))
        .or_else(|| channel.managing_editor().map(String::from));

    Ok(Podcast {
        title: channel.title().to_string(),
        description: Some(decode_text(channel.description())).filter(|s| !s.is_empty()),
        link: Url::parse(channel.link()).ok(),
        author,
        image_url,
        feed_url,
        episodes,
    })
}

fn parse_episode(item: &rss::Item) -> Result<EpisodeDescriptor, FeedError> {
    let title = item
        .title()
        .map(String::from)
        .unwrap_or_else(|| "Untitled Episode".to_string());

    let enclosure = item
        .enclosure()
        .ok_or_else(|| FeedError::MissingEnclosure {
            title: title.clone(),
        })?;

    let enclosure_url = Url::parse(enclosure.url())?;

    let published_at = item.pub_date().and_then(|date_str| {
        DateTime::parse_from_rfc2822(date_str)
            .or_else(|_| parse_relaxed_date(date_str))
            .ok()
    });

    // The GUID identifies the episode across title edits and feed
    // reorderings; feeds without one fall back to the media URL.
    let canonical_url = item
        .guid()
        .map(|g| g.value().to_string())
        .unwrap_or_else(|| enclosure.url().to_string());

    Ok(EpisodeDescriptor {
        canonical_url,
        title,
        description: item.description().map(decode_text),
        published_at,
        enclosure_url,
        declared_length: enclosure.length().parse().ok(),
        mime_type: Some(enclosure.mime_type().to_string()).filter(|s| !s.is_empty()),
        cache_token: None,
    })
}

/// Decode HTML entities that feeds commonly leave in text fields
fn decode_text(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    // Try common alternative formats
    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    for format in formats {
        if let Ok(dt) = DateTime::parse_from_str(date_str, format) {
            return Ok(dt);
        }
    }

    Err(chrono::DateTime::parse_from_rfc2822("invalid").unwrap_err())
}
