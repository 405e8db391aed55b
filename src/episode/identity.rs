use chrono::{DateTime, FixedOffset};
use sha2::{Digest, Sha256};
use url::Url;

/// Namespace mixed into the identity hash so episode ids can never
/// collide with other SHA-256 uses of the same URL
const ID_NAMESPACE: &str = "podvault/episode-id/v1";

/// Number of hex digits of the digest kept in the local id
const ID_DIGEST_LEN: usize = 12;

/// Derive the stable local identifier for an episode.
///
/// Format: "YYYY-MM-DD-<digest>" or "undated-<digest>". The digest
/// depends only on the canonical URL, so title edits and feed
/// reorderings can never reassign an id. The id is resolved once at
/// first sighting and persisted; the publication date is baked in at
/// that point and later date edits do not move files.
pub fn resolve_local_id(
    canonical_url: &str,
    published_at: Option<DateTime<FixedOffset>>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ID_NAMESPACE.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    let date_prefix = published_at
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "undated".to_string());

    format!("{}-{}", date_prefix, &digest[..ID_DIGEST_LEN])
}

/// Get the media file extension for an enclosure
///
/// Attempts to extract from URL path or MIME type, defaults to "mp3"
pub fn media_extension(enclosure_url: &Url, mime_type: Option<&str>) -> String {
    // Try to get extension from URL path
    if let Some(ext) = enclosure_url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit('.').next())
        .filter(|ext| is_known_media_extension(ext))
    {
        return ext.to_lowercase();
    }

    // Try to get extension from MIME type
    if let Some(mime) = mime_type
        && let Some(ext) = mime_to_extension(mime)
    {
        return ext.to_string();
    }

    // Default to mp3
    "mp3".to_string()
}

/// The filename an episode's media file is stored under
pub fn artifact_filename(local_id: &str, enclosure_url: &Url, mime_type: Option<&str>) -> String {
    format!("{}.{}", local_id, media_extension(enclosure_url, mime_type))
}

/// Check if a string is a media file extension we recognize
fn is_known_media_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

/// Map MIME types to file extensions
fn mime_to_extension(mime: &str) -> Option<&'static str> {
    match mime.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn date(rfc2822: &str) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc2822(rfc2822).ok()
    }

    // === Local id tests ===

    #[test]
    fn local_id_is_deterministic() {
        let a = resolve_local_id(
            "https://example.com/ep1",
            date("Mon, 15 Jan 2024 12:00:00 +0000"),
        );
        let b = resolve_local_id(
            "https://example.com/ep1",
            date("Mon, 15 Jan 2024 12:00:00 +0000"),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn local_id_differs_per_canonical_url() {
        let a = resolve_local_id("https://example.com/ep1", None);
        let b = resolve_local_id("https://example.com/ep2", None);
        assert_ne!(a, b);
    }

    #[test]
    fn local_id_includes_date_prefix() {
        let id = resolve_local_id(
            "https://example.com/ep1",
            date("Mon, 15 Jan 2024 12:00:00 +0000"),
        );
        assert!(id.starts_with("2024-01-15-"));
    }

    #[test]
    fn local_id_uses_undated_when_no_date() {
        let id = resolve_local_id("https://example.com/ep1", None);
        assert!(id.starts_with("undated-"));
    }

    #[test]
    fn digest_part_depends_only_on_url() {
        let dated = resolve_local_id(
            "https://example.com/ep1",
            date("Mon, 15 Jan 2024 12:00:00 +0000"),
        );
        let undated = resolve_local_id("https://example.com/ep1", None);

        let dated_digest = dated.rsplit('-').next().unwrap();
        let undated_digest = undated.rsplit('-').next().unwrap();
        assert_eq!(dated_digest, undated_digest);
    }

    #[test]
    fn digest_part_is_short_lowercase_hex() {
        let id = resolve_local_id("https://example.com/ep1", None);
        let digest = id.rsplit('-').next().unwrap();
        assert_eq!(digest.len(), ID_DIGEST_LEN);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    // === Extension tests ===

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn extracts_extension_from_url() {
        assert_eq!(
            media_extension(&url("https://example.com/episode.m4a"), None),
            "m4a"
        );
    }

    #[test]
    fn normalizes_extension_to_lowercase() {
        assert_eq!(
            media_extension(&url("https://example.com/episode.MP3"), None),
            "mp3"
        );
    }

    #[test]
    fn handles_url_with_query_params() {
        assert_eq!(
            media_extension(&url("https://example.com/episode.mp3?token=abc"), None),
            "mp3"
        );
    }

    #[test]
    fn falls_back_to_mime_type() {
        assert_eq!(
            media_extension(&url("https://example.com/episode"), Some("audio/ogg")),
            "ogg"
        );
    }

    #[test]
    fn ignores_non_media_extensions() {
        assert_eq!(
            media_extension(&url("https://example.com/episode.html"), None),
            "mp3"
        );
    }

    #[test]
    fn defaults_to_mp3_for_unknown_mime() {
        assert_eq!(
            media_extension(
                &url("https://example.com/episode"),
                Some("application/octet-stream")
            ),
            "mp3"
        );
    }

    #[test]
    fn artifact_filename_combines_id_and_extension() {
        let filename = artifact_filename(
            "2024-01-15-0011aabbccdd",
            &url("https://example.com/episode.m4a"),
            None,
        );
        assert_eq!(filename, "2024-01-15-0011aabbccdd.m4a");
    }
}
