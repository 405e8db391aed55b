use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching, parsing, or rendering RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Episode '{title}' has no enclosure (media file)")]
    MissingEnclosure { title: String },

    #[error("Failed to render archive feed: {source}")]
    RenderFailed {
        #[source]
        source: rss::Error,
    },

    #[error("Failed to write archive feed {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while transferring a single episode.
///
/// These are recoverable: the episode is skipped for the run and the
/// failure is reported in the sync summary.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised by the archive store and its on-disk document.
///
/// All of these abort the run: the archive document is the source of
/// truth and is never patched around a failure.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Another sync is already running for this archive (lock file {path} exists)")]
    LockHeld { path: PathBuf },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive document {path} is malformed: {source}")]
    DocumentParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize archive document: {0}")]
    DocumentSerializeFailed(#[from] serde_json::Error),

    #[error("Failed to move {from} to {to}: {source}")]
    FileOperationFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Local id '{local_id}' is claimed by both '{first_url}' and '{second_url}'")]
    DuplicateLocalId {
        local_id: String,
        first_url: String,
        second_url: String,
    },

    #[error("A record for '{canonical_url}' already exists")]
    RecordExists { canonical_url: String },

    #[error("Record '{canonical_url}' marks more than one version as current")]
    MultipleCurrentVersions { canonical_url: String },

    #[error("Archive key '{key}' does not match record canonical URL '{canonical_url}'")]
    KeyMismatch { key: String, canonical_url: String },
}

/// Errors that can occur when loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("No [[feeds]] configured in {path}")]
    NoFeeds { path: PathBuf },
}

/// Top-level errors for sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}
