pub mod archive;
pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod progress;
pub mod sync;

// Re-export main types for convenience
pub use archive::{Archive, ArchiveStore, EpisodeRecord, VersionEntry, VersionKind};
pub use config::{Config, FeedConfig};
pub use error::{ArchiveError, ConfigError, DownloadError, FeedError, SyncError};
pub use feed::{FeedSource, Podcast, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use sync::{SyncOptions, SyncSummary, sync_feed};
