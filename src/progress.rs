use std::sync::Arc;

/// Events emitted during feed synchronization for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched from its source
    FetchingFeed { url: String },

    /// Feed has been parsed and the run plan is known
    FeedParsed {
        podcast_title: String,
        total_episodes: usize,
        /// Number of episodes that will be fetched this run
        to_fetch: usize,
    },

    /// Stale partial files were cleaned up while loading the archive
    PartialFilesCleanedUp { count: usize },

    /// A download is starting
    DownloadStarting {
        /// Identifies the download for progress bar management
        download_id: usize,
        episode_title: String,
        /// Index of this episode in the download queue
        episode_index: usize,
        /// Total number of episodes to download
        total_to_download: usize,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        download_id: usize,
        episode_title: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download completed successfully
    DownloadCompleted {
        download_id: usize,
        episode_title: String,
        bytes_downloaded: u64,
    },

    /// A download failed
    DownloadFailed {
        download_id: usize,
        episode_title: String,
        error: String,
    },

    /// A superseded artifact was archived and replaced
    ContentVersioned {
        episode_title: String,
        reason: String,
    },

    /// An episode's metadata changed and the change was recorded
    MetadataVersioned {
        episode_title: String,
        reason: String,
    },

    /// An episode vanished from the feed and was quarantined
    EpisodeDeleted { episode_title: String },

    /// A previously deleted episode reappeared and was restored
    EpisodeRestored { episode_title: String },

    /// Sync operation completed
    SyncCompleted {
        downloaded_count: usize,
        updated_count: usize,
        metadata_count: usize,
        unchanged_count: usize,
        deleted_count: usize,
        restored_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_reporter_handles_all_events() {
        let reporter = NoopReporter;

        reporter.report(ProgressEvent::FetchingFeed {
            url: "https://example.com/feed.xml".to_string(),
        });

        reporter.report(ProgressEvent::FeedParsed {
            podcast_title: "Test Podcast".to_string(),
            total_episodes: 10,
            to_fetch: 5,
        });

        reporter.report(ProgressEvent::PartialFilesCleanedUp { count: 2 });

        reporter.report(ProgressEvent::DownloadStarting {
            download_id: 0,
            episode_title: "Episode 1".to_string(),
            episode_index: 0,
            total_to_download: 5,
            content_length: Some(1024),
        });

        reporter.report(ProgressEvent::DownloadProgress {
            download_id: 0,
            episode_title: "Episode 1".to_string(),
            bytes_downloaded: 512,
            total_bytes: Some(1024),
        });

        reporter.report(ProgressEvent::DownloadCompleted {
            download_id: 0,
            episode_title: "Episode 1".to_string(),
            bytes_downloaded: 1024,
        });

        reporter.report(ProgressEvent::DownloadFailed {
            download_id: 1,
            episode_title: "Episode 2".to_string(),
            error: "Connection timeout".to_string(),
        });

        reporter.report(ProgressEvent::ContentVersioned {
            episode_title: "Episode 1".to_string(),
            reason: "Content changed".to_string(),
        });

        reporter.report(ProgressEvent::MetadataVersioned {
            episode_title: "Episode 1".to_string(),
            reason: "Metadata changed: title: 'a' -> 'b'".to_string(),
        });

        reporter.report(ProgressEvent::EpisodeDeleted {
            episode_title: "Episode 3".to_string(),
        });

        reporter.report(ProgressEvent::EpisodeRestored {
            episode_title: "Episode 3".to_string(),
        });

        reporter.report(ProgressEvent::SyncCompleted {
            downloaded_count: 4,
            updated_count: 1,
            metadata_count: 1,
            unchanged_count: 5,
            deleted_count: 1,
            restored_count: 0,
            failed_count: 1,
        });
    }
}
