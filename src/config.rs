use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration: global defaults plus one block per feed.
///
/// `max_downloads` and `days_to_download` use 0 as "unlimited" so a
/// feed can explicitly opt out of a global cap.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub storage_dir: Option<PathBuf>,
    pub max_downloads: Option<usize>,
    pub days_to_download: Option<u32>,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

/// One archived feed
#[derive(Debug, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    pub base_url: Option<String>,
    pub storage_dir: Option<PathBuf>,
    pub max_downloads: Option<usize>,
    pub days_to_download: Option<u32>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if config.feeds.is_empty() {
            return Err(ConfigError::NoFeeds {
                path: path.to_path_buf(),
            });
        }

        Ok(config)
    }

    /// Directory a feed's archive lives in: the feed's storage_dir (or
    /// the global one, or the working directory) plus the sanitized
    /// feed name.
    pub fn feed_storage_dir(&self, feed: &FeedConfig) -> PathBuf {
        let base = feed
            .storage_dir
            .as_ref()
            .or(self.storage_dir.as_ref())
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(sanitize_filename::sanitize(&feed.name))
    }

    pub fn feed_max_downloads(&self, feed: &FeedConfig) -> Option<usize> {
        feed.max_downloads
            .or(self.max_downloads)
            .filter(|&n| n != 0)
    }

    pub fn feed_max_age_days(&self, feed: &FeedConfig) -> Option<u32> {
        feed.days_to_download
            .or(self.days_to_download)
            .filter(|&n| n != 0)
    }
}
