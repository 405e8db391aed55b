mod fetch;
mod parse;
mod write;

pub use fetch::{FeedSource, fetch_feed, is_url, parse_feed_file};
pub use parse::{EpisodeDescriptor, Podcast, parse_feed};
pub use write::{ARCHIVE_FEED_FILENAME, write_archive_feed};
