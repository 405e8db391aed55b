mod download;
mod identity;

pub use download::{DownloadContext, DownloadOutcome, FetchedArtifact, download_episode};
pub use identity::{artifact_filename, media_extension, resolve_local_id};
