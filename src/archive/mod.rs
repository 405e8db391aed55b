mod record;
mod sidecar;
mod store;

pub use record::{Archive, EpisodeRecord, VersionEntry, VersionKind};
pub use sidecar::EpisodeSidecar;
pub use store::{ARCHIVE_DOCUMENT, ArchiveStore, QUARANTINE_DIR};
