// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod change;
mod reconcile;
mod version;

pub use change::{
    ChangeOutcome, Classification, ContentSignal, MetadataDelta, classify, diff_metadata,
};
pub use reconcile::{ReconcilePlan, plan_reconcile};

use std::collections::HashSet;
use std::path::Path;

use chrono::{Duration, Utc};
use futures::StreamExt;

use crate::archive::{ArchiveStore, EpisodeRecord};
use crate::episode::{
    DownloadContext, DownloadOutcome, artifact_filename, download_episode, resolve_local_id,
};
use crate::error::{DownloadError, SyncError};
use crate::feed::{EpisodeDescriptor, FeedSource, write_archive_feed};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Options for a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Cap on fetches per run; None means unlimited
    pub max_downloads: Option<usize>,
    /// Skip first-time downloads of episodes older than this
    pub max_age_days: Option<u32>,
    /// Concurrent transfers
    pub max_concurrent: usize,
    /// Public base URL for enclosure links in the archival feed
    pub base_url: Option<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_downloads: None,
            max_age_days: None,
            max_concurrent: 3,
            base_url: None,
        }
    }
}

/// What a sync run did, per episode category
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub podcast_title: String,
    /// Episodes materialized for the first time or re-downloaded
    pub downloaded: usize,
    /// Episodes whose content changed and was re-archived
    pub updated: usize,
    /// Episodes with recorded metadata changes
    pub metadata_updates: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub restored: usize,
    /// Fetches not attempted because of the download cap
    pub skipped_cap: usize,
    /// First-time downloads not attempted because of the recency cutoff
    pub skipped_old: usize,
    pub failed: usize,
    pub failed_episodes: Vec<(String, DownloadError)>,
}

/// Why an episode's bytes are being fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchIntent {
    /// No archived content exists yet
    Initial,
    /// The record says downloaded but the artifact is gone from disk
    RedownloadMissing,
    /// A validator suggested changed content; the hash decides
    Verify,
}

struct FetchJob {
    descriptor: EpisodeDescriptor,
    filename: String,
    intent: FetchIntent,
    delta: MetadataDelta,
    if_none_match: Option<String>,
    download_id: usize,
    episode_index: usize,
}

/// Synchronize one feed into its archive directory.
///
/// The run is a fixed sequence of passes: load and validate the
/// archive, fetch and parse the feed, decide per episode what work is
/// needed, transfer in parallel while applying results in feed order,
/// reconcile deletions and restorations, then commit the document and
/// render the archival feed from the committed state.
///
/// Per-episode transfer failures are collected into the summary; feed
/// and archive failures abort the run.
pub async fn sync_feed<C: HttpClient>(
    client: &C,
    source: &FeedSource,
    storage_dir: &Path,
    options: &SyncOptions,
    reporter: &SharedProgressReporter,
) -> Result<SyncSummary, SyncError> {
    let store = ArchiveStore::open(storage_dir)?;
    let (mut archive, cleaned_partials) = store.load()?;

    if cleaned_partials > 0 {
        reporter.report(ProgressEvent::PartialFilesCleanedUp {
            count: cleaned_partials,
        });
    }

    reporter.report(ProgressEvent::FetchingFeed {
        url: source.feed_url().to_string(),
    });
    let podcast = source.load(client).await?;

    let now = Utc::now();
    let cutoff = options
        .max_age_days
        .map(|days| now - Duration::days(i64::from(days)));

    let mut summary = SyncSummary {
        podcast_title: podcast.title.clone(),
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut jobs: Vec<FetchJob> = Vec::new();

    // Decision pass, sequential in feed order.
    for descriptor in &podcast.episodes {
        if !seen.insert(descriptor.canonical_url.clone()) {
            // The feed lists the same episode twice; the first wins.
            continue;
        }
        let mut descriptor = descriptor.clone();

        let stored = archive.get(&descriptor.canonical_url);
        if stored.is_some_and(|r| r.deleted) {
            // Quarantined records get no per-episode work; the
            // reconcile pass restores them once they reappear.
            continue;
        }

        let artifact_present = stored
            .and_then(|r| r.current_filename.as_deref())
            .is_some_and(|f| store.artifact_path(f).exists());

        // A probe is only worth the request when validators could
        // tell us something about an artifact we actually hold. Probe
        // failures mean no signal, not a failed episode.
        let probe_worthwhile =
            stored.is_some_and(|r| r.downloaded && r.content_hash.is_some()) && artifact_present;
        if probe_worthwhile {
            if let Ok(probe) = client.probe(descriptor.enclosure_url.as_str()).await {
                if probe.etag.is_some() {
                    descriptor.cache_token = probe.etag;
                }
                if let Some(length) = probe.content_length {
                    descriptor.declared_length = Some(length);
                }
            }
        }

        let classification = classify(&descriptor, stored, artifact_present);
        let outcome = classification.outcome();

        let stored_filename = stored.and_then(|r| r.current_filename.clone());
        let stored_token = stored.and_then(|r| r.cache_token.clone());
        let stored_local_id = stored.map(|r| r.local_id.clone());

        // First sighting: the record is created before any transfer is
        // attempted, so a failed download still leaves the sighting in
        // the archive.
        let local_id = match stored_local_id {
            Some(id) => id,
            None => {
                let id = resolve_local_id(&descriptor.canonical_url, descriptor.published_at);
                archive.insert_new(EpisodeRecord::new(
                    descriptor.canonical_url.clone(),
                    id.clone(),
                    descriptor.title.clone(),
                    descriptor.description.clone(),
                    descriptor.published_at,
                ))?;
                id
            }
        };

        match outcome {
            ChangeOutcome::Unchanged => summary.unchanged += 1,
            ChangeOutcome::MetadataChanged => {
                let Some(record) = archive.get_mut(&descriptor.canonical_url) else {
                    continue;
                };
                version::apply_metadata_change(
                    &store,
                    record,
                    &descriptor,
                    &classification.metadata,
                    now,
                )?;
                summary.metadata_updates += 1;
                reporter.report(ProgressEvent::MetadataVersioned {
                    episode_title: descriptor.title.clone(),
                    reason: classification.metadata.describe(),
                });
            }
            ChangeOutcome::New | ChangeOutcome::ContentChanged | ChangeOutcome::BothChanged => {
                let intent = match &classification.content {
                    ContentSignal::ArtifactMissing => FetchIntent::RedownloadMissing,
                    ContentSignal::SizeMismatch { .. } | ContentSignal::TokenChanged => {
                        FetchIntent::Verify
                    }
                    _ => FetchIntent::Initial,
                };

                if intent == FetchIntent::Initial
                    && let (Some(cutoff), Some(published)) = (cutoff, descriptor.published_at)
                    && published.with_timezone(&Utc) < cutoff
                {
                    summary.skipped_old += 1;
                    continue;
                }

                if let Some(cap) = options.max_downloads
                    && jobs.len() >= cap
                {
                    summary.skipped_cap += 1;
                    continue;
                }

                let filename = stored_filename.unwrap_or_else(|| {
                    artifact_filename(
                        &local_id,
                        &descriptor.enclosure_url,
                        descriptor.mime_type.as_deref(),
                    )
                });
                let if_none_match = if intent == FetchIntent::Verify {
                    stored_token
                } else {
                    None
                };

                let download_id = jobs.len();
                jobs.push(FetchJob {
                    descriptor,
                    filename,
                    intent,
                    delta: classification.metadata,
                    if_none_match,
                    download_id,
                    episode_index: download_id,
                });
            }
        }
    }

    reporter.report(ProgressEvent::FeedParsed {
        podcast_title: podcast.title.clone(),
        total_episodes: podcast.episodes.len(),
        to_fetch: jobs.len(),
    });

    // Fetch pass: transfers overlap up to max_concurrent, but results
    // come back in decision order, so version entries land in the same
    // order a sequential run would produce.
    let total_to_download = jobs.len();
    let concurrency = options.max_concurrent.max(1);

    let mut results = futures::stream::iter(jobs.into_iter().map(|job| {
        let partial_path = store.partial_path(&job.filename);
        async move {
            let context = DownloadContext {
                download_id: job.download_id,
                episode_index: job.episode_index,
                total_to_download,
            };
            let outcome = download_episode(
                client,
                &job.descriptor,
                &partial_path,
                job.if_none_match.as_deref(),
                &context,
                reporter,
            )
            .await;
            (job, outcome)
        }
    }))
    .buffered(concurrency);

    while let Some((job, outcome)) = results.next().await {
        match outcome {
            Err(error) => {
                reporter.report(ProgressEvent::DownloadFailed {
                    download_id: job.download_id,
                    episode_title: job.descriptor.title.clone(),
                    error: error.to_string(),
                });
                summary.failed += 1;
                summary
                    .failed_episodes
                    .push((job.descriptor.title.clone(), error));
            }
            Ok(DownloadOutcome::NotModified) => {
                let Some(record) = archive.get_mut(&job.descriptor.canonical_url) else {
                    continue;
                };
                // The 304 confirmed the stored copy; nothing enters
                // the history.
                version::refresh_validators(record, job.descriptor.cache_token.clone(), None);
                if job.delta.is_empty() {
                    summary.unchanged += 1;
                } else {
                    version::apply_metadata_change(
                        &store,
                        record,
                        &job.descriptor,
                        &job.delta,
                        now,
                    )?;
                    summary.metadata_updates += 1;
                    reporter.report(ProgressEvent::MetadataVersioned {
                        episode_title: job.descriptor.title.clone(),
                        reason: job.delta.describe(),
                    });
                }
            }
            Ok(DownloadOutcome::Fetched(fetched)) => {
                let Some(record) = archive.get_mut(&job.descriptor.canonical_url) else {
                    continue;
                };
                match job.intent {
                    FetchIntent::Initial | FetchIntent::RedownloadMissing => {
                        let reason = if job.intent == FetchIntent::Initial {
                            "Initial download"
                        } else {
                            "Re-downloaded (file missing)"
                        };
                        version::record_download(
                            &store,
                            record,
                            &job.descriptor,
                            &job.filename,
                            &fetched,
                            reason,
                            now,
                        )?;
                        summary.downloaded += 1;
                    }
                    FetchIntent::Verify => {
                        if record.content_hash.as_deref() == Some(fetched.content_hash.as_str()) {
                            // Same bytes after all; no history entry.
                            // Storing the fresh validators keeps the
                            // next run quiet.
                            store.remove_partial(&job.filename)?;
                            version::refresh_validators(
                                record,
                                fetched.cache_token.clone(),
                                Some(fetched.bytes_len),
                            );
                            if job.delta.is_empty() {
                                summary.unchanged += 1;
                            } else {
                                version::apply_metadata_change(
                                    &store,
                                    record,
                                    &job.descriptor,
                                    &job.delta,
                                    now,
                                )?;
                                summary.metadata_updates += 1;
                                reporter.report(ProgressEvent::MetadataVersioned {
                                    episode_title: job.descriptor.title.clone(),
                                    reason: job.delta.describe(),
                                });
                            }
                        } else {
                            version::apply_content_change(
                                &store,
                                record,
                                &job.descriptor,
                                &job.filename,
                                &fetched,
                                &job.delta,
                                now,
                            )?;
                            summary.updated += 1;
                            if !job.delta.is_empty() {
                                summary.metadata_updates += 1;
                            }
                            reporter.report(ProgressEvent::ContentVersioned {
                                episode_title: job.descriptor.title.clone(),
                                reason: "Content changed".to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    // Reconcile pass: records absent from the feed are quarantined,
    // quarantined records present again come back.
    let plan = plan_reconcile(&archive, &seen);
    for canonical_url in &plan.to_delete {
        let Some(record) = archive.get_mut(canonical_url) else {
            continue;
        };
        let episode_title = record.title.clone();
        reconcile::delete_episode(&store, record, now)?;
        summary.deleted += 1;
        reporter.report(ProgressEvent::EpisodeDeleted { episode_title });
    }
    for canonical_url in &plan.to_restore {
        let Some(record) = archive.get_mut(canonical_url) else {
            continue;
        };
        let episode_title = record.title.clone();
        reconcile::restore_episode(&store, record, now)?;
        summary.restored += 1;
        reporter.report(ProgressEvent::EpisodeRestored { episode_title });
    }

    store.commit(&archive)?;
    write_archive_feed(&archive, &podcast, options.base_url.as_deref(), store.root())?;

    reporter.report(ProgressEvent::SyncCompleted {
        downloaded_count: summary.downloaded,
        updated_count: summary.updated,
        metadata_count: summary.metadata_updates,
        unchanged_count: summary.unchanged,
        deleted_count: summary.deleted,
        restored_count: summary.restored,
        failed_count: summary.failed,
    });

    Ok(summary)
}
