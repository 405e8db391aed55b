use std::path::Path;

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::feed::EpisodeDescriptor;
use crate::http::{HttpClient, HttpResponse};
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Context for tracking a download in concurrent scenarios
#[derive(Debug, Clone)]
pub struct DownloadContext {
    /// Identifies the download for progress bar management
    pub download_id: usize,
    /// Index of this episode in the download queue
    pub episode_index: usize,
    /// Total number of episodes to download
    pub total_to_download: usize,
}

/// A fully transferred body and its validators
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub bytes_len: u64,
    /// SHA-256 of the streamed bytes, lowercase hex
    pub content_hash: String,
    /// ETag of the response, if the server sent one
    pub cache_token: Option<String>,
}

/// What a fetch attempt produced
#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    /// The body was streamed to the partial path
    Fetched(FetchedArtifact),
    /// The conditional request was answered with 304; nothing was
    /// written to disk
    NotModified,
}

/// Download an episode's media file to the given partial path.
///
/// Streams the response body to disk while hashing it, reporting
/// progress through the reporter. A failed transfer removes the
/// partial file so nothing half-written survives the attempt.
pub async fn download_episode<C: HttpClient>(
    client: &C,
    descriptor: &EpisodeDescriptor,
    partial_path: &Path,
    if_none_match: Option<&str>,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<DownloadOutcome, DownloadError> {
    let url = descriptor.enclosure_url.as_str();

    let response = client
        .get_stream(url, if_none_match)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status == 304 {
        return Ok(DownloadOutcome::NotModified);
    }

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let HttpResponse {
        content_length,
        etag,
        body,
        ..
    } = response;

    // Report download starting
    reporter.report(ProgressEvent::DownloadStarting {
        download_id: context.download_id,
        episode_title: descriptor.title.clone(),
        episode_index: context.episode_index,
        total_to_download: context.total_to_download,
        content_length,
    });

    let stream_result = async {
        let mut file =
            File::create(partial_path)
                .await
                .map_err(|e| DownloadError::FileCreateFailed {
                    path: partial_path.to_path_buf(),
                    source: e,
                })?;

        let mut hasher = Sha256::new();
        let mut bytes_downloaded: u64 = 0;
        let mut stream = body;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
                url: url.to_string(),
                source: e,
            })?;

            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::FileWriteFailed {
                    path: partial_path.to_path_buf(),
                    source: e,
                })?;

            bytes_downloaded += chunk.len() as u64;

            // Report progress
            reporter.report(ProgressEvent::DownloadProgress {
                download_id: context.download_id,
                episode_title: descriptor.title.clone(),
                bytes_downloaded,
                total_bytes: content_length,
            });
        }

        // Ensure all data is flushed to disk
        file.flush()
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: partial_path.to_path_buf(),
                source: e,
            })?;

        Ok::<(u64, String), DownloadError>((bytes_downloaded, format!("{:x}", hasher.finalize())))
    }
    .await;

    match stream_result {
        Ok((bytes_downloaded, content_hash)) => {
            reporter.report(ProgressEvent::DownloadCompleted {
                download_id: context.download_id,
                episode_title: descriptor.title.clone(),
                bytes_downloaded,
            });

            Ok(DownloadOutcome::Fetched(FetchedArtifact {
                bytes_len: bytes_downloaded,
                content_hash,
                cache_token: etag,
            }))
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(partial_path).await;
            Err(e)
        }
    }
}
