//! Per-segment resumable download.

use crate::error::TransferError;
use crate::progress::{ProgressTracker, SegmentProgress};
use crate::retry::RetryPolicy;
use crate::types::{Segment, SegmentOutcome, TransferJob};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info};

/// Size of a file on disk, 0 when it does not exist.
pub(crate) async fn local_len(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m.len(),
        _ => 0,
    }
}

/// `Range` header value for a request starting at `from`.
///
/// The final segment asks for an open-ended range so a server that
/// under-reported the object size still sends every byte.
pub fn range_header(segment: &Segment, from: u64, total_size: u64) -> String {
    if segment.is_final(total_size) {
        format!("bytes={}-", from)
    } else {
        format!("bytes={}-{}", from, segment.end)
    }
}

/// Downloads one segment into its temp file, resuming from whatever prefix
/// is already on disk.
#[derive(Debug, Clone)]
pub struct SegmentWorker {
    client: Client,
    tracker: Arc<ProgressTracker>,
    retry: RetryPolicy,
    chunk_size: usize,
}

impl SegmentWorker {
    pub fn new(
        client: Client,
        tracker: Arc<ProgressTracker>,
        retry: RetryPolicy,
        chunk_size: usize,
    ) -> Self {
        Self {
            client,
            tracker,
            retry,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Runs the segment to completion or failure.
    ///
    /// Errors never escape: they are logged and turned into
    /// [`SegmentOutcome::Failed`]. The tracker's finished-worker counter is
    /// bumped exactly once per call.
    pub async fn run(&self, job: &TransferJob, segment: &Segment) -> SegmentOutcome {
        let label = segment
            .temp_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("segment")
            .to_string();
        let progress = SegmentProgress::new(Arc::clone(&self.tracker));
        let progress = &progress;

        let result = self
            .retry
            .run(&label, move || self.attempt(job, segment, progress))
            .await;

        let outcome = match result {
            Ok(()) => SegmentOutcome::Completed,
            Err(TransferError::NotFound(url)) => {
                error!("❌ {}: resource not found at {}", label, url);
                SegmentOutcome::Failed {
                    reason: format!("Resource not found: {}", url),
                }
            }
            Err(e) => {
                error!("❌ {}: download failed: {}", label, e);
                SegmentOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        self.tracker.add_finished_worker();
        outcome
    }

    /// One attempt: read the on-disk prefix, request the rest, append it.
    async fn attempt(
        &self,
        job: &TransferJob,
        segment: &Segment,
        progress: &SegmentProgress,
    ) -> Result<(), TransferError> {
        let have = local_len(&segment.temp_path).await;
        progress.advance_to(have);

        let wanted = segment.byte_len();
        if have >= wanted {
            info!(
                "✅ {:?} already holds {} bytes, skipping",
                segment.temp_path, have
            );
            return Ok(());
        }

        let from = segment.start + have;
        let range = range_header(segment, from, job.total_size);
        debug!("Segment {} requesting {}", segment.index, range);

        let response = self
            .client
            .get(&job.url)
            .header(RANGE, &range)
            .send()
            .await?;
        let response = check_status(response, &job.url, from)?;

        let missing = wanted - have;
        let remaining = if segment.is_final(job.total_size) {
            None
        } else {
            Some(missing)
        };

        let mut file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&segment.temp_path)
            .await?;
        file.seek(SeekFrom::Start(have)).await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);

        let streamed = stream_body(response, &mut writer, have, remaining, progress).await;
        // Flush what was received even when the stream broke, so the next
        // attempt resumes from the bytes we already counted.
        let flushed = writer.flush().await;
        let written = streamed?;
        flushed?;

        // Whatever arrived is kept on disk; the next attempt resumes after it.
        if written < missing {
            return Err(TransferError::ShortSegment {
                expected: missing,
                got: written,
            });
        }

        debug!(
            "Segment {} wrote {} bytes to {:?}",
            segment.index, written, segment.temp_path
        );
        Ok(())
    }
}

fn check_status(response: Response, url: &str, from: u64) -> Result<Response, TransferError> {
    match response.status() {
        StatusCode::PARTIAL_CONTENT => {
            check_content_range(&response, from)?;
            Ok(response)
        }
        // Full body: only usable when we asked for the object from byte 0.
        StatusCode::OK if from == 0 => Ok(response),
        StatusCode::OK => Err(TransferError::RangeIgnored(from)),
        StatusCode::NOT_FOUND => Err(TransferError::NotFound(url.to_string())),
        status => Err(TransferError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }),
    }
}

/// Rejects a `206` whose `Content-Range` does not start at `from`.
///
/// A missing header is accepted.
fn check_content_range(response: &Response, from: u64) -> Result<(), TransferError> {
    let Some(value) = response.headers().get(CONTENT_RANGE) else {
        return Ok(());
    };
    let got = value.to_str().unwrap_or_default().to_string();
    let start = got
        .strip_prefix("bytes ")
        .and_then(|r| r.split_once('-'))
        .and_then(|(start, _)| start.trim().parse::<u64>().ok());

    match start {
        Some(start) if start == from => Ok(()),
        _ => Err(TransferError::UnexpectedRange {
            expected: from,
            got,
        }),
    }
}

/// Streams `response` into `writer`, which is positioned at `offset`.
///
/// Writes at most `remaining` bytes when bounded. Returns the number of
/// bytes written.
async fn stream_body(
    response: Response,
    writer: &mut BufWriter<tokio::fs::File>,
    offset: u64,
    mut remaining: Option<u64>,
    progress: &SegmentProgress,
) -> Result<u64, TransferError> {
    let mut position = offset;
    let mut byte_stream = response.bytes_stream();

    while let Some(piece) = byte_stream.next().await {
        let chunk = piece?;
        let take = match remaining {
            Some(left) => (left.min(chunk.len() as u64)) as usize,
            None => chunk.len(),
        };

        writer.write_all(&chunk[..take]).await?;
        position += take as u64;
        progress.advance_to(position);

        if let Some(left) = remaining.as_mut() {
            *left -= take as u64;
            if *left == 0 {
                break;
            }
        }
    }

    Ok(position - offset)
}
