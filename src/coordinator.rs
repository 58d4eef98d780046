//! Main orchestration logic for a segmented transfer.

use crate::checksum::verify_against_etag;
use crate::error::TransferError;
use crate::link::{file_name_from_url, normalize};
use crate::merge::{merge_segments, remove_segment_files};
use crate::planner::plan;
use crate::progress::{byte_bar, merge_bar, spawn_reporter, ProgressSnapshot, ProgressTracker};
use crate::remote::{build_client, probe};
use crate::types::{
    Segment, SegmentOutcome, SegmentReport, TransferConfig, TransferJob, TransferReport,
    TransferState,
};
use crate::worker::{local_len, SegmentWorker};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Drives one transfer from URL to merged file.
///
/// # Example
///
/// ```no_run
/// use partfetch::{Coordinator, TransferConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let coordinator = Coordinator::new(TransferConfig::default())?;
/// let report = coordinator.download("https://example.com/f.zip").await?;
/// assert!(report.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: TransferConfig,
    client: Client,
}

fn enter(state: &mut TransferState, next: TransferState) {
    debug!("Transfer state {:?} -> {:?}", state, next);
    *state = next;
}

impl Coordinator {
    pub fn new(config: TransferConfig) -> Result<Self, TransferError> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Downloads `url` into the configured output directory.
    ///
    /// This performs the following steps:
    ///
    /// 1. Validates the link and derives the file name (no I/O on failure)
    /// 2. Short-circuits when the local file is already complete
    /// 3. Queries the remote size once and plans the segments
    /// 4. Downloads every segment concurrently, resuming partial temp files
    /// 5. Merges the segments in index order and removes the temp files
    ///
    /// # Arguments
    ///
    /// * `url` - `http://`, `https://` or `thunder://` link
    ///
    /// # Returns
    ///
    /// A report whose state tells whether the final file is in place.
    /// Configuration and remote-metadata problems are returned as errors;
    /// segment and merge failures are reported, not returned.
    pub async fn download(&self, url: &str) -> Result<TransferReport, TransferError> {
        let started = Instant::now();
        let mut state = TransferState::NotStarted;

        let url = normalize(url)?;
        let file_name = file_name_from_url(&url)?;
        if self.config.segment_count == 0 {
            return Err(TransferError::InvalidSegmentCount(0));
        }
        let url = url.to_string();
        info!("Link to download: {}", url);

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let final_path = self.config.output_dir.join(&file_name);
        let local_size = local_len(&final_path).await;
        let remote = probe(&self.client, &url).await?;

        if local_size >= remote.content_length {
            info!(
                "✅ {} is already complete ({} bytes), nothing to download",
                file_name, local_size
            );
            return Ok(TransferReport {
                url,
                final_path,
                total_size: remote.content_length,
                state: TransferState::AlreadyComplete,
                segments: vec![],
                progress: ProgressSnapshot::default(),
                md5: None,
                elapsed: started.elapsed(),
            });
        }

        enter(&mut state, TransferState::Planning);
        let segments = plan(remote.content_length, self.config.segment_count, &final_path)?;
        let job = Arc::new(TransferJob {
            url: url.clone(),
            file_name: file_name.clone(),
            final_path: final_path.clone(),
            total_size: remote.content_length,
            segment_count: segments.len(),
        });

        if !remote.accepts_ranges && segments.len() > 1 {
            warn!("Server did not advertise byte-range support, segments may fail");
        }
        let mut resumed = false;
        for segment in &segments {
            if local_len(&segment.temp_path).await > 0 {
                resumed = true;
                break;
            }
        }
        if resumed {
            info!("⏯️  Resuming {} ({} bytes)", file_name, job.total_size);
        } else {
            info!(
                "⬇️  Downloading {} ({} bytes) in {} segments",
                file_name,
                job.total_size,
                segments.len()
            );
        }

        enter(&mut state, TransferState::Downloading);
        let (outcomes, progress) = self.download_segments(&job, &segments).await;
        info!(
            "Segments finished for {} after {}, {} of {} bytes on disk",
            file_name,
            humantime::format_duration(std::time::Duration::from_secs(
                started.elapsed().as_secs()
            )),
            progress.bytes_completed,
            job.total_size
        );

        let reports: Vec<SegmentReport> = segments
            .iter()
            .zip(outcomes)
            .map(|(segment, outcome)| SegmentReport {
                index: segment.index,
                start: segment.start,
                end: segment.end,
                outcome,
            })
            .collect();
        let failed = reports.iter().filter(|r| !r.outcome.is_completed()).count();
        let temp_paths: Vec<PathBuf> = segments.iter().map(|s| s.temp_path.clone()).collect();

        if failed > 0 {
            if self.config.require_all_segments {
                error!(
                    "❌ {} of {} segments failed, keeping segment files for a later run",
                    failed,
                    reports.len()
                );
                enter(&mut state, TransferState::SegmentsFailed);
                return Ok(self.report(&job, state, reports, progress, None, started));
            }
            warn!(
                "{} of {} segments failed, merging anyway",
                failed,
                reports.len()
            );
        }

        enter(&mut state, TransferState::Merging);
        let merge_pb = merge_bar(temp_paths.len(), self.config.show_progress);
        match merge_segments(&final_path, &temp_paths, &merge_pb).await {
            Ok(_) if failed > 0 => {
                warn!(
                    "⚠️  {} merged over {} failed segments, segment files kept for a later run",
                    file_name, failed
                );
                enter(&mut state, TransferState::Done);
            }
            Ok(_) => {
                remove_segment_files(&temp_paths).await;
                enter(&mut state, TransferState::Done);
            }
            Err(e) => {
                error!(
                    "❌ Merge of {} failed, segment files kept: {}",
                    file_name, e
                );
                enter(&mut state, TransferState::MergeFailed);
                return Ok(self.report(&job, state, reports, progress, None, started));
            }
        }

        let md5 = if self.config.verify_checksum {
            match verify_against_etag(&final_path, remote.etag.as_deref()).await {
                Ok(md5) => Some(md5),
                Err(e) => {
                    warn!("⚠️  Failed to compute MD5 for {}: {}", file_name, e);
                    None
                }
            }
        } else {
            None
        };

        info!("✅ Download of {} finished", file_name);
        Ok(self.report(&job, state, reports, progress, md5, started))
    }

    fn report(
        &self,
        job: &TransferJob,
        state: TransferState,
        segments: Vec<SegmentReport>,
        progress: ProgressSnapshot,
        md5: Option<String>,
        started: Instant,
    ) -> TransferReport {
        TransferReport {
            url: job.url.clone(),
            final_path: job.final_path.clone(),
            total_size: job.total_size,
            state,
            segments,
            progress,
            md5,
            elapsed: started.elapsed(),
        }
    }

    /// Runs one task per segment plus the progress reporter and waits for all
    /// of them. Outcomes are returned in segment order, together with the
    /// reporter's final snapshot.
    async fn download_segments(
        &self,
        job: &Arc<TransferJob>,
        segments: &[Segment],
    ) -> (Vec<SegmentOutcome>, ProgressSnapshot) {
        let tracker = Arc::new(ProgressTracker::new());
        let worker = Arc::new(SegmentWorker::new(
            self.client.clone(),
            Arc::clone(&tracker),
            self.config.retry.clone(),
            self.config.chunk_size,
        ));

        let pool_size = self
            .config
            .max_concurrent_segments
            .unwrap_or(segments.len())
            .clamp(1, segments.len().max(1));
        let semaphore = Arc::new(Semaphore::new(pool_size));

        let reporter = spawn_reporter(
            Arc::clone(&tracker),
            job.total_size,
            segments.len(),
            self.config.progress_interval,
            byte_bar(job.total_size, self.config.show_progress),
        );

        let mut tasks = Vec::with_capacity(segments.len());
        for segment in segments {
            let worker = Arc::clone(&worker);
            let job = Arc::clone(job);
            let segment = segment.clone();
            let semaphore = Arc::clone(&semaphore);

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                worker.run(&job, &segment).await
            }));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("Task join error: {}", e);
                    // The worker never reached its own finish accounting.
                    tracker.add_finished_worker();
                    outcomes.push(SegmentOutcome::Failed {
                        reason: format!("Task failed: {}", e),
                    });
                }
            }
        }

        let progress = match reporter.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Progress reporter failed: {}", e);
                tracker.snapshot()
            }
        };
        (outcomes, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_config_errors_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(TransferConfig {
            output_dir: dir.path().join("never-created"),
            ..TransferConfig::default()
        })
        .unwrap();

        for bad in ["", "ftp://example.com/f.zip", "http://example.com/"] {
            let err = coordinator.download(bad).await.unwrap_err();
            assert!(err.is_config(), "{} should be a config error", bad);
        }
        assert!(!dir.path().join("never-created").exists());
    }

    #[tokio::test]
    async fn test_zero_segments_rejected() {
        let coordinator = Coordinator::new(TransferConfig {
            segment_count: 0,
            ..TransferConfig::default()
        })
        .unwrap();

        let err = coordinator
            .download("http://127.0.0.1:9/f.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidSegmentCount(0)));
    }
}
