//! Shared progress counters and the periodic reporter.

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Point-in-time view of a [`ProgressTracker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub bytes_completed: u64,
    pub workers_finished: usize,
}

/// Counters shared by every segment worker and the reporter.
///
/// Both counters only ever grow. One tracker is created per transfer and
/// handed to each task behind an `Arc`.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    bytes_completed: AtomicU64,
    workers_finished: AtomicUsize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `n` bytes that are now on disk.
    pub fn add_bytes(&self, n: u64) {
        self.bytes_completed.fetch_add(n, Ordering::Relaxed);
    }

    /// Records that one worker has returned, whatever its outcome.
    pub fn add_finished_worker(&self) {
        self.workers_finished.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            workers_finished: self.workers_finished.load(Ordering::Acquire),
            bytes_completed: self.bytes_completed.load(Ordering::Relaxed),
        }
    }
}

/// Per-segment view onto the shared tracker.
///
/// Keeps the highest file offset already reported for one segment so that
/// bytes rewritten by a retried attempt are not counted twice.
#[derive(Debug)]
pub struct SegmentProgress {
    tracker: Arc<ProgressTracker>,
    reported: AtomicU64,
}

impl SegmentProgress {
    pub fn new(tracker: Arc<ProgressTracker>) -> Self {
        Self {
            tracker,
            reported: AtomicU64::new(0),
        }
    }

    /// The segment's temp file now holds `len` bytes.
    pub fn advance_to(&self, len: u64) {
        let previous = self.reported.fetch_max(len, Ordering::Relaxed);
        if len > previous {
            self.tracker.add_bytes(len - previous);
        }
    }

    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }
}

/// Creates the byte progress bar, hidden unless `visible`.
pub fn byte_bar(total_size: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg} | {bytes_per_sec}, ETA {eta_precise}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ "),
    );
    pb
}

/// Creates the per-segment merge progress bar, hidden unless `visible`.
pub fn merge_bar(segment_count: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(segment_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ "),
    );
    pb.set_message("🔄 Merging segments");
    pb
}

/// Polls `tracker` every `interval` until `expected_workers` have finished.
///
/// Each tick logs cumulative bytes and throughput (or moves `pb` when it is
/// visible). One final report is emitted before the task returns.
pub fn spawn_reporter(
    tracker: Arc<ProgressTracker>,
    total_size: u64,
    expected_workers: usize,
    interval: Duration,
    pb: ProgressBar,
) -> JoinHandle<ProgressSnapshot> {
    tokio::spawn(async move {
        let started = Instant::now();
        let baseline = tracker.snapshot().bytes_completed;
        let mut last = baseline;
        let interval = interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let snap = tracker.snapshot();
            if snap.workers_finished >= expected_workers {
                break;
            }

            let speed = (snap.bytes_completed.saturating_sub(last) as f64
                / interval.as_secs_f64().max(f64::EPSILON)) as u64;
            last = snap.bytes_completed;

            pb.set_position(snap.bytes_completed);
            let line = format!(
                "Downloaded {}/{} ({:.1}%) at {}/s, {}/{} segments finished",
                HumanBytes(snap.bytes_completed),
                HumanBytes(total_size),
                percent(snap.bytes_completed, total_size),
                HumanBytes(speed),
                snap.workers_finished,
                expected_workers
            );
            if pb.is_hidden() {
                info!("{}", line);
            } else {
                debug!("{}", line);
            }
        }

        let snap = tracker.snapshot();
        let elapsed = started.elapsed();
        let fresh = snap.bytes_completed.saturating_sub(baseline);
        let average = (fresh as f64 / elapsed.as_secs_f64().max(f64::EPSILON)) as u64;
        pb.set_position(snap.bytes_completed);
        pb.finish_and_clear();
        info!(
            "📊 Downloaded {}/{} ({:.1}%), {} this run in {} ({}/s average)",
            HumanBytes(snap.bytes_completed),
            HumanBytes(total_size),
            percent(snap.bytes_completed, total_size),
            HumanBytes(fresh),
            humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64)),
            HumanBytes(average)
        );
        snap
    })
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let tracker = Arc::new(ProgressTracker::new());
        let mut tasks = vec![];
        for _ in 0..16 {
            let tracker = Arc::clone(&tracker);
            tasks.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    tracker.add_bytes(3);
                }
                tracker.add_finished_worker();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snap = tracker.snapshot();
        assert_eq!(snap.bytes_completed, 16 * 1000 * 3);
        assert_eq!(snap.workers_finished, 16);
    }

    #[test]
    fn test_segment_progress_counts_each_byte_once() {
        let tracker = Arc::new(ProgressTracker::new());
        let progress = SegmentProgress::new(Arc::clone(&tracker));

        progress.advance_to(100);
        progress.advance_to(150);
        // A retry that starts from a shorter file must not recount.
        progress.advance_to(120);
        progress.advance_to(160);

        assert_eq!(progress.reported(), 160);
        assert_eq!(tracker.snapshot().bytes_completed, 160);
    }

    #[tokio::test]
    async fn test_reporter_stops_when_all_workers_finish() {
        let tracker = Arc::new(ProgressTracker::new());
        let reporter = spawn_reporter(
            Arc::clone(&tracker),
            10,
            2,
            Duration::from_millis(5),
            ProgressBar::hidden(),
        );

        tracker.add_bytes(4);
        tracker.add_finished_worker();
        tracker.add_bytes(6);
        tracker.add_finished_worker();

        let snap = tokio::time::timeout(Duration::from_secs(5), reporter)
            .await
            .expect("reporter should terminate")
            .unwrap();
        assert_eq!(
            snap,
            ProgressSnapshot {
                bytes_completed: 10,
                workers_finished: 2
            }
        );
    }
}
