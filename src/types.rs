//! Data structures for segmented transfers.

use crate::progress::ProgressSnapshot;
use crate::retry::RetryPolicy;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default client identification sent on every request.
pub const DEFAULT_USER_AGENT: &str = concat!("partfetch/", env!("CARGO_PKG_VERSION"));

/// Configuration for a segmented transfer.
///
/// # Example
///
/// ```
/// use partfetch::TransferConfig;
///
/// let config = TransferConfig {
///     segment_count: 8,
///     output_dir: "downloads".into(),
///     ..TransferConfig::default()
/// };
/// assert_eq!(config.segment_count, 8);
/// ```
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Number of byte-range segments the object is split into (default: 5).
    pub segment_count: usize,
    /// Maximum number of segments downloading at once.
    ///
    /// `None` runs every segment concurrently.
    pub max_concurrent_segments: Option<usize>,
    /// Directory the final file and its `.tempN` segment files are written to.
    pub output_dir: PathBuf,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
    /// Write buffer size per segment (default: 100 KiB).
    pub chunk_size: usize,
    /// How often the reporter samples progress (default: 1s).
    pub progress_interval: Duration,
    /// Retry and timeout policy wrapped around every segment attempt.
    ///
    /// The default performs exactly one attempt with no deadline.
    pub retry: RetryPolicy,
    /// Skip the merge unless every segment completed (default: false).
    ///
    /// When disabled, the merge runs even if some segments failed, which can
    /// produce a short or corrupt final file. Segment outcomes are always
    /// reported so callers can decide for themselves.
    pub require_all_segments: bool,
    /// Compute the MD5 of the merged file and compare it with the ETag.
    pub verify_checksum: bool,
    /// Render an interactive progress bar instead of periodic log lines.
    pub show_progress: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            segment_count: 5,
            max_concurrent_segments: None,
            output_dir: PathBuf::from("."),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chunk_size: 100 * 1024,
            progress_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            require_all_segments: false,
            verify_checksum: false,
            show_progress: false,
        }
    }
}

/// A single planned transfer. Immutable once created.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Canonical HTTP(S) URL of the object.
    pub url: String,
    /// File name derived from the URL's last path segment.
    pub file_name: String,
    /// Where the merged object ends up.
    pub final_path: PathBuf,
    /// Authoritative remote size in bytes.
    pub total_size: u64,
    /// Number of planned segments.
    pub segment_count: usize,
}

/// One contiguous, inclusive byte range of the remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position of this segment in merge order.
    pub index: usize,
    /// First byte offset, inclusive.
    pub start: u64,
    /// Last byte offset, inclusive.
    pub end: u64,
    /// `<final>.temp<index>`
    pub temp_path: PathBuf,
}

impl Segment {
    /// Number of bytes covered by this segment.
    pub fn byte_len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Whether this segment ends at the last byte of the object.
    pub fn is_final(&self, total_size: u64) -> bool {
        self.end + 1 == total_size
    }
}

/// Result of a single segment worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentOutcome {
    /// The temp file holds the whole segment.
    Completed,
    /// The worker gave up; the temp file holds whatever prefix was written.
    Failed { reason: String },
}

impl SegmentOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SegmentOutcome::Completed)
    }
}

/// Outcome of one segment, as exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub outcome: SegmentOutcome,
}

/// Lifecycle of a transfer.
///
/// `NotStarted → Planning → Downloading → Merging → {Done, MergeFailed}`,
/// with `AlreadyComplete` and `SegmentsFailed` as early exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    NotStarted,
    Planning,
    Downloading,
    Merging,
    Done,
    MergeFailed,
    /// The local file was already at least as large as the remote object.
    AlreadyComplete,
    /// A segment failed and the merge was gated off.
    SegmentsFailed,
}

/// Summary of a finished `Coordinator::download` call.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub url: String,
    pub final_path: PathBuf,
    pub total_size: u64,
    pub state: TransferState,
    pub segments: Vec<SegmentReport>,
    /// Final progress counters of this run; zero when no segment ran.
    pub progress: ProgressSnapshot,
    /// Hex MD5 of the merged file, when checksum verification is enabled.
    pub md5: Option<String>,
    #[serde(with = "elapsed_serde")]
    pub elapsed: Duration,
}

impl TransferReport {
    /// `true` when the final file is in place and every segment completed.
    ///
    /// A merge over failed segments still ends in `Done`, but the file is
    /// short or corrupt, so it does not count as success.
    pub fn is_success(&self) -> bool {
        matches!(
            self.state,
            TransferState::Done | TransferState::AlreadyComplete
        ) && self.segments.iter().all(|s| s.outcome.is_completed())
    }

    /// Indices of segments that did not complete.
    pub fn failed_segments(&self) -> Vec<usize> {
        self.segments
            .iter()
            .filter(|s| !s.outcome.is_completed())
            .map(|s| s.index)
            .collect()
    }
}

mod elapsed_serde {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: u64, end: u64) -> Segment {
        Segment {
            index: 0,
            start,
            end,
            temp_path: PathBuf::from("f.zip.temp0"),
        }
    }

    #[test]
    fn test_segment_len_and_final() {
        let s = segment(800, 999);
        assert_eq!(s.byte_len(), 200);
        assert!(s.is_final(1000));
        assert!(!segment(0, 199).is_final(1000));
    }

    #[test]
    fn test_report_success_and_failures() {
        let mut report = TransferReport {
            url: "http://example.com/f.zip".to_string(),
            final_path: PathBuf::from("f.zip"),
            total_size: 10,
            state: TransferState::Done,
            segments: vec![
                SegmentReport {
                    index: 0,
                    start: 0,
                    end: 4,
                    outcome: SegmentOutcome::Completed,
                },
                SegmentReport {
                    index: 1,
                    start: 5,
                    end: 9,
                    outcome: SegmentOutcome::Failed {
                        reason: "boom".to_string(),
                    },
                },
            ],
            progress: ProgressSnapshot {
                bytes_completed: 5,
                workers_finished: 2,
            },
            md5: None,
            elapsed: Duration::from_millis(1500),
        };
        assert!(!report.is_success());
        assert_eq!(report.failed_segments(), vec![1]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "done");
        assert_eq!(json["segments"][1]["outcome"]["status"], "failed");
        assert_eq!(json["elapsed"], "1s 500ms");
        assert_eq!(json["progress"]["bytes_completed"], 5);

        report.segments.truncate(1);
        assert!(report.is_success());
    }
}
