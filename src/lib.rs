//! partfetch - Resumable, segmented HTTP(S) downloader
//!
//! This library splits a single remote object into byte-range segments,
//! downloads them concurrently into `<file>.tempN` files and merges them in
//! index order into the final file.
//!
//! # Features
//!
//! - **Resumable Downloads**: Segment files left by an interrupted run are continued, not restarted
//! - **Parallel Segments**: One task per segment, optionally bounded
//! - **Progress Tracking**: Lock-free shared counters with a periodic reporter
//! - **Thunder Links**: `thunder://` links are decoded to their HTTP(S) target
//! - **Optional Hardening**: Retry with jitter and per-attempt timeouts
//! - **MD5 Verification**: Optional checksum of the merged file against the ETag
//!
//! # Example
//!
//! ```no_run
//! use partfetch::{Coordinator, TransferConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TransferConfig {
//!     segment_count: 8,
//!     ..TransferConfig::default()
//! };
//! let report = Coordinator::new(config)?
//!     .download("https://example.com/big.iso")
//!     .await?;
//! println!("finished: {}", report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod coordinator;
pub mod error;
pub mod link;
pub mod merge;
pub mod planner;
pub mod progress;
pub mod remote;
pub mod retry;
pub mod types;
pub mod worker;

pub use coordinator::Coordinator;
pub use error::TransferError;
pub use link::{decode_thunder, normalize};
pub use planner::plan;
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use retry::RetryPolicy;
pub use types::{
    Segment, SegmentOutcome, SegmentReport, TransferConfig, TransferJob, TransferReport,
    TransferState,
};
pub use worker::SegmentWorker;
