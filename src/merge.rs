//! Ordered merge of segment files into the final file.

use crate::error::TransferError;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tracing::{info, warn};

const MERGE_BUFFER: usize = 1024 * 1024;

/// Concatenates segment files, in the given order, into `final_path`.
///
/// The final file is truncated first. Any I/O error aborts the merge and
/// leaves the final file partially written; the segment files are never
/// touched here.
///
/// # Arguments
///
/// * `final_path` - Output file
/// * `temp_paths` - Segment files in ascending index order
/// * `merge_pb` - Progress bar advanced once per segment
///
/// # Returns
///
/// The number of bytes written, or the first I/O error.
pub async fn merge_segments(
    final_path: &Path,
    temp_paths: &[PathBuf],
    merge_pb: &indicatif::ProgressBar,
) -> Result<u64, TransferError> {
    info!("🔄 Merging {} segments into {:?}", temp_paths.len(), final_path);

    let file = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(final_path)
        .await?;
    let mut out = BufWriter::with_capacity(MERGE_BUFFER, file);

    let mut total = 0u64;
    for (index, temp_path) in temp_paths.iter().enumerate() {
        let segment = tokio::fs::File::open(temp_path).await?;
        let mut reader = BufReader::with_capacity(MERGE_BUFFER, segment);
        let copied = tokio::io::copy(&mut reader, &mut out).await?;
        total += copied;

        merge_pb.set_message(format!("| Merged {}/{}", index + 1, temp_paths.len()));
        merge_pb.inc(1);
    }
    out.flush().await?;
    out.get_ref().sync_all().await?;

    merge_pb.finish_with_message(format!("✅ Merged {} segments", temp_paths.len()));
    info!("✅ Merged {} bytes into {:?}", total, final_path);
    Ok(total)
}

/// Deletes segment files after a successful merge.
///
/// Missing files are ignored; other errors are logged and skipped.
pub async fn remove_segment_files(temp_paths: &[PathBuf]) {
    for temp_path in temp_paths {
        match tokio::fs::remove_file(temp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {:?}: {}", temp_path, e),
        }
    }
    info!("🧹 Removed {} segment files", temp_paths.len());
}
