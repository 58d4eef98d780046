//! Post-merge MD5 checksum.

use crate::error::TransferError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Computes the MD5 hash of a local file.
///
/// Reads in 1 MiB chunks on the blocking pool so large files neither sit in
/// memory nor stall the runtime.
///
/// # Arguments
///
/// * `path` - Path to the file
///
/// # Returns
///
/// The MD5 hash as a lowercase hexadecimal string, or an error.
pub async fn compute_file_md5(path: &Path) -> Result<String, TransferError> {
    let path: PathBuf = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        use md5::{Digest, Md5};
        use std::io::Read;

        let file = std::fs::File::open(&path)?;
        let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; 1024 * 1024];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok::<String, TransferError>(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| TransferError::Task(e.to_string()))?
}

/// Whether an ETag looks like a plain MD5 digest.
///
/// Multipart uploads carry a `-<parts>` suffix and are not content hashes.
pub fn etag_is_md5(etag: &str) -> bool {
    etag.len() == 32 && etag.chars().all(|c| c.is_ascii_hexdigit())
}

/// Hashes `path` and compares it with `etag` when the ETag is an MD5.
///
/// A mismatch is logged, not returned as an error: the merge already
/// happened and the caller decides what to do with the file.
pub async fn verify_against_etag(
    path: &Path,
    etag: Option<&str>,
) -> Result<String, TransferError> {
    let file_display_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");

    info!("🔍 Computing MD5 for {}", file_display_name);
    let computed = compute_file_md5(path).await?;

    match etag {
        Some(expected) if etag_is_md5(expected) => {
            if computed.eq_ignore_ascii_case(expected) {
                info!("✅ MD5 verified for {} ({})", file_display_name, computed);
            } else {
                warn!(
                    "❌ MD5 mismatch for {}: expected {}, got {}",
                    file_display_name, expected, computed
                );
            }
        }
        _ => info!(
            "MD5 of {} is {} (no comparable ETag)",
            file_display_name, computed
        ),
    }
    Ok(computed)
}
