//! Byte-range planning.

use crate::error::TransferError;
use crate::types::Segment;
use std::path::{Path, PathBuf};

/// Suffix appended to the final file name for segment files.
pub const TEMP_SUFFIX: &str = ".temp";

/// Path of the temporary file holding segment `index` of `final_path`.
pub fn temp_path(final_path: &Path, index: usize) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(format!("{}{}", TEMP_SUFFIX, index));
    PathBuf::from(name)
}

/// Splits `[0, total_size)` into contiguous inclusive segments.
///
/// Every segment but the last is `total_size / segment_count` bytes long; the
/// last one absorbs the remainder. When the object is smaller than the
/// requested count, one segment per byte is planned so no segment is empty.
///
/// # Arguments
///
/// * `total_size` - Remote object size in bytes
/// * `segment_count` - Requested number of segments
/// * `final_path` - Final file path, used to name the segment files
///
/// # Returns
///
/// Segments ordered by index, or a configuration error for an empty object
/// or a zero segment count.
pub fn plan(
    total_size: u64,
    segment_count: usize,
    final_path: &Path,
) -> Result<Vec<Segment>, TransferError> {
    if segment_count == 0 {
        return Err(TransferError::InvalidSegmentCount(segment_count));
    }
    if total_size == 0 {
        return Err(TransferError::EmptyObject);
    }

    let count = (segment_count as u64).min(total_size);
    let base = total_size / count;

    let segments = (0..count)
        .map(|i| {
            let start = i * base;
            let len = if i == count - 1 {
                total_size - base * (count - 1)
            } else {
                base
            };
            Segment {
                index: i as usize,
                start,
                end: start + len - 1,
                temp_path: temp_path(final_path, i as usize),
            }
        })
        .collect();

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(total: u64, count: usize) -> Vec<(u64, u64)> {
        plan(total, count, Path::new("f.zip"))
            .unwrap()
            .into_iter()
            .map(|s| (s.start, s.end))
            .collect()
    }

    #[test]
    fn test_even_split() {
        assert_eq!(
            ranges(1000, 5),
            vec![(0, 199), (200, 399), (400, 599), (600, 799), (800, 999)]
        );
    }

    #[test]
    fn test_last_segment_absorbs_remainder() {
        assert_eq!(ranges(10, 3), vec![(0, 2), (3, 5), (6, 9)]);
    }

    #[test]
    fn test_single_segment_covers_everything() {
        assert_eq!(ranges(42, 1), vec![(0, 41)]);
    }

    #[test]
    fn test_more_segments_than_bytes() {
        assert_eq!(ranges(3, 8), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_rejects_degenerate_input() {
        assert!(matches!(
            plan(0, 5, Path::new("f")),
            Err(TransferError::EmptyObject)
        ));
        assert!(matches!(
            plan(100, 0, Path::new("f")),
            Err(TransferError::InvalidSegmentCount(0))
        ));
    }

    #[test]
    fn test_temp_paths() {
        let segments = plan(100, 3, Path::new("out/f.zip")).unwrap();
        assert_eq!(segments[0].temp_path, PathBuf::from("out/f.zip.temp0"));
        assert_eq!(segments[2].temp_path, PathBuf::from("out/f.zip.temp2"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_partition_is_exact(
                total in 1u64..10_000_000,
                count in 1usize..64
            ) {
                let segments = plan(total, count, Path::new("f"))?;

                prop_assert_eq!(segments[0].start, 0);
                prop_assert_eq!(segments.last().unwrap().end, total - 1);
                for pair in segments.windows(2) {
                    prop_assert_eq!(pair[0].end + 1, pair[1].start);
                }
                let sum: u64 = segments.iter().map(|s| s.byte_len()).sum();
                prop_assert_eq!(sum, total);
                for (i, s) in segments.iter().enumerate() {
                    prop_assert_eq!(s.index, i);
                    prop_assert!(s.start <= s.end);
                }
            }
        }
    }
}
