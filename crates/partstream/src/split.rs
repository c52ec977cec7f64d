//! Partitioning of a remote object into byte-range parts.
//!
//! The boundaries computed here are fixed before any concurrency begins and
//! fully determine the reconstruction layout, so the algorithm must stay
//! deterministic: identical input always yields identical part lists.

use crate::config::SplitConfig;
use crate::error::TransferError;
use crate::part::FilePart;

/// Advisory outcome of a dry-run split check.
///
/// Purely diagnostic: callers use it to decide whether attempting parallelism
/// is worthwhile and to explain single-part fallbacks in logs. It never
/// affects [`FileSplitter::split`] itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Splitability {
    Splittable,
    Unsplittable { reason: String },
}

impl Splitability {
    pub fn is_splittable(&self) -> bool {
        matches!(self, Splitability::Splittable)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Splitability::Splittable => None,
            Splitability::Unsplittable { reason } => Some(reason),
        }
    }
}

/// Splits a file of a known size into contiguous, non-overlapping parts.
#[derive(Debug, Clone)]
pub struct FileSplitter {
    config: SplitConfig,
}

impl FileSplitter {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    fn min_part_size(&self) -> u64 {
        // A zero part size would make the modular arithmetic below divide by
        // zero; 1 byte is the smallest meaningful part.
        self.config.min_part_size.max(1)
    }

    fn split_threshold(&self) -> u64 {
        self.min_part_size() + self.config.min_part_size_floor
    }

    /// Compute the part list for a file of `file_size` bytes.
    ///
    /// The returned parts are densely numbered by list position and exactly
    /// cover `[0, file_size - 1]` with no gaps or overlaps; no part is ever
    /// smaller than one byte.
    pub fn split(&self, file_size: i64) -> Result<Vec<FilePart>, TransferError> {
        if file_size <= 0 {
            return Err(TransferError::InvalidFileSize { size: file_size });
        }
        let size = file_size as u64;
        let min_part = self.min_part_size();
        let floor = self.config.min_part_size_floor;
        let max_parts = self.config.max_parts.max(1) as u64;

        if size < self.split_threshold() || max_parts == 1 {
            return Ok(vec![FilePart::new(0, 0, size - 1)]);
        }

        let mut parts = Vec::new();
        if size < max_parts.saturating_mul(min_part) {
            // Not enough bytes to fill `max_parts` full-size parts: emit
            // parts of exactly `min_part` each. A trailing residual below
            // the floor is folded into the last full part rather than
            // becoming an undersized part of its own.
            let full = size / min_part;
            let residual = size % min_part;
            let fold_residual = residual == 0 || residual < floor;

            let mut start = 0u64;
            for number in 0..full {
                let mut len = min_part;
                if number == full - 1 && fold_residual {
                    len += residual;
                }
                parts.push(FilePart::new(number as usize, start, start + len - 1));
                start += len;
            }
            if !fold_residual {
                parts.push(FilePart::new(full as usize, start, size - 1));
            }
        } else {
            // Large file: exactly `max_parts` equal shares, the last part
            // absorbing the division remainder.
            let part_size = size / max_parts;
            for number in 0..max_parts {
                let start = number * part_size;
                let end = if number == max_parts - 1 {
                    size - 1
                } else {
                    start + part_size - 1
                };
                parts.push(FilePart::new(number as usize, start, end));
            }
        }

        Ok(parts)
    }

    /// Run the threshold checks of [`split`](Self::split) without allocating
    /// parts.
    pub fn splitability(&self, file_size: i64) -> Splitability {
        if file_size <= 0 {
            return Splitability::Unsplittable {
                reason: format!("file size {file_size} is not positive"),
            };
        }
        if self.config.max_parts <= 1 {
            return Splitability::Unsplittable {
                reason: "parallel parts are limited to 1".to_owned(),
            };
        }
        let threshold = self.split_threshold();
        if (file_size as u64) < threshold {
            return Splitability::Unsplittable {
                reason: format!(
                    "file size {file_size} is below the split threshold of {threshold} bytes"
                ),
            };
        }
        Splitability::Splittable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(min_part_size: u64, min_part_size_floor: u64, max_parts: usize) -> FileSplitter {
        FileSplitter::new(SplitConfig {
            min_part_size,
            min_part_size_floor,
            max_parts,
        })
    }

    /// Every split must exactly cover `[0, size - 1]` with dense numbering.
    fn assert_covers(parts: &[FilePart], size: u64) {
        assert!(!parts.is_empty());
        assert_eq!(parts[0].start_byte, 0);
        assert_eq!(parts[parts.len() - 1].end_byte, size - 1);
        for (index, part) in parts.iter().enumerate() {
            assert_eq!(part.part_number, index);
            assert!(part.size_bytes() >= 1);
            if index > 0 {
                assert_eq!(parts[index - 1].end_byte + 1, part.start_byte);
            }
        }
    }

    #[test]
    fn non_positive_size_is_rejected() {
        let splitter = splitter(100, 10, 4);
        assert!(matches!(
            splitter.split(0),
            Err(TransferError::InvalidFileSize { size: 0 })
        ));
        assert!(matches!(
            splitter.split(-5),
            Err(TransferError::InvalidFileSize { size: -5 })
        ));
    }

    #[test]
    fn single_thread_always_yields_one_part() {
        let splitter = splitter(100, 10, 1);
        let parts = splitter.split(1000).unwrap();
        assert_eq!(parts, vec![FilePart::new(0, 0, 999)]);
        assert!(!splitter.splitability(1000).is_splittable());
        assert!(splitter.splitability(1000).reason().is_some());
    }

    #[test]
    fn small_file_below_threshold_yields_one_part() {
        // threshold = 100 + 10
        let splitter = splitter(100, 10, 4);
        let parts = splitter.split(109).unwrap();
        assert_eq!(parts, vec![FilePart::new(0, 0, 108)]);
        assert!(!splitter.splitability(109).is_splittable());
        assert!(splitter.splitability(110).is_splittable());
    }

    #[test]
    fn mid_sized_file_uses_min_part_sized_parts() {
        // 250 bytes, parts of exactly 100, residual 50 >= floor 10 becomes
        // its own trailing part.
        let splitter = splitter(100, 10, 4);
        let parts = splitter.split(250).unwrap();
        assert_eq!(
            parts,
            vec![
                FilePart::new(0, 0, 99),
                FilePart::new(1, 100, 199),
                FilePart::new(2, 200, 249),
            ]
        );
        assert_covers(&parts, 250);
    }

    #[test]
    fn small_residual_is_folded_into_last_full_part() {
        // 205 bytes: residual 5 < floor 10, so the second part stretches.
        let splitter = splitter(100, 10, 4);
        let parts = splitter.split(205).unwrap();
        assert_eq!(
            parts,
            vec![FilePart::new(0, 0, 99), FilePart::new(1, 100, 204)]
        );
        assert_covers(&parts, 205);
    }

    #[test]
    fn exact_multiple_has_no_residual_part() {
        let splitter = splitter(100, 10, 4);
        let parts = splitter.split(300).unwrap();
        assert_eq!(parts.len(), 3);
        assert_covers(&parts, 300);
        assert!(parts.iter().all(|part| part.size_bytes() == 100));
    }

    #[test]
    fn large_file_splits_into_max_parts_equal_shares() {
        // 1000 >= 4 * 100, so exactly 4 parts of 250.
        let splitter = splitter(100, 10, 4);
        let parts = splitter.split(1000).unwrap();
        assert_eq!(parts.len(), 4);
        assert_covers(&parts, 1000);
        assert!(parts.iter().all(|part| part.size_bytes() == 250));
    }

    #[test]
    fn large_file_remainder_goes_to_last_part() {
        // 1003 / 4 = 250, last part absorbs 3 extra bytes.
        let splitter = splitter(100, 10, 4);
        let parts = splitter.split(1003).unwrap();
        assert_eq!(parts.len(), 4);
        assert_covers(&parts, 1003);
        assert_eq!(parts[3].size_bytes(), 253);
        assert!(parts[..3].iter().all(|part| part.size_bytes() == 250));
    }

    #[test]
    fn thousand_bytes_single_thread_scenario() {
        let splitter = splitter(100, 10, 1);
        let parts = splitter.split(1000).unwrap();
        assert_eq!(parts, vec![FilePart::new(0, 0, 999)]);
    }

    #[test]
    fn million_bytes_two_thread_scenario() {
        let splitter = splitter(1000, 100, 2);
        let parts = splitter.split(1_000_000).unwrap();
        assert_eq!(parts.len(), 2);
        assert_covers(&parts, 1_000_000);
        assert!(parts.iter().all(|part| part.size_bytes() >= 1000));
    }

    #[test]
    fn split_is_deterministic() {
        let splitter = splitter(100, 10, 4);
        for size in [110, 205, 250, 300, 1000, 1003, 99_999] {
            assert_eq!(splitter.split(size).unwrap(), splitter.split(size).unwrap());
        }
    }

    #[test]
    fn no_standalone_part_below_the_floor() {
        let splitter = splitter(100, 10, 100);
        // Sweep the mid-size band: every produced part other than a folded
        // tail must be at least the floor.
        for size in 110..=1000 {
            let parts = splitter.split(size).unwrap();
            assert_covers(&parts, size as u64);
            for part in &parts {
                assert!(
                    part.size_bytes() >= 10,
                    "size {size} produced undersized part {part}"
                );
            }
        }
    }

    #[test]
    fn zero_min_part_size_is_clamped() {
        let splitter = splitter(0, 0, 4);
        let parts = splitter.split(10).unwrap();
        assert_covers(&parts, 10);
    }
}
