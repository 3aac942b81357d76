/// Block device counter collection from sysfs
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::constants::{DEV_ROOT, SYS_BLOCK_ROOT};
use crate::sample::Sample;

/// Fields in `/sys/block/<dev>/stat` up to and including the weighted time
const STAT_MIN_FIELDS: usize = 11;

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("invalid device name '{0}'")]
    InvalidDevice(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Raw cumulative counters of one device plus its sector size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCounters {
    pub reads_completed: u64,
    pub sectors_read: u64,
    pub writes_completed: u64,
    pub sectors_written: u64,
    pub weighted_io_time_ms: u64,
    /// Bytes per sector
    pub sector_size: u64,
}

impl DeviceCounters {
    /// Convert to a byte-based sample taken at `timestamp`.
    pub fn into_sample(self, timestamp: i64) -> Sample {
        Sample {
            timestamp,
            transactions: self.reads_completed.wrapping_add(self.writes_completed),
            bytes_read: self.sectors_read.wrapping_mul(self.sector_size),
            bytes_written: self.sectors_written.wrapping_mul(self.sector_size),
            weighted_io_time_ms: self.weighted_io_time_ms,
        }
    }
}

/// Source of current counters for a named device.
pub trait CounterSource {
    /// Whether the device special file exists.
    fn device_exists(&self, device: &str) -> bool;

    fn read(&self, device: &str) -> Result<DeviceCounters, CounterError>;
}

/// Reads counters from `/sys/block` and checks devices under `/dev`.
#[derive(Debug, Clone)]
pub struct SysfsCounters {
    dev_root: PathBuf,
    sys_block_root: PathBuf,
}

impl Default for SysfsCounters {
    fn default() -> Self {
        Self::new(DEV_ROOT, SYS_BLOCK_ROOT)
    }
}

impl SysfsCounters {
    pub fn new(dev_root: impl Into<PathBuf>, sys_block_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
            sys_block_root: sys_block_root.into(),
        }
    }

    fn read_file(path: &Path) -> Result<String, CounterError> {
        fs::read_to_string(path).map_err(|source| CounterError::Read {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl CounterSource for SysfsCounters {
    fn device_exists(&self, device: &str) -> bool {
        validate_device_name(device).is_ok() && self.dev_root.join(device).exists()
    }

    fn read(&self, device: &str) -> Result<DeviceCounters, CounterError> {
        validate_device_name(device)?;
        let device_dir = self.sys_block_root.join(device);

        let stat_path = device_dir.join("stat");
        let stat = Self::read_file(&stat_path)?;
        let (reads_completed, sectors_read, writes_completed, sectors_written, weighted_io_time_ms) =
            parse_stat(&stat).map_err(|reason| CounterError::Parse {
                path: stat_path.clone(),
                reason,
            })?;

        // Sector size of the device being measured, not of a fixed disk
        let size_path = device_dir.join("queue").join("hw_sector_size");
        let raw_size = Self::read_file(&size_path)?;
        let sector_size = raw_size
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|&size| size > 0)
            .ok_or_else(|| CounterError::Parse {
                path: size_path.clone(),
                reason: format!("bad sector size '{}'", raw_size.trim()),
            })?;

        let counters = DeviceCounters {
            reads_completed,
            sectors_read,
            writes_completed,
            sectors_written,
            weighted_io_time_ms,
            sector_size,
        };
        debug!(device, ?counters, "read device counters");
        Ok(counters)
    }
}

/// Reject names that would escape the device directories.
pub fn validate_device_name(device: &str) -> Result<(), CounterError> {
    if device.is_empty() || device == "." || device == ".." || device.contains('/') {
        return Err(CounterError::InvalidDevice(device.to_string()));
    }
    Ok(())
}

/// Parse the whitespace separated fields of a sysfs block `stat` file.
///
/// Kernel ABI (Documentation/block/stat.rst), 1-indexed:
///  1 read I/Os completed, 2 reads merged, 3 sectors read, 4 read ticks,
///  5 write I/Os completed, 6 writes merged, 7 sectors written, 8 write ticks,
///  9 in flight, 10 io ticks, 11 time in queue (weighted I/O time, ms).
/// Newer kernels append discard and flush fields, which are ignored.
///
/// Returns (reads, sectors read, writes, sectors written, weighted ms).
fn parse_stat(content: &str) -> Result<(u64, u64, u64, u64, u64), String> {
    let fields = content
        .split_whitespace()
        .take(STAT_MIN_FIELDS)
        .map(|f| f.parse::<u64>().map_err(|_| format!("non-numeric field '{f}'")))
        .collect::<Result<Vec<u64>, String>>()?;

    if fields.len() < STAT_MIN_FIELDS {
        return Err(format!(
            "expected at least {STAT_MIN_FIELDS} fields, found {}",
            fields.len()
        ));
    }

    Ok((fields[0], fields[2], fields[4], fields[6], fields[10]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    const STAT_LINE: &str =
        "    4821      120   385612     2210     9034      511   812344    15210        0    12030    17420\n";

    fn fake_tree(device: &str, stat: &str, sector_size: &str) -> (TempDir, SysfsCounters) {
        let dir = tempdir().unwrap();
        let dev = dir.path().join("dev");
        let block = dir.path().join("sys/block");
        fs::create_dir_all(&dev).unwrap();
        fs::create_dir_all(block.join(device).join("queue")).unwrap();
        fs::write(dev.join(device), "").unwrap();
        fs::write(block.join(device).join("stat"), stat).unwrap();
        fs::write(block.join(device).join("queue/hw_sector_size"), sector_size).unwrap();
        (dir, SysfsCounters::new(dev, block))
    }

    #[test]
    fn test_parse_stat_field_positions() {
        let (r, sr, w, sw, wio) = parse_stat(STAT_LINE).unwrap();
        assert_eq!(r, 4821);
        assert_eq!(sr, 385612);
        assert_eq!(w, 9034);
        assert_eq!(sw, 812344);
        assert_eq!(wio, 17420);
    }

    #[test]
    fn test_parse_stat_ignores_discard_fields() {
        let line = format!("{} 10 0 80 3 0 0\n", STAT_LINE.trim_end());
        let (_, _, _, _, wio) = parse_stat(&line).unwrap();
        assert_eq!(wio, 17420);
    }

    #[test]
    fn test_parse_stat_too_short() {
        assert!(parse_stat("1 2 3 4 5").is_err());
        assert!(parse_stat("").is_err());
    }

    #[test]
    fn test_parse_stat_non_numeric() {
        assert!(parse_stat("1 2 3 4 5 x 7 8 9 10 11").is_err());
    }

    #[test]
    fn test_validate_device_name() {
        assert!(validate_device_name("sda").is_ok());
        assert!(validate_device_name("nvme0n1").is_ok());
        assert!(validate_device_name("").is_err());
        assert!(validate_device_name("..").is_err());
        assert!(validate_device_name("../etc").is_err());
        assert!(validate_device_name("mapper/root").is_err());
    }

    #[test]
    fn test_into_sample_converts_sectors_to_bytes() {
        let counters = DeviceCounters {
            reads_completed: 40,
            sectors_read: 10,
            writes_completed: 2,
            sectors_written: 3,
            weighted_io_time_ms: 99,
            sector_size: 4096,
        };
        let sample = counters.into_sample(1000);
        assert_eq!(sample.timestamp, 1000);
        assert_eq!(sample.transactions, 42);
        assert_eq!(sample.bytes_read, 40960);
        assert_eq!(sample.bytes_written, 12288);
        assert_eq!(sample.weighted_io_time_ms, 99);
    }

    #[test]
    fn test_sysfs_read() {
        let (_dir, source) = fake_tree("sdb", STAT_LINE, "512\n");
        assert!(source.device_exists("sdb"));
        let counters = source.read("sdb").unwrap();
        assert_eq!(counters.reads_completed, 4821);
        assert_eq!(counters.writes_completed, 9034);
        assert_eq!(counters.sector_size, 512);
    }

    #[test]
    fn test_sysfs_uses_sector_size_of_requested_device() {
        let (dir, source) = fake_tree("sdb", STAT_LINE, "4096\n");
        let other = dir.path().join("sys/block/sda/queue");
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join("hw_sector_size"), "512\n").unwrap();
        assert_eq!(source.read("sdb").unwrap().sector_size, 4096);
    }

    #[test]
    fn test_sysfs_missing_device() {
        let (_dir, source) = fake_tree("sda", STAT_LINE, "512\n");
        assert!(!source.device_exists("sdz"));
        assert!(matches!(source.read("sdz"), Err(CounterError::Read { .. })));
    }

    #[test]
    fn test_sysfs_bad_sector_size() {
        let (_dir, source) = fake_tree("sda", STAT_LINE, "0\n");
        assert!(matches!(source.read("sda"), Err(CounterError::Parse { .. })));
    }
}
