/// Persisted samples, the only memory shared between invocations
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};
#[cfg(test)]
use std::{cell::RefCell, collections::HashMap};

use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{
    STATE_FIELD_DELIMITER, STATE_FILE_PREFIX, STATE_LOCK_POLL, STATE_LOCK_TIMEOUT,
};

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("state file {path} still locked by another run after {waited:?}")]
    Locked { path: PathBuf, waited: Duration },

    #[error("malformed sample record: {0}")]
    Malformed(String),
}

impl SampleError {
    fn io(path: &Path, source: io::Error) -> Self {
        SampleError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Point-in-time counters for one device, with sectors already converted
/// to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    /// Reads plus writes completed
    pub transactions: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Weighted milliseconds spent doing I/O
    pub weighted_io_time_ms: u64,
}

impl Sample {
    /// Single-line record: `timestamp:transactions:bytes_read:bytes_written:weighted_io_time`.
    pub fn encode(&self) -> String {
        let d = STATE_FIELD_DELIMITER;
        format!(
            "{}{d}{}{d}{}{d}{}{d}{}",
            self.timestamp,
            self.transactions,
            self.bytes_read,
            self.bytes_written,
            self.weighted_io_time_ms,
        )
    }
}

impl FromStr for Sample {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(STATE_FIELD_DELIMITER).collect();
        if fields.len() != 5 {
            return Err(SampleError::Malformed(format!(
                "expected 5 fields, found {}",
                fields.len()
            )));
        }

        let counter = |idx: usize| -> Result<u64, SampleError> {
            fields[idx]
                .parse()
                .map_err(|_| SampleError::Malformed(format!("bad counter '{}'", fields[idx])))
        };

        Ok(Sample {
            timestamp: fields[0]
                .parse()
                .map_err(|_| SampleError::Malformed(format!("bad timestamp '{}'", fields[0])))?,
            transactions: counter(1)?,
            bytes_read: counter(2)?,
            bytes_written: counter(3)?,
            weighted_io_time_ms: counter(4)?,
        })
    }
}

/// Key-value store of the most recent sample per device.
pub trait SampleStore {
    /// Previous sample, or `None` when nothing usable has been stored yet.
    fn load(&self, device: &str) -> Result<Option<Sample>, SampleError>;

    /// Replace the stored sample for `device`.
    fn store(&self, device: &str, sample: &Sample) -> Result<(), SampleError>;

    /// Serialise load-then-store for `device` across processes until the
    /// returned guard is dropped. Stores without cross-process state need
    /// no lock.
    fn lock(&self, _device: &str) -> Result<Option<StateLock>, SampleError> {
        Ok(None)
    }
}

/// Samples kept as `<root>/check_iostat.<device>`.
#[derive(Debug, Clone)]
pub struct FileSampleStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl FileSampleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: STATE_LOCK_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path_for(&self, device: &str) -> PathBuf {
        self.root.join(format!("{STATE_FILE_PREFIX}.{device}"))
    }
}

impl SampleStore for FileSampleStore {
    fn load(&self, device: &str) -> Result<Option<Sample>, SampleError> {
        let path = self.path_for(device);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SampleError::io(&path, e)),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        match content.parse::<Sample>() {
            Ok(sample) => Ok(Some(sample)),
            Err(e) => {
                // Overwritten by this run's store, so only one check is lost
                warn!(path = %path.display(), error = %e, "discarding unreadable sample");
                Ok(None)
            }
        }
    }

    fn store(&self, device: &str, sample: &Sample) -> Result<(), SampleError> {
        let path = self.path_for(device);
        let temp_path = self.root.join(format!(
            ".{STATE_FILE_PREFIX}.{device}.{}.tmp",
            std::process::id()
        ));

        let mut line = sample.encode();
        line.push('\n');

        replace_with(&temp_path, &path, |file| {
            file.write_all(line.as_bytes())?;
            file.sync_all()
        })?;

        debug!(path = %path.display(), record = %line.trim_end(), "stored sample");
        Ok(())
    }

    /// Exclusive `flock(2)` on a sidecar file. Retries while another run
    /// holds it, giving up with `Locked` after the store's lock timeout.
    fn lock(&self, device: &str) -> Result<Option<StateLock>, SampleError> {
        let path = self.root.join(format!("{STATE_FILE_PREFIX}.{device}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| SampleError::io(&path, e))?;

        let start = Instant::now();
        loop {
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc == 0 {
                debug!(path = %path.display(), "acquired state lock");
                return Ok(Some(StateLock { file }));
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => {}
                io::ErrorKind::Interrupted => continue,
                _ => return Err(SampleError::io(&path, err)),
            }

            let waited = start.elapsed();
            if waited >= self.lock_timeout {
                warn!(path = %path.display(), ?waited, "state lock still held, giving up");
                return Err(SampleError::Locked { path, waited });
            }
            thread::sleep(STATE_LOCK_POLL.min(self.lock_timeout - waited));
        }
    }
}

/// Create `temp_path`, fill it with `write`, then rename it over `path`.
/// The temp file is removed whenever a step fails.
fn replace_with<F>(temp_path: &Path, path: &Path, write: F) -> Result<(), SampleError>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut file = File::create(temp_path).map_err(|e| SampleError::io(temp_path, e))?;

    if let Err(e) = write(&mut file) {
        drop(file);
        let _ = fs::remove_file(temp_path);
        return Err(SampleError::io(temp_path, e));
    }

    if let Err(e) = fs::rename(temp_path, path) {
        let _ = fs::remove_file(temp_path);
        return Err(SampleError::io(path, e));
    }
    Ok(())
}

/// Advisory lock on one device's sample, released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// In-process store, used where no filesystem is wanted.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySampleStore {
    samples: RefCell<HashMap<String, Sample>>,
}

#[cfg(test)]
impl SampleStore for MemorySampleStore {
    fn load(&self, device: &str) -> Result<Option<Sample>, SampleError> {
        Ok(self.samples.borrow().get(device).copied())
    }

    fn store(&self, device: &str, sample: &Sample) -> Result<(), SampleError> {
        self.samples.borrow_mut().insert(device.to_string(), *sample);
        Ok(())
    }
}
