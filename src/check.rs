/// One plugin run: sample, persist, derive rates, classify
use thiserror::Error;
use tracing::{debug, info};

use crate::diskstats::{validate_device_name, CounterError, CounterSource};
use crate::rate::{self, RateError, Rates};
use crate::report::Report;
use crate::sample::{SampleError, SampleStore};
use crate::threshold::{self, ThresholdError, Thresholds};

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("invalid thresholds: {0}")]
    Threshold(#[from] ThresholdError),

    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    #[error(transparent)]
    Counters(#[from] CounterError),

    #[error(transparent)]
    State(#[from] SampleError),

    #[error(transparent)]
    Rate(#[from] RateError),
}

impl CheckError {
    /// Configuration problems are answered with the usage text.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            CheckError::Threshold(_)
                | CheckError::DeviceNotFound(_)
                | CheckError::Counters(CounterError::InvalidDevice(_))
        )
    }
}

/// A validated check of one device.
#[derive(Debug, Clone)]
pub struct Check {
    device: String,
    warning: Thresholds,
    critical: Thresholds,
}

impl Check {
    /// Rejects incoherent thresholds and unsafe device names before
    /// anything is measured.
    pub fn new(
        device: impl Into<String>,
        warning: Thresholds,
        critical: Thresholds,
    ) -> Result<Self, CheckError> {
        let device = device.into();
        threshold::validate(&warning, &critical)?;
        validate_device_name(&device)?;
        Ok(Self {
            device,
            warning,
            critical,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Run the check at wall-clock second `now`.
    ///
    /// The current sample is stored before rates are derived, so a run that
    /// fails with a too-short interval still leaves the freshest counters
    /// behind for the next run.
    pub fn run(
        &self,
        source: &dyn CounterSource,
        store: &dyn SampleStore,
        now: i64,
    ) -> Result<Report, CheckError> {
        if !source.device_exists(&self.device) {
            return Err(CheckError::DeviceNotFound(self.device.clone()));
        }

        let _lock = store.lock(&self.device)?;
        let previous = store.load(&self.device)?;
        let current = source.read(&self.device)?.into_sample(now);
        store.store(&self.device, &current)?;
        debug!(device = %self.device, ?previous, ?current, "sampled device");

        match rate::compute(previous.as_ref(), &current, now)? {
            Rates::FirstRun => {
                info!(device = %self.device, "no previous sample, reporting zero rates");
                Ok(Report::first_run())
            }
            Rates::Measured(metrics) => {
                let status = threshold::evaluate(&metrics, &self.warning, &self.critical);
                Ok(Report::measured(status, metrics))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diskstats::DeviceCounters;
    use crate::sample::{MemorySampleStore, Sample};
    use crate::threshold::Status;
    use std::cell::Cell;

    struct FakeCounters {
        present: bool,
        reads: Cell<usize>,
        counters: Cell<DeviceCounters>,
    }

    impl FakeCounters {
        fn new(counters: DeviceCounters) -> Self {
            Self {
                present: true,
                reads: Cell::new(0),
                counters: Cell::new(counters),
            }
        }
    }

    impl CounterSource for FakeCounters {
        fn device_exists(&self, _device: &str) -> bool {
            self.present
        }

        fn read(&self, _device: &str) -> Result<DeviceCounters, CounterError> {
            self.reads.set(self.reads.get() + 1);
            Ok(self.counters.get())
        }
    }

    fn counters(reads: u64, sectors_read: u64, weighted: u64) -> DeviceCounters {
        DeviceCounters {
            reads_completed: reads,
            sectors_read,
            writes_completed: 0,
            sectors_written: 0,
            weighted_io_time_ms: weighted,
            sector_size: 512,
        }
    }

    fn triple(tps: u64, kb_read: u64, kb_written: u64) -> Thresholds {
        Thresholds {
            tps,
            kb_read,
            kb_written,
        }
    }

    fn check() -> Check {
        Check::new("sda", triple(10, 60, 60), triple(20, 100, 100)).unwrap()
    }

    #[test]
    fn test_equal_thresholds_rejected_before_reading() {
        let err = Check::new("sda", triple(10, 10, 10), triple(10, 10, 10)).unwrap_err();
        assert!(err.is_usage());
        assert!(matches!(err, CheckError::Threshold(_)));
    }

    #[test]
    fn test_bad_device_name_rejected() {
        let err = Check::new("../sda", triple(1, 1, 1), triple(2, 2, 2)).unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn test_missing_device_reads_nothing() {
        let mut source = FakeCounters::new(counters(1, 1, 1));
        source.present = false;
        let store = MemorySampleStore::default();

        let err = check().run(&source, &store, 1000).unwrap_err();
        assert!(matches!(err, CheckError::DeviceNotFound(ref d) if d == "sda"));
        assert!(err.is_usage());
        assert_eq!(source.reads.get(), 0);
        assert_eq!(store.load("sda").unwrap(), None);
    }

    #[test]
    fn test_first_run_then_measured() {
        let source = FakeCounters::new(counters(100, 1000, 500));
        let store = MemorySampleStore::default();

        let report = check().run(&source, &store, 1000).unwrap();
        assert_eq!(report, Report::first_run());
        assert_eq!(
            store.load("sda").unwrap(),
            Some(Sample {
                timestamp: 1000,
                transactions: 100,
                bytes_read: 512_000,
                bytes_written: 0,
                weighted_io_time_ms: 500,
            })
        );

        // 50 transactions and 1000 sectors (500 KB) over 10 seconds
        source.counters.set(counters(150, 2000, 700));
        let report = check().run(&source, &store, 1010).unwrap();
        assert_eq!(report.status(), Status::Ok);
        assert_eq!(
            report.to_string(),
            "OK - I/O stats tps=5.0 KB_read/s=50.0 KB_written/s=0.0 %io-utilisation=2.0 \
             | 'tps'=5.0; 'KB_read/s'=50.0; 'KB_written/s'=0.0; 'io-utilisation'=2.0;"
        );
    }

    #[test]
    fn test_critical_throughput() {
        let source = FakeCounters::new(counters(0, 0, 0));
        let store = MemorySampleStore::default();
        check().run(&source, &store, 1000).unwrap();

        // 2400 sectors of 512 bytes over 10 seconds = 120 KB/s
        source.counters.set(counters(50, 2400, 0));
        let report = check().run(&source, &store, 1010).unwrap();
        assert_eq!(report.status(), Status::Critical);
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn test_zero_interval_still_stores_sample() {
        let source = FakeCounters::new(counters(100, 0, 0));
        let store = MemorySampleStore::default();
        check().run(&source, &store, 1000).unwrap();

        source.counters.set(counters(300, 0, 0));
        let err = check().run(&source, &store, 1000).unwrap_err();
        assert!(matches!(err, CheckError::Rate(RateError::IntervalTooShort)));
        assert!(!err.is_usage());
        assert_eq!(store.load("sda").unwrap().unwrap().transactions, 300);
    }

    #[test]
    fn test_reboot_reports_zero() {
        let source = FakeCounters::new(counters(100, 5000, 900));
        let store = MemorySampleStore::default();
        check().run(&source, &store, 1000).unwrap();

        source.counters.set(counters(10, 20, 5));
        let report = check().run(&source, &store, 1060).unwrap();
        assert_eq!(report.status(), Status::Ok);
        assert!(report.to_string().starts_with(
            "OK - I/O stats tps=0.0 KB_read/s=0.0 KB_written/s=0.0 %io-utilisation=0.0 |"
        ));
    }
}
