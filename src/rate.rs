/// Rates derived from two samples of cumulative counters
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{BYTES_PER_KB, METRIC_PRECISION, MILLIS_PER_SEC};
use crate::fixed_point::{divide, DivideByZero, FixedPoint};
use crate::sample::Sample;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error("interval too short: previous sample taken this same second")]
    IntervalTooShort,

    #[error("clock went backwards: previous sample at {previous}, now {now}")]
    ClockWentBackwards { previous: i64, now: i64 },

    #[error(transparent)]
    Divide(#[from] DivideByZero),
}

/// The four reported metrics, never negative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Transactions per second
    pub tps: FixedPoint,
    pub kb_read_per_sec: FixedPoint,
    pub kb_written_per_sec: FixedPoint,
    /// Weighted I/O time as a percentage of wall time
    pub util_pct: FixedPoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rates {
    /// No earlier sample exists for the device
    FirstRun,
    Measured(Metrics),
}

/// Derive rates between `prev` and `cur` over `now - prev.timestamp` seconds.
pub fn compute(prev: Option<&Sample>, cur: &Sample, now: i64) -> Result<Rates, RateError> {
    let prev = match prev {
        Some(p) => p,
        None => return Ok(Rates::FirstRun),
    };

    let deltatime = now - prev.timestamp;
    if deltatime == 0 {
        return Err(RateError::IntervalTooShort);
    }
    if deltatime < 0 {
        return Err(RateError::ClockWentBackwards {
            previous: prev.timestamp,
            now,
        });
    }

    let delta = |cur: u64, prev: u64| cur as i128 - prev as i128;
    let d_transactions = delta(cur.transactions, prev.transactions);
    let d_read = delta(cur.bytes_read, prev.bytes_read);
    let d_written = delta(cur.bytes_written, prev.bytes_written);
    let d_weighted = delta(cur.weighted_io_time_ms, prev.weighted_io_time_ms);
    debug!(
        deltatime,
        d_transactions, d_read, d_written, d_weighted, "computed counter deltas"
    );

    let kb_seconds = deltatime.saturating_mul(BYTES_PER_KB as i64);
    let ms_elapsed = deltatime.saturating_mul(MILLIS_PER_SEC as i64);

    Ok(Rates::Measured(Metrics {
        tps: clamped("tps", divide(d_transactions, deltatime, METRIC_PRECISION)?),
        kb_read_per_sec: clamped("KB_read/s", divide(d_read, kb_seconds, METRIC_PRECISION)?),
        kb_written_per_sec: clamped(
            "KB_written/s",
            divide(d_written, kb_seconds, METRIC_PRECISION)?,
        ),
        util_pct: clamped(
            "io-utilisation",
            divide(d_weighted * 100, ms_elapsed, METRIC_PRECISION)?,
        ),
    }))
}

/// A counter that went down (reboot or wrap) yields zero, not a negative rate.
fn clamped(name: &str, value: FixedPoint) -> FixedPoint {
    if value.is_negative() {
        warn!(metric = name, %value, "counter decreased, reporting zero");
        FixedPoint::zero()
    } else {
        value
    }
}
