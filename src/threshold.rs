/// Warning and critical thresholds and the resulting plugin status
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::constants::{EXIT_CRITICAL, EXIT_OK, EXIT_UNKNOWN, EXIT_WARNING};
use crate::rate::Metrics;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThresholdError {
    #[error("expected <tps>,<kb_read>,<kb_written>, got '{0}'")]
    Format(String),

    #[error("invalid {metric} threshold '{value}'")]
    Value { metric: &'static str, value: String },

    #[error("warning {metric} threshold ({warning}) must be below critical ({critical})")]
    NotIncreasing {
        metric: &'static str,
        warning: u64,
        critical: u64,
    },
}

/// Plugin status, ordered by severity.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => EXIT_OK,
            Status::Warning => EXIT_WARNING,
            Status::Critical => EXIT_CRITICAL,
            Status::Unknown => EXIT_UNKNOWN,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One `(tps, kb_read, kb_written)` triple.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Thresholds {
    pub tps: u64,
    pub kb_read: u64,
    pub kb_written: u64,
}

const METRIC_NAMES: [&str; 3] = ["tps", "KB_read/s", "KB_written/s"];

impl Thresholds {
    fn components(&self) -> [u64; 3] {
        [self.tps, self.kb_read, self.kb_written]
    }
}

impl FromStr for Thresholds {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(ThresholdError::Format(s.to_string()));
        }

        let mut values = [0u64; 3];
        for (idx, part) in parts.iter().enumerate() {
            values[idx] = part.parse().map_err(|_| ThresholdError::Value {
                metric: METRIC_NAMES[idx],
                value: part.to_string(),
            })?;
        }

        Ok(Thresholds {
            tps: values[0],
            kb_read: values[1],
            kb_written: values[2],
        })
    }
}

/// Every warning component must sit strictly below its critical one.
pub fn validate(warning: &Thresholds, critical: &Thresholds) -> Result<(), ThresholdError> {
    for ((&metric, w), c) in METRIC_NAMES
        .iter()
        .zip(warning.components())
        .zip(critical.components())
    {
        if w >= c {
            return Err(ThresholdError::NotIncreasing {
                metric,
                warning: w,
                critical: c,
            });
        }
    }
    Ok(())
}

/// CRITICAL if any throughput metric reaches its critical threshold, else
/// WARNING if any reaches its warning threshold, else OK. Utilisation is
/// reported only. Comparisons use the truncated integer part.
pub fn evaluate(metrics: &Metrics, warning: &Thresholds, critical: &Thresholds) -> Status {
    let observed = [
        metrics.tps.integer_part(),
        metrics.kb_read_per_sec.integer_part(),
        metrics.kb_written_per_sec.integer_part(),
    ];
    let reaches = |limits: [u64; 3]| {
        observed
            .iter()
            .zip(limits)
            .any(|(&value, limit)| value >= limit as i128)
    };

    if reaches(critical.components()) {
        Status::Critical
    } else if reaches(warning.components()) {
        Status::Warning
    } else {
        Status::Ok
    }
}
