/// Plugin status line formatting
use std::fmt;

use crate::constants::METRIC_PRECISION;
use crate::rate::Metrics;
use crate::threshold::Status;

/// Outcome of one check, rendered as a single line for the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    status: Status,
    body: Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Body {
    FirstRun,
    Measured(Metrics),
    Unknown(String),
}

impl Report {
    /// No history yet: OK with every metric reported as a bare `0`.
    pub fn first_run() -> Self {
        Self {
            status: Status::Ok,
            body: Body::FirstRun,
        }
    }

    pub fn measured(status: Status, metrics: Metrics) -> Self {
        Self {
            status,
            body: Body::Measured(metrics),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            status: Status::Unknown,
            body: Body::Unknown(message.into()),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: [String; 4] = match &self.body {
            Body::Unknown(message) => return write!(f, "{} - {}", self.status, message),
            Body::FirstRun => std::array::from_fn(|_| "0".to_string()),
            Body::Measured(m) => {
                let scale = METRIC_PRECISION as usize;
                [
                    m.tps.with_scale(scale),
                    m.kb_read_per_sec.with_scale(scale),
                    m.kb_written_per_sec.with_scale(scale),
                    m.util_pct.with_scale(scale),
                ]
            }
        };
        let [tps, read, written, util] = &values;

        write!(
            f,
            "{} - I/O stats tps={tps} KB_read/s={read} KB_written/s={written} %io-utilisation={util} \
             | 'tps'={tps}; 'KB_read/s'={read}; 'KB_written/s'={written}; 'io-utilisation'={util};",
            self.status
        )
    }
}
