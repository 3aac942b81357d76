/// Command line surface of the plugin
use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use crate::constants::{DEFAULT_STATE_ROOT, DEV_ROOT, EXIT_OK, EXIT_UNKNOWN, SYS_BLOCK_ROOT};
use crate::threshold::Thresholds;

#[derive(Parser, Debug)]
#[command(
    name = "check_iostat",
    version,
    about = "Report block device throughput and utilisation for a Nagios-style supervisor",
    after_help = "Thresholds are <tps>,<KB_read/s>,<KB_written/s>; every warning value must be \
                  below the matching critical value.\n\n\
                  Exit codes: 0 OK, 1 WARNING, 2 CRITICAL, 3 UNKNOWN (usage, configuration, \
                  interval too short, I/O failure)."
)]
pub struct Cli {
    /// Block device name, e.g. sda
    #[arg(short = 'd', long, value_name = "DEVICE")]
    pub device: String,

    /// Warning thresholds
    #[arg(short = 'w', long, value_name = "TPS,KB_READ,KB_WRITTEN")]
    pub warning: Thresholds,

    /// Critical thresholds
    #[arg(short = 'c', long, value_name = "TPS,KB_READ,KB_WRITTEN")]
    pub critical: Thresholds,

    /// Directory holding the per-device sample files
    #[arg(long, value_name = "DIR", env = "CHECK_IOSTAT_STATE_DIR", default_value = DEFAULT_STATE_ROOT)]
    pub state_dir: PathBuf,

    /// Log debug details to stderr
    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long, hide = true, default_value = DEV_ROOT)]
    pub dev_root: PathBuf,

    #[arg(long, hide = true, default_value = SYS_BLOCK_ROOT)]
    pub sys_block_root: PathBuf,
}

/// Text to print instead of running, with the exit code to use.
#[derive(Debug)]
pub struct Usage {
    pub text: String,
    pub code: i32,
}

impl Cli {
    /// Parse arguments. Help and every parse failure exit UNKNOWN.
    pub fn parse_or_usage<I, T>(args: I) -> Result<Self, Usage>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|err| match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => Usage {
                text: usage_text(),
                code: EXIT_UNKNOWN,
            },
            ErrorKind::DisplayVersion => Usage {
                text: err.to_string(),
                code: EXIT_OK,
            },
            _ => {
                let message = error_summary(&err.to_string());
                Usage {
                    text: format!("UNKNOWN - {message}\n\n{}", usage_text()),
                    code: EXIT_UNKNOWN,
                }
            }
        })
    }
}

/// Fold clap's error paragraph into one line. Indented detail lines, such
/// as the names of missing arguments, are appended to the headline.
fn error_summary(rendered: &str) -> String {
    let mut lines = rendered.lines().take_while(|line| !line.trim().is_empty());
    let headline = lines
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches("error: ");
    let details: Vec<&str> = lines.map(str::trim).collect();

    if details.is_empty() {
        headline.to_string()
    } else {
        format!("{headline} {}", details.join(", "))
    }
}

pub fn usage_text() -> String {
    Cli::command().render_help().to_string()
}
