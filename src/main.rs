use std::io::{self, Write};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

mod check;
mod cli;
mod constants;
mod diskstats;
mod fixed_point;
mod logging;
mod rate;
mod report;
mod sample;
mod threshold;

use check::Check;
use cli::Cli;
use diskstats::SysfsCounters;
use logging::{init_logging, LogConfig};
use report::Report;
use sample::FileSampleStore;

fn main() {
    let code = match Cli::parse_or_usage(std::env::args_os()) {
        Ok(cli) => {
            let mut log_config = LogConfig::new("warn");
            if cli.verbose {
                log_config = log_config.with_level("debug");
            }
            if let Err(err) = init_logging(&log_config) {
                eprintln!("logging disabled: {err}");
            }
            run(&cli)
        }
        Err(usage) => {
            print!("{}", usage.text);
            usage.code
        }
    };

    let _ = io::stdout().flush();
    process::exit(code);
}

/// Run one check and print its status line. Returns the exit code.
fn run(cli: &Cli) -> i32 {
    let source = SysfsCounters::new(&cli.dev_root, &cli.sys_block_root);
    let store = FileSampleStore::new(&cli.state_dir);

    let outcome = Check::new(cli.device.as_str(), cli.warning, cli.critical).and_then(|check| {
        tracing::debug!(device = check.device(), state_dir = %cli.state_dir.display(), "running check");
        check.run(&source, &store, unix_now())
    });

    match outcome {
        Ok(report) => {
            tracing::debug!(status = %report.status(), "check complete");
            println!("{report}");
            report.exit_code()
        }
        Err(err) => {
            tracing::error!(error = %err, "check failed");
            let report = Report::unknown(err.to_string());
            println!("{report}");
            if err.is_usage() {
                println!();
                print!("{}", cli::usage_text());
            }
            report.exit_code()
        }
    }
}

/// Wall-clock seconds since the epoch; unaffected by timezone or DST.
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
