//! `volley` fetches a large number of URLs concurrently.
//!
//! The binary is a wrapper around volley-lib. Every URL is scheduled at once,
//! at most `--max-concurrency` of them are in flight, and every result is
//! printed as soon as it arrives, in the order the fetches finish.
//!
//! Fetch a few URLs:
//! ```sh
//! volley https://example.com https://example.org/about
//! ```
//!
//! Fetch a list of URLs, one per line:
//! ```sh
//! volley --input-file urls.txt
//! cat urls.txt | volley -
//! ```
//!
//! Print one JSON object per fetch:
//! ```sh
//! volley --format json --input-file urls.txt
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::collections::HashMap;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;

use anyhow::{Error, Result, bail};
use clap::Parser;
use formatters::log::init_logging;
use futures::StreamExt;
use log::{error, info, warn};
use volley_lib::Outcome;

mod client;
mod formatters;
mod options;
mod stats;
mod verbosity;

use crate::formatters::response::Fetched;
use crate::formatters::{format_stats, get_response_formatter};
use crate::options::{Config, VOLLEY_CONFIG_FILE, VolleyOptions};
use crate::stats::FetchStats;

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    FetchFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // `std::process::exit` skips destructors, so the work happens in
    // `run_main` and only its exit code crosses this boundary.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file and the command line.
fn load_config() -> Result<VolleyOptions> {
    let mut opts = VolleyOptions::parse();

    init_logging(&opts.config.verbose);

    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // A default config file is optional, but must be valid if present
        let default_config = PathBuf::from(VOLLEY_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    Ok(opts)
}

/// Set up runtime and call volley entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e}");
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;

    match runtime.block_on(run(&opts)) {
        Err(e) if Some(ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res,
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Fetch all inputs and print their outcomes as they complete
async fn run(opts: &VolleyOptions) -> Result<i32> {
    let inputs = opts.inputs()?;
    if inputs.is_empty() {
        warn!("No URLs to fetch");
    }

    let client = client::create(&opts.config)?;
    let formatter = get_response_formatter(opts.config.format);
    let mut stats = FetchStats::default();
    let mut out = io::stdout();

    let mut pending = HashMap::new();
    for input in inputs {
        match client.request(input.as_str()) {
            Ok(future) => {
                pending.insert(future.id(), input);
            }
            Err(e) => {
                let fetched = Fetched::new(input, Outcome::Failed(e));
                writeln!(out, "{}", formatter.format_response(&fetched)?)?;
                stats.add(&fetched);
            }
        }
    }
    info!("Scheduled {} requests", pending.len());

    let mut completions = Box::pin(client.completions());
    while let Some(completed) = completions.next().await {
        let Some(input) = pending.remove(&completed.id) else {
            continue;
        };
        let fetched = Fetched::new(input, completed.outcome);
        writeln!(out, "{}", formatter.format_response(&fetched)?)?;
        stats.add(&fetched);
    }

    stats.engine = client.stats();
    stats.final_timeout = client.current_timeout();
    writeln!(out, "{}", format_stats(&stats, opts.config.format)?)?;

    let exit_code = if stats.is_success() {
        ExitCode::Success
    } else {
        ExitCode::FetchFailure
    };
    Ok(exit_code as i32)
}
