pub(crate) mod log;
pub(crate) mod response;

use anyhow::{Context, Result};

use self::response::{JsonFormatter, PlainFormatter, ResponseFormatter};
use crate::{options::OutputFormat, stats::FetchStats};

/// Create a response formatter for the given output format
pub(crate) fn get_response_formatter(format: OutputFormat) -> Box<dyn ResponseFormatter> {
    match format {
        OutputFormat::Plain => Box::new(PlainFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Render the summary of a run.
/// In JSON mode this is a single line, like every fetch before it.
pub(crate) fn format_stats(stats: &FetchStats, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Plain => Ok(format!("\n{stats}")),
        OutputFormat::Json => {
            serde_json::to_string(stats).context("Cannot format stats as JSON")
        }
    }
}
