use anyhow::{Context, Result};
use serde::Serialize;
use volley_lib::{Entry, ErrorKind, Outcome};

/// The outcome of fetching one input, as given by the user
#[derive(Debug)]
pub(crate) struct Fetched {
    /// The input as given, which may not be a valid URL
    pub(crate) input: String,
    pub(crate) outcome: Outcome<Entry>,
}

impl Fetched {
    pub(crate) const fn new(input: String, outcome: Outcome<Entry>) -> Self {
        Self { input, outcome }
    }
}

/// Short marker printed in front of a failed fetch
fn error_marker(error: &ErrorKind) -> &'static str {
    if error.is_offline_host() {
        "OFFLINE"
    } else if error.is_timeout() {
        "TIMEOUT"
    } else {
        "ERROR"
    }
}

/// Turns a finished fetch into one line of output
pub(crate) trait ResponseFormatter: Send + Sync {
    fn format_response(&self, fetched: &Fetched) -> Result<String>;
}

/// `[STATUS] url --> hop` lines
pub(crate) struct PlainFormatter;

impl ResponseFormatter for PlainFormatter {
    fn format_response(&self, fetched: &Fetched) -> Result<String> {
        Ok(match &fetched.outcome {
            Outcome::Done(entry) => entry.to_string(),
            Outcome::Failed(e) => format!("[{}] {} | {e}", error_marker(e), fetched.input),
            Outcome::Cancelled => format!("[CANCELLED] {}", fetched.input),
        })
    }
}

/// One JSON object per line
pub(crate) struct JsonFormatter;

#[derive(Serialize)]
struct JsonResponse<'a> {
    url: &'a str,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    redirects: Vec<JsonHop<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct JsonHop<'a> {
    url: &'a str,
    status: u16,
}

impl ResponseFormatter for JsonFormatter {
    fn format_response(&self, fetched: &Fetched) -> Result<String> {
        let response = match &fetched.outcome {
            Outcome::Done(entry) => JsonResponse {
                url: entry.url().as_str(),
                outcome: "done",
                status: entry.response().map(|response| response.status.as_u16()),
                redirects: entry
                    .result
                    .redirects
                    .iter()
                    .map(|hop| JsonHop {
                        url: hop.response.url.as_str(),
                        status: hop.response.status.as_u16(),
                    })
                    .collect(),
                error: None,
            },
            Outcome::Failed(e) => JsonResponse {
                url: &fetched.input,
                outcome: if e.is_offline_host() {
                    "offline"
                } else if e.is_timeout() {
                    "timeout"
                } else {
                    "error"
                },
                status: None,
                redirects: Vec::new(),
                error: Some(e.to_string()),
            },
            Outcome::Cancelled => JsonResponse {
                url: &fetched.input,
                outcome: "cancelled",
                status: None,
                redirects: Vec::new(),
                error: None,
            },
        };
        serde_json::to_string(&response).context("Cannot format response as JSON")
    }
}
