use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::{Parser, builder::TypedValueParser};
use const_format::{concatcp, formatcp};
use http::{
    HeaderMap, Method,
    header::{HeaderName, HeaderValue},
};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use volley_lib::engine::DEFAULT_RETRIES;
use volley_lib::rules::DEFAULT_MAX_REDIRECTS;
use volley_lib::scheduler::DEFAULT_MAX_CONCURRENCY;
use volley_lib::{DEFAULT_USER_AGENT, TimeoutConfig};

pub(crate) const VOLLEY_CONFIG_FILE: &str = "volley.toml";

/// Input lines starting with this marker are ignored
const COMMENT_MARKER: &str = "#";

/// Read inputs from standard input when given as a path
const STDIN: &str = "-";

const DEFAULT_METHOD: &str = "get";
const DEFAULT_TIMEOUT_STR: &str = "20s";

// clap requires `&str` defaults whereas serde expects owned values
const MAX_CONCURRENCY_STR: &str = concatcp!(DEFAULT_MAX_CONCURRENCY);
const MAX_REDIRECTS_STR: &str = concatcp!(DEFAULT_MAX_REDIRECTS);
const RETRIES_STR: &str = concatcp!(DEFAULT_RETRIES);
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    VOLLEY_CONFIG_FILE,
);

/// How every completed fetch is printed
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum OutputFormat {
    /// `[STATUS] url --> hop` lines
    #[default]
    Plain,
    /// One JSON object per line
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "plain" | "text" => Ok(OutputFormat::Plain),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!("Unknown format {format}")),
        }
    }
}

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

default_function! {
    max_concurrency: usize = DEFAULT_MAX_CONCURRENCY;
    retries: u32 = DEFAULT_RETRIES;
    max_redirects: usize = DEFAULT_MAX_REDIRECTS;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    timeout: Duration = volley_lib::DEFAULT_TIMEOUT;
    method: String = DEFAULT_METHOD.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Take a config file value for every key the command line left at its default.
// The dummy struct literal fails to compile when a `Config` field is missing.
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Parse a `Name: Value` header.
///
/// Everything after the first colon is the value. Name and value are trimmed.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let Some((name, value)) = header.split_once(':') else {
        return Err(anyhow!(
            "Invalid header format. Expected colon-separated string in the format 'HeaderName: HeaderValue'"
        ));
    };
    let name = name.trim();
    let name = HeaderName::from_str(name)
        .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
    Ok((name, value))
}

/// Parses one `--header` argument into a `(name, value)` pair
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let invalid = |message: String| clap::Error::raw(clap::error::ErrorKind::InvalidValue, message);

        let header = value
            .to_str()
            .ok_or_else(|| invalid("Header value contains invalid UTF-8".to_string()))?;
        let (name, value) = parse_single_header(header).map_err(|e| invalid(e.to_string()))?;
        let value = value
            .to_str()
            .map_err(|_| invalid("Header value contains invalid UTF-8".to_string()))?;
        Ok((name.to_string(), value.to_string()))
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Extension trait for converting header pairs to a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Convert a collection of header key-value pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value for '{name}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// Read non-empty, non-comment lines
fn read_lines(reader: impl BufRead) -> Result<Vec<String>> {
    let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
    Ok(lines
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .collect())
}

/// Read URLs from a file, or from stdin if the path is `-`
fn read_input_file(path: &Path) -> Result<Vec<String>> {
    if path == Path::new(STDIN) {
        return read_lines(io::stdin().lock());
    }
    let file = File::open(path)?;
    read_lines(BufReader::new(file))
}

/// volley fetches a large number of URLs concurrently.
///
/// Attempt timeouts adapt to the observed latencies, hosts that stopped
/// answering are failed fast and redirect chains are followed.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct VolleyOptions {
    /// URLs to fetch, or `-` to read them from stdin
    #[arg(
        name = "inputs",
        required_unless_present = "input_file",
        long_help = "URLs to fetch. Pass `-` to read URLs from standard input, one per line.
Alternatively, use `--input-file` to read URLs from a file.

NOTE: Use `--` to separate inputs from options that allow multiple arguments."
    )]
    raw_inputs: Vec<String>,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

impl VolleyOptions {
    /// All URLs to fetch, in the order they were given.
    ///
    /// Command line arguments come first, followed by the lines of
    /// `--input-file`. Blank lines and `#` comments are skipped.
    pub(crate) fn inputs(&self) -> Result<Vec<String>> {
        let mut inputs = Vec::new();
        for raw_input in &self.raw_inputs {
            if raw_input == STDIN {
                let lines = read_lines(io::stdin().lock()).context("Cannot read URLs from stdin")?;
                inputs.extend(lines);
            } else {
                inputs.push(raw_input.clone());
            }
        }

        if let Some(input_file) = &self.config.input_file {
            let lines = read_input_file(input_file).with_context(|| {
                format!("Cannot read URLs from `{}`", input_file.display())
            })?;
            inputs.extend(lines);
        }
        Ok(inputs)
    }
}

// Custom deserializer function for the header field
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// The main configuration for volley
#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Read URLs from the given file, or stdin if the path is `-`
    #[arg(
        long,
        value_name = "PATH",
        long_help = "Read URLs from the given file or stdin (if path is '-').

File Format:
- Each line holds one URL.
- Lines starting with '#' are treated as comments and ignored.
- Empty lines are also ignored."
    )]
    #[serde(default)]
    pub(crate) input_file: Option<PathBuf>,

    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Maximum number of requests in flight at the same time
    #[arg(long, default_value = MAX_CONCURRENCY_STR)]
    #[serde(default = "max_concurrency")]
    pub(crate) max_concurrency: usize,

    /// Maximum number of retries per request
    #[arg(short, long, default_value = RETRIES_STR)]
    #[serde(default = "retries")]
    pub(crate) retries: u32,

    /// Lower bound of adaptive timeouts [default: 200ms]
    #[arg(long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) min_timeout: Option<Duration>,

    /// Upper bound of adaptive timeouts [default: 5s]
    #[arg(long, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) max_timeout: Option<Duration>,

    /// Number of recent latencies adaptive timeouts are computed from [default: 200]
    #[arg(long)]
    #[serde(default)]
    pub(crate) sample_size: Option<usize>,

    /// Timeout of every attempt when adaptive timeouts are disabled
    #[arg(
        short,
        long,
        value_parser = humantime::parse_duration,
        default_value = DEFAULT_TIMEOUT_STR
    )]
    #[serde(default = "timeout", with = "humantime_serde")]
    pub(crate) timeout: Duration,

    /// Maximum number of redirects followed per request
    #[arg(short, long, default_value = MAX_REDIRECTS_STR)]
    #[serde(default = "max_redirects")]
    pub(crate) max_redirects: usize,

    /// Do not follow redirects
    #[arg(long)]
    #[serde(default)]
    pub(crate) no_redirects: bool,

    /// Do not fail fast against hosts whose requests all timed out
    #[arg(long)]
    #[serde(default)]
    pub(crate) no_dead_host_detection: bool,

    /// Use `--timeout` for every attempt instead of adapting it to the
    /// observed latencies
    #[arg(long)]
    #[serde(default)]
    pub(crate) no_dynamic_timeout: bool,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Set custom header for requests
    #[arg(
        short = 'H',
        long = "header",
        value_parser = HeaderParser,
        value_name = "HEADER:VALUE",
        long_help = "Set custom header for requests

Some websites require custom headers to be passed in order to return valid responses.
You can specify custom headers in the format 'Name: Value'. For example, 'Accept: text/html'.
This is the same format that other tools like curl or wget use.
Multiple headers can be specified by using the flag multiple times."
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,

    /// Proceed for server connections considered insecure (invalid TLS)
    #[arg(short, long)]
    #[serde(default)]
    pub(crate) insecure: bool,

    /// Request method
    #[arg(short = 'X', long, default_value = DEFAULT_METHOD)]
    #[serde(default = "method")]
    pub(crate) method: String,

    /// Output format of the fetch results (plain, json)
    #[arg(short, long, default_value = "plain")]
    #[serde(default)]
    pub(crate) format: OutputFormat,
}

impl Config {
    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration.
    /// Values given on the command line win.
    pub(crate) fn merge(&mut self, toml: Config) {
        let mut header: HashMap<_, _> = toml.header.into_iter().collect();
        header.extend(self.header.drain(..));
        self.header = header.into_iter().collect();

        fold_in! {
            self, toml;

            Config {
                ..header,

                input_file: None,
                verbose: Verbosity::default(),
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                retries: DEFAULT_RETRIES,
                min_timeout: None,
                max_timeout: None,
                sample_size: None,
                timeout: volley_lib::DEFAULT_TIMEOUT,
                max_redirects: DEFAULT_MAX_REDIRECTS,
                no_redirects: false,
                no_dead_host_detection: false,
                no_dynamic_timeout: false,
                user_agent: DEFAULT_USER_AGENT,
                insecure: false,
                method: DEFAULT_METHOD,
                format: OutputFormat::default(),
            }
        }
    }

    /// The configured request method
    pub(crate) fn method(&self) -> Result<Method> {
        Method::from_str(&self.method.to_uppercase())
            .with_context(|| format!("Invalid request method `{}`", self.method))
    }

    /// Bounds of the adaptive timeouts, falling back to the library defaults
    pub(crate) fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig::from_options(self.min_timeout, self.max_timeout, self.sample_size)
            .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_parse_custom_headers() {
        let (name, value) = parse_single_header("accept:text/html").unwrap();
        assert_eq!(name, HeaderName::from_static("accept"));
        assert_eq!(value, HeaderValue::from_static("text/html"));
    }

    #[test]
    fn test_parse_custom_header_multiple_colons() {
        let (name, value) = parse_single_header("x-origin: http://localhost:8080").unwrap();
        assert_eq!(name, HeaderName::from_static("x-origin"));
        assert_eq!(value, HeaderValue::from_static("http://localhost:8080"));
    }

    #[test]
    fn test_parse_invalid_header() {
        assert!(parse_single_header("no colon here").is_err());
        assert!(parse_single_header("bad name: value").is_err());
    }

    #[test]
    fn test_header_arguments() {
        let opts = VolleyOptions::parse_from([
            "volley",
            "--header",
            "Accept: text/html",
            "-H",
            "X-Scan: volley",
            "https://example.com",
        ]);

        let headers = HeaderMap::from_header_pairs(&opts.config.header).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("accept").unwrap(), "text/html");
        assert_eq!(headers.get("x-scan").unwrap(), "volley");
    }

    #[test]
    fn test_defaults() {
        let opts = VolleyOptions::parse_from(["volley", "https://example.com"]);
        let config = opts.config;

        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.retries, DEFAULT_RETRIES);
        assert_eq!(config.max_redirects, DEFAULT_MAX_REDIRECTS);
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.method().unwrap(), Method::GET);
        assert_eq!(config.format, OutputFormat::Plain);
        assert_eq!(config.timeouts(), TimeoutConfig::default());
    }

    #[test]
    fn test_timeout_options() {
        let opts = VolleyOptions::parse_from([
            "volley",
            "--min-timeout",
            "1s",
            "--max-timeout",
            "500ms",
            "--sample-size",
            "0",
            "https://example.com",
        ]);

        let timeouts = opts.config.timeouts();
        assert_eq!(timeouts.min_timeout, Duration::from_millis(500));
        assert_eq!(timeouts.max_timeout, Duration::from_millis(500));
        assert_eq!(timeouts.sample_size, 1);
    }

    #[test]
    fn test_output_format() {
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("plain").unwrap(), OutputFormat::Plain);
        assert!(OutputFormat::from_str("xml").is_err());
    }

    #[test]
    fn test_invalid_method() {
        let opts = VolleyOptions::parse_from(["volley", "-X", "not a method", "https://example.com"]);
        assert!(opts.config.method().is_err());
    }

    #[test]
    fn test_merge_cli_wins() {
        let mut cli = VolleyOptions::parse_from([
            "volley",
            "--retries",
            "7",
            "-H",
            "Accept: text/html",
            "https://example.com",
        ])
        .config;
        let toml: Config = toml::from_str(
            r#"
            retries = 1
            max_concurrency = 10
            min_timeout = "1s"
            no_redirects = true
            format = "json"
            verbose = "debug"

            [header]
            Accept = "application/json"
            X-Scan = "volley"
            "#,
        )
        .unwrap();

        cli.merge(toml);

        assert_eq!(cli.retries, 7);
        assert_eq!(cli.max_concurrency, 10);
        assert_eq!(cli.min_timeout, Some(Duration::from_secs(1)));
        assert!(cli.no_redirects);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.verbose.log_level(), log::Level::Debug);

        let headers = HeaderMap::from_header_pairs(&cli.header).unwrap();
        assert_eq!(headers.get("accept").unwrap(), "text/html");
        assert_eq!(headers.get("x-scan").unwrap(), "volley");
    }

    #[test]
    fn test_unknown_config_key() {
        assert!(toml::from_str::<Config>("max_retries = 3").is_err());
    }

    #[test]
    fn test_read_lines() {
        let input = "https://a.example\n\n# comment\n  https://b.example  \n   # indented comment\n";
        assert_eq!(
            read_lines(Cursor::new(input)).unwrap(),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
