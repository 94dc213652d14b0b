//! `volley` is a high-volume HTTP fetching library for crawlers and scanners.
//!
//! It keeps thousands of requests in flight under a global concurrency
//! ceiling while adapting attempt timeouts to the observed latencies,
//! fast-failing against hosts that stopped answering and following redirect
//! chains.
//!
//! "Hello world" example:
//! ```no_run
//! use volley_lib::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let entry = volley_lib::fetch("https://example.com").await?;
//!   println!("{entry}");
//!   Ok(())
//! }
//! ```
//!
//! For more specific use-cases you can build a client yourself, using the
//! `ClientBuilder`, and consume the completions in the order they finish:
//!
//! ```no_run
//! use futures::StreamExt;
//! use volley_lib::{ClientBuilder, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::builder().max_concurrency(50_usize).build().client()?;
//!   for path in ["a", "b", "c"] {
//!     client.request(format!("https://example.com/{path}"))?;
//!   }
//!   let mut completions = Box::pin(client.completions());
//!   while let Some(completed) = completions.next().await {
//!     println!("{:?}", completed.outcome);
//!   }
//!   Ok(())
//! }
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

mod client;
mod config;
mod retry;
mod types;

pub mod engine;
pub mod kb;
pub mod rules;
pub mod scheduler;

#[cfg(test)]
mod test_utils;

pub use crate::{
    client::{Client, ClientBuilder, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, fetch},
    config::TimeoutConfig,
    engine::{Engine, EngineStats, ReqwestTransport, RetryEngine, Stats, Transport},
    kb::{HostRecord, HostSnapshot, HostStatus, KnowledgeBase},
    rules::{DeadHostDetection, DynamicTimeout, FollowRedirects, Hook, Rule, RuleSet},
    scheduler::{Completed, RequestScheduler, ScheduledFuture, TaskId},
    types::*,
};
