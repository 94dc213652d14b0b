#![allow(unreachable_pub)]

mod entry;
mod error;
mod host_key;
mod outcome;
mod request;
mod response;

pub use entry::{Entry, FetchResult, Hop};
pub use error::ErrorKind;
pub use host_key::HostKey;
pub use outcome::Outcome;
pub use request::{Arguments, Request};
pub use response::{REDIRECT_STATUS_CODES, Response};

/// The volley `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
