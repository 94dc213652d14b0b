use std::io;

use http::StatusCode;

use crate::ErrorKind;

/// An extension trait to help determine if a failed attempt may be retried.
///
/// Timeouts are not classified here: the engine always retries a timed out
/// attempt while the retry budget allows, after the `on_timeout` hooks ran.
pub(crate) trait RetryExt {
    fn should_retry(&self) -> bool;
}

impl RetryExt for StatusCode {
    fn should_retry(&self) -> bool {
        let status = *self;
        status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
    }
}

impl RetryExt for reqwest::Error {
    #[allow(clippy::if_same_then_else)]
    fn should_retry(&self) -> bool {
        if self.is_timeout() {
            true
        } else if self.is_builder() || self.is_redirect() || self.is_decode() {
            false
        } else if let Some(status) = self.status() {
            status.should_retry()
        } else if let Some(io_error) = get_source_error_type::<io::Error>(self) {
            should_retry_io(io_error)
        } else {
            // Connection failures are left to the circuit breaker
            self.is_request() && !self.is_connect()
        }
    }
}

impl RetryExt for ErrorKind {
    fn should_retry(&self) -> bool {
        match self {
            Self::NetworkRequest(e) | Self::ReadResponseBody(e) => e.should_retry(),
            _ => false,
        }
    }
}

/// Classifies an `io::Error` into retryable or not.
fn should_retry_io(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::TimedOut
    )
}

/// Downcasts the given err source into T.
fn get_source_error_type<T: std::error::Error + 'static>(
    err: &dyn std::error::Error,
) -> Option<&T> {
    let mut source = err.source();

    while let Some(err) = source {
        if let Some(typed) = err.downcast_ref::<T>() {
            return Some(typed);
        }

        source = err.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::RetryExt;
    use crate::{ErrorKind, HostKey};

    #[test]
    fn test_should_retry() {
        assert!(StatusCode::REQUEST_TIMEOUT.should_retry());
        assert!(StatusCode::TOO_MANY_REQUESTS.should_retry());
        assert!(!StatusCode::FORBIDDEN.should_retry());
        assert!(!StatusCode::OK.should_retry());
        assert!(StatusCode::INTERNAL_SERVER_ERROR.should_retry());
    }

    #[test]
    fn test_offline_host_is_final() {
        assert!(!ErrorKind::OfflineHost(HostKey::from("example.com")).should_retry());
        assert!(!ErrorKind::InvalidUrlHost.should_retry());
    }
}
