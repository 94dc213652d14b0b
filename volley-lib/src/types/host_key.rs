use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::ErrorKind;
use crate::types::Result;

/// A type-safe representation of a network location (`host[:port]`).
///
/// Per-host state is aggregated by destination, not by path, so every
/// request to the same host and port shares one key. The port is only part
/// of the key when it is explicit and differs from the scheme's default.
///
/// # Examples
///
/// ```
/// use volley_lib::HostKey;
/// use url::Url;
///
/// let url = Url::parse("http://10.0.0.10:8080/index.html").unwrap();
/// let host_key = HostKey::try_from(&url).unwrap();
/// assert_eq!(host_key.as_str(), "10.0.0.10:8080");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostKey(String);

impl HostKey {
    /// Get the network location as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the network location as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<&Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url.host_str().ok_or(ErrorKind::InvalidUrlHost)?;
        let key = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        // Normalize to lowercase for consistent lookup
        Ok(HostKey(key.to_lowercase()))
    }
}

impl TryFrom<Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: Url) -> Result<Self> {
        HostKey::try_from(&url)
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HostKey {
    fn from(host: String) -> Self {
        HostKey(host.to_lowercase())
    }
}

impl From<&str> for HostKey {
    fn from(host: &str) -> Self {
        HostKey(host.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://example.com/test", "example.com")]
    #[case("http://example.com/12?q=1", "example.com")]
    #[case("https://www.test.example/index.html", "www.test.example")]
    #[case("http://10.0.0.10:8080/qw", "10.0.0.10:8080")]
    #[case("https://API.GITHUB.COM/repos/user/repo", "api.github.com")]
    #[case("http://example.com:80/", "example.com")]
    #[case("https://example.com:8443/", "example.com:8443")]
    fn test_host_key_from_url(#[case] url: &str, #[case] expected: &str) {
        let url = Url::parse(url).unwrap();
        let host_key = HostKey::try_from(&url).unwrap();
        assert_eq!(host_key.as_str(), expected);
    }

    #[test]
    fn test_host_key_port_separation() {
        let plain = HostKey::try_from(Url::parse("http://example.com/").unwrap()).unwrap();
        let alt = HostKey::try_from(Url::parse("http://example.com:8080/").unwrap()).unwrap();
        assert_ne!(plain, alt);
    }

    #[test]
    fn test_host_key_no_host() {
        let url = Url::parse("file:///path/to/file").unwrap();
        let result = HostKey::try_from(&url);
        assert!(result.is_err());
    }

    #[test]
    fn test_host_key_hash_equality() {
        use std::collections::HashMap;

        let key1 = HostKey::from("example.com");
        let key2 = HostKey::from("EXAMPLE.COM");

        let mut map = HashMap::new();
        map.insert(key1, "value");

        // Should find the value with normalized key
        assert_eq!(map.get(&key2), Some(&"value"));
    }
}
