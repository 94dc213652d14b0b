use crate::options::{Config, HeaderMapExt};
use anyhow::{Context, Result};
use http::HeaderMap;
use volley_lib::{Client, ClientBuilder};

/// Creates a client according to the command-line config
pub(crate) fn create(cfg: &Config) -> Result<Client> {
    let headers = HeaderMap::from_header_pairs(&cfg.header)?;
    let method = cfg.method()?;

    ClientBuilder::builder()
        .max_concurrency(cfg.max_concurrency)
        .retries(cfg.retries)
        .timeouts(cfg.timeouts())
        .timeout(cfg.timeout)
        .max_redirects(cfg.max_redirects)
        .follow_redirects(!cfg.no_redirects)
        .dead_host_detection(!cfg.no_dead_host_detection)
        .dynamic_timeout(!cfg.no_dynamic_timeout)
        .user_agent(cfg.user_agent.clone())
        .custom_headers(headers)
        .method(method)
        .allow_insecure(cfg.insecure)
        .build()
        .client()
        .context("Failed to create request client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::VolleyOptions;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_create_client() {
        let opts = VolleyOptions::parse_from([
            "volley",
            "--no-dynamic-timeout",
            "--timeout",
            "3s",
            "--max-concurrency",
            "4",
            "https://example.com",
        ]);

        let client = create(&opts.config).unwrap();
        assert_eq!(client.scheduler().limit(), 4);
        assert_eq!(client.current_timeout(), Duration::from_secs(3));
        assert!(client.knowledge_base().timeout_manager().is_none());
    }

    #[test]
    fn test_invalid_user_agent() {
        let opts = VolleyOptions::parse_from(["volley", "-u", "bad\nagent", "https://example.com"]);
        assert!(create(&opts.config).is_err());
    }
}
