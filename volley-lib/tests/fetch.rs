#[cfg(test)]
mod fetch {
    use futures::StreamExt;
    use http::{HeaderMap, HeaderValue, StatusCode};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use test_utils::{mock_server, redirect_chain_server, slow_mock_server, url};
    use volley_lib::{ClientBuilder, ErrorKind, HostKey, HostStatus, Outcome, TimeoutConfig};
    use wiremock::matchers::{header, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_timeouts() -> TimeoutConfig {
        TimeoutConfig {
            min_timeout: Duration::from_millis(50),
            max_timeout: Duration::from_millis(100),
            sample_size: 10,
        }
    }

    #[tokio::test]
    async fn test_redirect_chain_is_recorded_in_order() {
        let mock_server = redirect_chain_server!(3);
        let client = ClientBuilder::builder()
            .max_redirects(3_usize)
            .build()
            .client()
            .unwrap();

        let entry = client
            .fetch(format!("{}/0", mock_server.uri()))
            .await
            .unwrap();

        let hops: Vec<_> = entry
            .result
            .redirects
            .iter()
            .map(|hop| hop.response.url.path().to_string())
            .collect();
        assert_eq!(hops, vec!["/0", "/1", "/2", "/3"]);
        assert_eq!(entry.response().unwrap().status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_long_redirect_chain_is_truncated() {
        let mock_server = MockServer::start().await;
        for hop in 0..6 {
            Mock::given(path(format!("/{hop}")))
                .respond_with(
                    ResponseTemplate::new(301).insert_header("Location", format!("/{}", hop + 1)),
                )
                .mount(&mock_server)
                .await;
        }

        let client = ClientBuilder::builder()
            .max_redirects(2_usize)
            .build()
            .client()
            .unwrap();
        let entry = client
            .fetch(format!("{}/0", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(entry.result.redirects.len(), 3);
        let response = entry.response().unwrap();
        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.url.path(), "/2");
    }

    #[tokio::test]
    async fn test_unresponsive_host_is_declared_offline() {
        let mock_server = slow_mock_server!(Duration::from_secs(2));
        let client = ClientBuilder::builder()
            .timeouts(fast_timeouts())
            .retries(1_u32)
            .build()
            .client()
            .unwrap();

        let futures: Vec<_> = (0..3)
            .map(|i| client.request(format!("{}/{i}", mock_server.uri())).unwrap())
            .collect();
        let outcomes = futures::future::join_all(futures).await;

        let key = HostKey::try_from(&url!(mock_server.uri())).unwrap();
        assert!(outcomes.iter().all(|outcome| outcome.error().is_some()));
        assert!(
            outcomes
                .iter()
                .any(|outcome| outcome.error() == Some(&ErrorKind::OfflineHost(key.clone())))
        );
        assert_eq!(
            client.knowledge_base().host(&key).unwrap().status,
            HostStatus::Offline
        );
        assert!(client.stats().timed_out >= 3);
    }

    #[tokio::test]
    async fn test_timeout_without_dead_host_detection() {
        let mock_server = slow_mock_server!(Duration::from_secs(2));
        let client = ClientBuilder::builder()
            .timeouts(fast_timeouts())
            .retries(0_u32)
            .dead_host_detection(false)
            .build()
            .client()
            .unwrap();

        let err = client.fetch(mock_server.uri()).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(client.knowledge_base().offline_hosts().is_empty());
    }

    #[tokio::test]
    async fn test_completions_follow_finish_order() {
        let mock_server = MockServer::start().await;
        for (route, delay) in [("/a", 100), ("/b", 400), ("/c", 50)] {
            Mock::given(path(route))
                .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(delay)))
                .mount(&mock_server)
                .await;
        }

        let client = ClientBuilder::builder()
            .max_concurrency(2_usize)
            .build()
            .client()
            .unwrap();
        let a = client.request(format!("{}/a", mock_server.uri())).unwrap();
        let b = client.request(format!("{}/b", mock_server.uri())).unwrap();
        let c = client.request(format!("{}/c", mock_server.uri())).unwrap();
        assert_eq!(client.scheduler().pending_count(), 2);
        assert_eq!(client.scheduler().queued_count(), 1);

        let order: Vec<_> = client
            .completions()
            .map(|completed| completed.id)
            .collect()
            .await;
        assert_eq!(order, vec![a.id(), c.id(), b.id()]);
        assert!(a.await.is_done());
    }

    #[tokio::test]
    async fn test_cancelled_request_is_not_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .mount(&mock_server)
            .await;
        Mock::given(path("/never"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = ClientBuilder::builder()
            .max_concurrency(1_usize)
            .build()
            .client()
            .unwrap();
        let slow = client.request(format!("{}/slow", mock_server.uri())).unwrap();
        let never = client.request(format!("{}/never", mock_server.uri())).unwrap();
        never.cancel();

        assert!(slow.await.is_done());
        assert_eq!(never.await, Outcome::Cancelled);
    }

    #[tokio::test]
    async fn test_custom_headers_are_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(header("x-scan", "volley"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-scan", HeaderValue::from_static("volley"));
        let client = ClientBuilder::builder()
            .custom_headers(headers)
            .build()
            .client()
            .unwrap();

        let entry = client.fetch(mock_server.uri()).await.unwrap();
        assert_eq!(entry.response().unwrap().status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_body_is_read() {
        let mock_server = mock_server!(StatusCode::OK, set_body_string("hello volley"));
        let entry = volley_lib::fetch(mock_server.uri()).await.unwrap();
        assert_eq!(entry.response().unwrap().text(), "hello volley");
    }
}
