//! `test-utils` is used for testing in both `volley-lib` and `volley-bin`.
//! This crate does not depend on `volley-lib` or `volley-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies
//! (`wiremock`, `http` and `url`).

/// Create a mock web server, which responds with a predefined status when
/// handling any `GET` request
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(u16::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Create a mock web server serving a redirect chain of `$hops` hops:
/// `/0` redirects to `/1`, `/1` to `/2` and so on, until `/$hops`
/// answers with `200 OK`. Every route expects to be called exactly once.
///
/// An optional status code overrides the redirect status (`302` by default).
#[macro_export]
macro_rules! redirect_chain_server {
    ($hops:expr) => {
        $crate::redirect_chain_server!($hops, http::StatusCode::FOUND)
    };
    ($hops:expr, $status:expr) => {{
        let mock_server = wiremock::MockServer::start().await;
        let hops: usize = $hops;
        for hop in 0..hops {
            wiremock::Mock::given(wiremock::matchers::method("GET"))
                .and(wiremock::matchers::path(format!("/{hop}")))
                .respond_with(
                    wiremock::ResponseTemplate::new(u16::from($status))
                        .insert_header("Location", format!("/{}", hop + 1).as_str()),
                )
                .expect(1)
                .mount(&mock_server)
                .await;
        }
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path(format!("/{hops}")))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Create a mock web server which accepts connections but only answers
/// after `$delay`, so that requests with a shorter timeout time out
#[macro_export]
macro_rules! slow_mock_server {
    ($delay:expr) => {{
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_delay($delay))
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Parse a URL, panicking on error
///
/// # Panic
///
/// This panics on error, so it should only be used for testing
#[macro_export]
macro_rules! url {
    ($url:expr) => {
        url::Url::parse(&$url).expect("Expected valid URL")
    };
}

/// Gets the "main" binary name (e.g. `volley`)
#[macro_export]
macro_rules! main_command {
    () => {
        assert_cmd::cargo::cargo_bin_cmd!("volley")
    };
}
