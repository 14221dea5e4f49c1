//! Shared HTTP client construction policy for resolvers.
//!
//! Resolver clients differ from the transfer client: they send a browser
//! User-Agent, accept compressed pages, and carry a whole-request timeout
//! since every resolver call is a small API or HTML fetch.

use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};

use crate::user_agent;

use super::ResolveError;

/// Default connect timeout for resolver requests.
pub const RESOLVER_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default whole-request timeout for resolver requests.
pub const RESOLVER_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Knobs a resolver may change from the shared policy.
#[derive(Debug, Clone, Copy)]
pub struct ResolverClientOptions {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Keep cookies between requests of the same client.
    pub cookie_store: bool,
    /// Follow redirects (the reqwest default of 10 hops) or stop at the first 3xx.
    pub follow_redirects: bool,
}

impl Default for ResolverClientOptions {
    fn default() -> Self {
        Self {
            timeout: RESOLVER_REQUEST_TIMEOUT,
            cookie_store: false,
            follow_redirects: true,
        }
    }
}

/// Builds a resolver HTTP client using the shared policy.
///
/// `resolver_name` only appears in the error message.
///
/// # Errors
///
/// Returns [`ResolveError::ResolutionFailed`] when client construction fails.
pub fn build_resolver_http_client(
    resolver_name: &str,
    options: ResolverClientOptions,
) -> Result<Client, ResolveError> {
    base_builder(options).build().map_err(|error| {
        ResolveError::resolution_failed(
            resolver_name,
            &format!("HTTP client construction failed: {error}"),
        )
    })
}

fn base_builder(options: ResolverClientOptions) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(RESOLVER_CONNECT_TIMEOUT)
        .timeout(options.timeout)
        .user_agent(user_agent::default_resolver_user_agent())
        .gzip(true)
        .cookie_store(options.cookie_store);

    if !options.follow_redirects {
        builder = builder.redirect(Policy::none());
    }
    builder
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_resolver_client_options_default() {
        let options = ResolverClientOptions::default();
        assert_eq!(options.timeout, RESOLVER_REQUEST_TIMEOUT);
        assert!(!options.cookie_store);
        assert!(options.follow_redirects);
    }

    #[tokio::test]
    async fn test_resolver_client_without_redirects_returns_3xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hop"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "/elsewhere"),
            )
            .mount(&server)
            .await;

        let client = build_resolver_http_client(
            "test",
            ResolverClientOptions {
                follow_redirects: false,
                ..ResolverClientOptions::default()
            },
        )
        .unwrap();
        let response = client
            .get(format!("{}/hop", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 302);
    }

    #[tokio::test]
    async fn test_resolver_client_sends_browser_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ua"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client =
            build_resolver_http_client("test", ResolverClientOptions::default()).unwrap();
        client
            .get(format!("{}/ua", server.uri()))
            .send()
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let ua = requests[0]
            .headers
            .get("user-agent")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(ua.starts_with("Mozilla/5.0"));
        assert!(ua.contains("lockerdl/"));
    }
}
