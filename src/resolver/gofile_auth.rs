//! Gofile credential cache.
//!
//! Two artifacts gate the content API:
//!
//! - an anonymous **account token**, created once with a bodiless
//!   `POST /accounts` and kept until the API rejects it
//! - a short-lived **website token** (`wt`), scraped from the site's
//!   `global.js` and refreshed after [`WEBSITE_TOKEN_TTL`]
//!
//! Both sit behind one async mutex so concurrent resolutions share a single
//! fetch instead of racing to create accounts.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::ResolveError;
use super::utils::redact;

/// Default Gofile API base.
pub const DEFAULT_API_BASE: &str = "https://api.gofile.io";

/// Default Gofile site base (serves `dist/js/global.js`).
pub const DEFAULT_SITE_BASE: &str = "https://gofile.io";

/// How long a scraped website token stays valid.
pub const WEBSITE_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

const GLOBAL_JS_PATH: &str = "/dist/js/global.js";
const WT_MARKER: &str = "appdata.wt = \"";
const MAX_SCRIPT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct AccountResponse {
    status: String,
    data: Option<AccountData>,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    token: Option<String>,
}

#[derive(Debug, Default)]
struct AuthState {
    account_token: Option<String>,
    website_token: Option<(String, Instant)>,
}

/// Acquires and caches the Gofile account token and website token.
pub struct GofileAuth {
    client: Client,
    api_base: String,
    site_base: String,
    website_token_ttl: Duration,
    state: Mutex<AuthState>,
}

impl GofileAuth {
    /// Creates a cache against the public Gofile endpoints.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_endpoints(client, DEFAULT_API_BASE, DEFAULT_SITE_BASE)
    }

    /// Creates a cache against custom endpoints (for tests).
    #[must_use]
    pub fn with_endpoints(
        client: Client,
        api_base: impl Into<String>,
        site_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            site_base: site_base.into().trim_end_matches('/').to_string(),
            website_token_ttl: WEBSITE_TOKEN_TTL,
            state: Mutex::new(AuthState::default()),
        }
    }

    /// Overrides the website token lifetime.
    #[must_use]
    pub fn with_website_token_ttl(mut self, ttl: Duration) -> Self {
        self.website_token_ttl = ttl;
        self
    }

    /// Returns the cached account token, creating an account on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::ResolutionFailed`] if the account endpoint
    /// fails or answers without a token.
    #[instrument(skip(self))]
    pub async fn account_token(&self) -> Result<String, ResolveError> {
        let mut state = self.state.lock().await;
        if let Some(token) = &state.account_token {
            return Ok(token.clone());
        }

        let token = self.create_account().await?;
        info!(token = %redact(&token), "created Gofile guest account");
        state.account_token = Some(token.clone());
        Ok(token)
    }

    /// Returns the cached website token, scraping a fresh one once it expired.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::ResolutionFailed`] if the script cannot be
    /// fetched or no longer contains the token.
    #[instrument(skip(self))]
    pub async fn website_token(&self) -> Result<String, ResolveError> {
        let mut state = self.state.lock().await;
        if let Some((token, fetched_at)) = &state.website_token
            && fetched_at.elapsed() < self.website_token_ttl
        {
            return Ok(token.clone());
        }

        let token = self.scrape_website_token().await?;
        debug!(wt = %redact(&token), "refreshed Gofile website token");
        state.website_token = Some((token.clone(), Instant::now()));
        Ok(token)
    }

    /// Drops the account token so the next call creates a new account.
    pub async fn invalidate_account_token(&self) {
        self.state.lock().await.account_token = None;
    }

    async fn create_account(&self) -> Result<String, ResolveError> {
        let url = format!("{}/accounts", self.api_base);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| ResolveError::resolution_failed(&url, &format!("account request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::resolution_failed(
                &url,
                &format!("account creation returned HTTP {}", status.as_u16()),
            ));
        }

        let body: AccountResponse = response.json().await.map_err(|e| {
            ResolveError::resolution_failed(&url, &format!("invalid account response: {e}"))
        })?;
        if body.status != "ok" {
            return Err(ResolveError::resolution_failed(
                &url,
                &format!("account creation status '{}'", body.status),
            ));
        }
        body.data
            .and_then(|data| data.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ResolveError::resolution_failed(&url, "account response has no token"))
    }

    async fn scrape_website_token(&self) -> Result<String, ResolveError> {
        let url = format!("{}{GLOBAL_JS_PATH}", self.site_base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolveError::resolution_failed(&url, &format!("script request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::resolution_failed(
                &url,
                &format!("script returned HTTP {}", status.as_u16()),
            ));
        }

        // The token sits near the top; stop reading once it is in the buffer.
        let mut buffer: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ResolveError::resolution_failed(&url, &format!("script read failed: {e}"))
            })?;
            buffer.extend_from_slice(&chunk);
            if let Some(token) = extract_website_token(&String::from_utf8_lossy(&buffer)) {
                return Ok(token);
            }
            if buffer.len() > MAX_SCRIPT_BYTES {
                return Err(ResolveError::resolution_failed(
                    &url,
                    "script too large; website token marker not found",
                ));
            }
        }

        Err(ResolveError::resolution_failed(
            &url,
            "website token marker not found in script",
        ))
    }
}

impl std::fmt::Debug for GofileAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GofileAuth")
            .field("api_base", &self.api_base)
            .field("site_base", &self.site_base)
            .field("website_token_ttl", &self.website_token_ttl)
            .finish_non_exhaustive()
    }
}

/// Pulls the value of `appdata.wt = "..."` out of the script text.
fn extract_website_token(script: &str) -> Option<String> {
    let start = script.find(WT_MARKER)? + WT_MARKER.len();
    let len = script[start..].find('"')?;
    let token = &script[start..start + len];
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_for(server: &MockServer) -> GofileAuth {
        GofileAuth::with_endpoints(Client::new(), server.uri(), server.uri())
    }

    async fn mount_account(server: &MockServer, token: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "data": { "token": token }
            })))
            .expect(times)
            .mount(server)
            .await;
    }

    #[test]
    fn test_extract_website_token() {
        let script = "var a=1;\nappdata.wt = \"4fd6sg89d7s6\";\nappdata.x = \"y\";";
        assert_eq!(extract_website_token(script), Some("4fd6sg89d7s6".to_string()));
        assert_eq!(extract_website_token("appdata.wt = \"\";"), None);
        assert_eq!(extract_website_token("nothing here"), None);
        assert_eq!(extract_website_token("appdata.wt = \"unterminated"), None);
    }

    #[tokio::test]
    async fn test_account_token_created_once_and_cached() {
        let server = MockServer::start().await;
        mount_account(&server, "acct-1", 1).await;

        let auth = auth_for(&server);
        assert_eq!(auth.account_token().await.unwrap(), "acct-1");
        assert_eq!(auth.account_token().await.unwrap(), "acct-1");
    }

    #[tokio::test]
    async fn test_account_token_invalidate_recreates() {
        let server = MockServer::start().await;
        mount_account(&server, "acct-2", 2).await;

        let auth = auth_for(&server);
        auth.account_token().await.unwrap();
        auth.invalidate_account_token().await;
        auth.account_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_account_token_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error-rateLimit"
            })))
            .mount(&server)
            .await;

        let err = auth_for(&server).account_token().await.unwrap_err();
        assert!(err.to_string().contains("error-rateLimit"));
    }

    #[tokio::test]
    async fn test_website_token_cached_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dist/js/global.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("appdata.wt = \"wt-abc\";"))
            .expect(1)
            .mount(&server)
            .await;

        let auth = auth_for(&server);
        assert_eq!(auth.website_token().await.unwrap(), "wt-abc");
        assert_eq!(auth.website_token().await.unwrap(), "wt-abc");
    }

    #[tokio::test]
    async fn test_website_token_refetched_after_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dist/js/global.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("appdata.wt = \"wt-abc\";"))
            .expect(2)
            .mount(&server)
            .await;

        let auth = auth_for(&server).with_website_token_ttl(Duration::ZERO);
        auth.website_token().await.unwrap();
        auth.website_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_website_token_missing_marker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dist/js/global.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("console.log('x');"))
            .mount(&server)
            .await;

        let err = auth_for(&server).website_token().await.unwrap_err();
        assert!(matches!(err, ResolveError::ResolutionFailed { .. }));
    }
}
