//! MediaFire resolver: follows the share page to the `download*` sub-host.
//!
//! Each hop GETs the current URL. A `Content-Disposition` header means the
//! response is the file itself, so the (post-redirect) URL is the direct
//! link. An HTML page is scraped for the next link. The chain is capped at
//! [`MAX_CHAIN_REQUESTS`].

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::download::parse_content_disposition;

use super::http_client::{ResolverClientOptions, build_resolver_http_client};
use super::utils::{
    absolutize_url, canonical_host, compile_static_regex, content_disposition,
    content_length_hint, decode_html_entities, first_capture, host_is_or_under, is_html,
};
use super::{Resolution, ResolveError, ResolvedItem, Resolver, ResolverPriority};

/// Most pages fetched for one resolution.
pub const MAX_CHAIN_REQUESTS: usize = 5;

static BUTTON_HREF_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)<a\s[^>]*href\s*=\s*"([^"]+)"[^>]*id\s*=\s*"downloadButton""#)
});
static BUTTON_ID_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)<a\s[^>]*id\s*=\s*"downloadButton"[^>]*href\s*=\s*"([^"]+)""#)
});
static DOWNLOAD_HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"href="((?:http|https)://download[^"]+)""#));

/// Resolver for `mediafire.com` share pages.
pub struct MediafireResolver {
    client: Client,
}

impl MediafireResolver {
    /// Creates a resolver with the shared client policy.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if client construction fails.
    pub fn new() -> Result<Self, ResolveError> {
        Ok(Self {
            client: build_resolver_http_client("mediafire", ResolverClientOptions::default())?,
        })
    }
}

impl std::fmt::Debug for MediafireResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediafireResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for MediafireResolver {
    fn name(&self) -> &'static str {
        "mediafire"
    }

    fn priority(&self) -> ResolverPriority {
        ResolverPriority::Specialized
    }

    fn can_handle(&self, url: &Url) -> bool {
        host_is_or_under(&canonical_host(url), "mediafire.com")
    }

    #[tracing::instrument(skip(self, _password), fields(resolver = "mediafire", input = %page_url))]
    async fn resolve(
        &self,
        page_url: &str,
        _password: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let mut current = page_url.to_string();

        for attempt in 1..=MAX_CHAIN_REQUESTS {
            debug!(attempt, url = %current, "Fetching MediaFire page");
            let response = self.client.get(&current).send().await.map_err(|e| {
                ResolveError::resolution_failed(page_url, &format!("request failed: {e}"))
            })?;

            let status = response.status();
            if status.as_u16() == 404 {
                return Err(ResolveError::not_found(page_url));
            }
            if !status.is_success() {
                return Err(ResolveError::resolution_failed(
                    page_url,
                    &format!("MediaFire returned HTTP {}", status.as_u16()),
                ));
            }

            let final_url = response.url().clone();
            if let Some(name) = content_disposition(&response)
                .as_deref()
                .and_then(parse_content_disposition)
            {
                let size = content_length_hint(&response);
                info!(file = %name, size, "MediaFire link resolved");
                return Ok(Resolution::single(
                    ResolvedItem::new(name, final_url.as_str()).with_size(size),
                ));
            }

            if !is_html(&response) {
                return Err(ResolveError::no_download_link(page_url));
            }

            let html = response.text().await.map_err(|e| {
                ResolveError::resolution_failed(page_url, &format!("page unreadable: {e}"))
            })?;
            let Some(next) = extract_download_link(&html, &final_url) else {
                return Err(ResolveError::no_download_link(page_url));
            };
            current = next;
        }

        Err(ResolveError::redirect_chain_exhausted(
            page_url,
            MAX_CHAIN_REQUESTS,
        ))
    }
}

/// Finds the next hop: the `downloadButton` anchor, else any `download*` sub-host link.
fn extract_download_link(html: &str, page_url: &Url) -> Option<String> {
    first_capture(&BUTTON_HREF_FIRST_RE, html)
        .or_else(|| first_capture(&BUTTON_ID_FIRST_RE, html))
        .or_else(|| first_capture(&DOWNLOAD_HOST_RE, html))
        .map(|href| decode_html_entities(&href))
        .and_then(|href| absolutize_url(&href, page_url))
}
