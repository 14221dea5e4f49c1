//! Pixeldrain resolver: one HEAD request against the file API.
//!
//! The API URL itself is the direct link; it may redirect to storage, which
//! the transfer's GET follows. The HEAD request does not follow redirects so the
//! `Location` can serve as a filename source.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::header::LOCATION;
use tracing::info;
use url::Url;

use crate::download::{filename_from_url, parse_content_disposition};

use super::http_client::{ResolverClientOptions, build_resolver_http_client};
use super::utils::{
    canonical_host, compile_static_regex, content_disposition, content_length_hint, first_capture,
};
use super::{Resolution, ResolveError, ResolvedItem, Resolver, ResolverPriority};

/// Default Pixeldrain API base.
pub const DEFAULT_API_BASE: &str = "https://pixeldrain.com";

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

static FILE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"pixeldrain\.com/(?:u|l)/([a-zA-Z0-9]+)"));

/// Resolver for `pixeldrain.com/u/<id>` links.
pub struct PixeldrainResolver {
    client: Client,
    api_base: String,
}

impl PixeldrainResolver {
    /// Creates a resolver against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if client construction fails.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Creates a resolver against a custom API base (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if client construction fails.
    pub fn with_api_base(api_base: impl Into<String>) -> Result<Self, ResolveError> {
        let client = build_resolver_http_client(
            "pixeldrain",
            ResolverClientOptions {
                timeout: HEAD_TIMEOUT,
                cookie_store: false,
                follow_redirects: false,
            },
        )?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }
}

impl std::fmt::Debug for PixeldrainResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixeldrainResolver")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for PixeldrainResolver {
    fn name(&self) -> &'static str {
        "pixeldrain"
    }

    fn priority(&self) -> ResolverPriority {
        ResolverPriority::Specialized
    }

    fn can_handle(&self, url: &Url) -> bool {
        canonical_host(url) == "pixeldrain.com" && extract_file_id(url.as_str()).is_some()
    }

    #[tracing::instrument(skip(self, _password), fields(resolver = "pixeldrain", input = %page_url))]
    async fn resolve(
        &self,
        page_url: &str,
        _password: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let file_id = extract_file_id(page_url)
            .ok_or_else(|| ResolveError::id_not_extractable("pixeldrain", page_url))?;
        let api_url = format!("{}/api/file/{file_id}", self.api_base);

        let response = self.client.head(&api_url).send().await.map_err(|e| {
            ResolveError::resolution_failed(page_url, &format!("HEAD request failed: {e}"))
        })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(ResolveError::not_found(page_url));
        }
        if !(status.is_success() || status.is_redirection()) {
            return Err(ResolveError::resolution_failed(
                page_url,
                &format!("Pixeldrain returned HTTP {}", status.as_u16()),
            ));
        }

        let from_disposition = content_disposition(&response)
            .as_deref()
            .and_then(parse_content_disposition)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let from_location = || {
            response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| response.url().join(location).ok())
                .and_then(|target| filename_from_url(target.as_str()))
        };
        let name = from_disposition
            .or_else(|| status.is_redirection().then(from_location).flatten())
            .unwrap_or_else(|| file_id.clone());
        let size = content_length_hint(&response);

        info!(file = %name, size, "Pixeldrain file resolved");
        Ok(Resolution::single(
            ResolvedItem::new(name, api_url).with_size(size),
        ))
    }
}

fn extract_file_id(url: &str) -> Option<String> {
    first_capture(&FILE_ID_RE, url)
}
