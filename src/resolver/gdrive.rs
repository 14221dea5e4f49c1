//! Google Drive resolver: the large-file confirmation interstitial.
//!
//! The download endpoint either answers with the file (`Content-Disposition`
//! set) or with an HTML page asking to confirm. The page carries a `confirm`
//! token (and sometimes a `uuid`) that is echoed back on the next request.
//! Cookies set by the interstitial must survive into that request, so this
//! resolver's client keeps a cookie store.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::download::{parse_content_disposition, sanitize_filename};

use super::http_client::{RESOLVER_REQUEST_TIMEOUT, ResolverClientOptions, build_resolver_http_client};
use super::utils::{
    canonical_host, compile_static_regex, content_disposition, content_length_hint,
    first_capture, is_html,
};
use super::{Resolution, ResolveError, ResolvedItem, Resolver, ResolverPriority};

/// Default download endpoint taking `id`, `confirm` and `uuid` query parameters.
pub const DEFAULT_DOWNLOAD_ENDPOINT: &str = "https://drive.usercontent.google.com/download";

/// Most requests issued for one file (the first plus two confirmations).
pub const MAX_CONFIRM_REQUESTS: usize = 3;

const DRIVE_HOSTS: &[&str] = &[
    "drive.google.com",
    "docs.google.com",
    "drive.usercontent.google.com",
];

const QUOTA_MARKERS: &[&str] = &[
    "Google Drive - Quota exceeded",
    "downloadQuotaExceeded",
    "Too many users have viewed or downloaded this file recently",
];

static ID_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        compile_static_regex(r"(?i)/file/d/([0-9A-Za-z_-]{10,})(?:/|$)"),
        compile_static_regex(r"(?i)/folders/([0-9A-Za-z_-]{10,})(?:/|$)"),
        compile_static_regex(r"(?i)id=([0-9A-Za-z_-]{10,})(?:&|$)"),
    ]
});
static CONFIRM_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)confirm=([0-9A-Za-z_-]+)"));
static CONFIRM_INPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?i)name="confirm"\s+value="([0-9A-Za-z_-]+)""#)
});
static UUID_INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"(?i)name="uuid"\s+value="([0-9A-Za-z_-]+)""#));

/// Resolver for Google Drive file links.
pub struct GoogleDriveResolver {
    client: Client,
    download_endpoint: String,
}

impl GoogleDriveResolver {
    /// Creates a resolver against the public download endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if client construction fails.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_download_endpoint(DEFAULT_DOWNLOAD_ENDPOINT)
    }

    /// Creates a resolver against a custom download endpoint (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if client construction fails.
    pub fn with_download_endpoint(endpoint: impl Into<String>) -> Result<Self, ResolveError> {
        let client = build_resolver_http_client(
            "gdrive",
            ResolverClientOptions {
                timeout: RESOLVER_REQUEST_TIMEOUT,
                cookie_store: true,
                follow_redirects: true,
            },
        )?;
        Ok(Self {
            client,
            download_endpoint: endpoint.into(),
        })
    }

    fn download_url(
        &self,
        page_url: &str,
        file_id: &str,
        confirm: Option<(&str, Option<&str>)>,
    ) -> Result<Url, ResolveError> {
        let mut url = Url::parse(&self.download_endpoint).map_err(|e| {
            ResolveError::resolution_failed(page_url, &format!("bad download endpoint: {e}"))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("export", "download");
            query.append_pair("authuser", "0");
            query.append_pair("id", file_id);
            if let Some((token, uuid)) = confirm {
                query.append_pair("confirm", token);
                if let Some(uuid) = uuid {
                    query.append_pair("uuid", uuid);
                }
            }
        }
        Ok(url)
    }
}

impl std::fmt::Debug for GoogleDriveResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleDriveResolver")
            .field("download_endpoint", &self.download_endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for GoogleDriveResolver {
    fn name(&self) -> &'static str {
        "gdrive"
    }

    fn priority(&self) -> ResolverPriority {
        ResolverPriority::Specialized
    }

    fn can_handle(&self, url: &Url) -> bool {
        DRIVE_HOSTS.contains(&canonical_host(url).as_str())
    }

    #[tracing::instrument(skip(self, _password), fields(resolver = "gdrive", input = %page_url))]
    async fn resolve(
        &self,
        page_url: &str,
        _password: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let file_id = extract_drive_id(page_url)
            .ok_or_else(|| ResolveError::id_not_extractable("Google Drive", page_url))?;
        let mut url = self.download_url(page_url, &file_id, None)?;

        for attempt in 1..=MAX_CONFIRM_REQUESTS {
            debug!(attempt, file_id = %file_id, "Requesting Drive download endpoint");
            let response = self.client.get(url.clone()).send().await.map_err(|e| {
                ResolveError::resolution_failed(page_url, &format!("request failed: {e}"))
            })?;

            let status = response.status();
            if status.as_u16() == 404 {
                return Err(ResolveError::not_found(page_url));
            }

            if status.is_success()
                && let Some(header) = content_disposition(&response)
            {
                let name = parse_content_disposition(&header)
                    .map(|raw| sanitize_filename(&raw))
                    .filter(|name| name != "_")
                    .unwrap_or_else(|| file_id.clone());
                let size = content_length_hint(&response);
                let direct = response.url().to_string();
                info!(file = %name, size, "Drive file resolved");
                return Ok(Resolution::single(
                    ResolvedItem::new(name, direct).with_size(size),
                ));
            }

            let html_page = is_html(&response);
            let body = response.text().await.unwrap_or_default();
            if QUOTA_MARKERS.iter().any(|marker| body.contains(marker)) {
                warn!(file_id = %file_id, "Drive refused the download (quota)");
                return Err(ResolveError::quota_exceeded(page_url));
            }
            if !status.is_success() {
                return Err(ResolveError::resolution_failed(
                    page_url,
                    &format!("Drive returned HTTP {}", status.as_u16()),
                ));
            }
            if !html_page {
                return Err(ResolveError::no_download_link(page_url));
            }

            let Some(confirm) = extract_confirm_token(&body) else {
                return Err(ResolveError::no_download_link(page_url));
            };
            let uuid = first_capture(&UUID_INPUT_RE, &body);
            debug!(attempt, has_uuid = uuid.is_some(), "Drive confirmation page");
            url = self.download_url(page_url, &file_id, Some((&confirm, uuid.as_deref())))?;
        }

        Err(ResolveError::redirect_chain_exhausted(
            page_url,
            MAX_CONFIRM_REQUESTS,
        ))
    }
}

/// Returns the file (or folder) id from `/file/d/`, `/folders/` or `id=` URL shapes.
fn extract_drive_id(url: &str) -> Option<String> {
    ID_PATTERNS.iter().find_map(|re| first_capture(re, url))
}

fn extract_confirm_token(html: &str) -> Option<String> {
    first_capture(&CONFIRM_PARAM_RE, html).or_else(|| first_capture(&CONFIRM_INPUT_RE, html))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_drive_id_url_shapes() {
        assert_eq!(
            extract_drive_id("https://drive.google.com/file/d/1AbCdEfGhIjK_lmn-op/view?usp=sharing"),
            Some("1AbCdEfGhIjK_lmn-op".to_string())
        );
        assert_eq!(
            extract_drive_id("https://drive.google.com/file/d/1AbCdEfGhIjK"),
            Some("1AbCdEfGhIjK".to_string())
        );
        assert_eq!(
            extract_drive_id("https://drive.google.com/drive/folders/0BxyzFolder123/"),
            Some("0BxyzFolder123".to_string())
        );
        assert_eq!(
            extract_drive_id("https://drive.google.com/uc?id=1AbCdEfGhIjK&export=download"),
            Some("1AbCdEfGhIjK".to_string())
        );
        assert_eq!(extract_drive_id("https://drive.google.com/file/d/short/view"), None);
    }

    #[test]
    fn test_extract_confirm_token_variants() {
        assert_eq!(
            extract_confirm_token(r#"<a href="/download?id=x&amp;confirm=t0K3n_-">"#),
            Some("t0K3n_-".to_string())
        );
        assert_eq!(
            extract_confirm_token(r#"<input type="hidden" name="confirm" value="abc">"#),
            Some("abc".to_string())
        );
        assert_eq!(extract_confirm_token("<html>nothing</html>"), None);
    }

    #[test]
    fn test_uuid_extraction() {
        let html = r#"<input type="hidden" name="uuid" value="5e1a-22ff">"#;
        assert_eq!(
            first_capture(&UUID_INPUT_RE, html),
            Some("5e1a-22ff".to_string())
        );
    }

    #[test]
    fn test_download_url_carries_tokens() {
        let resolver = GoogleDriveResolver::new().unwrap();
        let url = resolver
            .download_url("p", "1AbCdEfGhIjK", Some(("tok", Some("uu"))))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://drive.usercontent.google.com/download?export=download&authuser=0&id=1AbCdEfGhIjK&confirm=tok&uuid=uu"
        );
    }

    #[test]
    fn test_gdrive_can_handle_hosts() {
        let resolver = GoogleDriveResolver::new().unwrap();
        for url in [
            "https://drive.google.com/file/d/1AbCdEfGhIjK/view",
            "https://docs.google.com/uc?id=1AbCdEfGhIjK",
            "https://drive.usercontent.google.com/download?id=1AbCdEfGhIjK",
        ] {
            assert!(resolver.can_handle(&Url::parse(url).unwrap()), "{url}");
        }
        assert!(!resolver.can_handle(&Url::parse("https://google.com/file/d/1AbCdEfGhIjK").unwrap()));
    }
}
