//! Gofile resolver: token-gated, folder-capable shares.
//!
//! `GET /contents/{id}` returns a tree. Files become items straight away;
//! folders contribute their name to the relative path of everything below
//! them. Every item of one share carries the share id as its group id, and
//! the account token used for the lookup is handed back so transfers can
//! send it as the `accountToken` cookie.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use super::gofile_auth::{DEFAULT_API_BASE, DEFAULT_SITE_BASE, GofileAuth};
use super::http_client::{ResolverClientOptions, build_resolver_http_client};
use super::utils::{canonical_host, compile_static_regex, first_capture};
use super::{Resolution, ResolveError, ResolvedItem, Resolver, ResolverPriority};

/// Folders nested deeper than this are skipped.
pub const MAX_FOLDER_DEPTH: usize = 32;

static CONTENT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"gofile\.io/(?:d|download|w|edit)/([a-zA-Z0-9]+(?:-[a-zA-Z0-9]+)*)")
});

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    status: String,
    data: Option<ContentNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentNode {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
    link: Option<String>,
    size: Option<i64>,
    #[serde(default)]
    children: BTreeMap<String, ContentNode>,
    password_status: Option<String>,
}

/// Resolver for `gofile.io/d/<id>` shares.
pub struct GofileResolver {
    client: Client,
    auth: GofileAuth,
    api_base: String,
}

impl GofileResolver {
    /// Creates a resolver against the public Gofile endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if client construction fails.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_endpoints(DEFAULT_API_BASE, DEFAULT_SITE_BASE)
    }

    /// Creates a resolver with custom API and site bases (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if client construction fails.
    pub fn with_endpoints(
        api_base: impl Into<String>,
        site_base: impl Into<String>,
    ) -> Result<Self, ResolveError> {
        let client = build_resolver_http_client("gofile", ResolverClientOptions::default())?;
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Ok(Self {
            auth: GofileAuth::with_endpoints(client.clone(), api_base.clone(), site_base),
            client,
            api_base,
        })
    }

    /// The credential cache shared by every lookup of this resolver.
    #[must_use]
    pub fn auth(&self) -> &GofileAuth {
        &self.auth
    }

    async fn fetch_contents(
        &self,
        page_url: &str,
        content_id: &str,
        password: Option<&str>,
        account_token: &str,
    ) -> Result<ContentNode, ResolveError> {
        let website_token = self.auth.website_token().await?;

        let mut url = Url::parse(&format!("{}/contents/{content_id}", self.api_base))
            .map_err(|e| ResolveError::resolution_failed(page_url, &format!("bad API URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("wt", &website_token);
            query.append_pair("cache", "true");
            if let Some(password) = password.filter(|p| !p.is_empty()) {
                query.append_pair("password", &hash_password(password));
            }
        }

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {account_token}"))
            .send()
            .await
            .map_err(|e| {
                ResolveError::resolution_failed(page_url, &format!("content lookup failed: {e}"))
            })?;

        let http_status = response.status().as_u16();
        if http_status == 401 {
            self.auth.invalidate_account_token().await;
        }
        let body = response.text().await.map_err(|e| {
            ResolveError::resolution_failed(page_url, &format!("content body unreadable: {e}"))
        })?;

        let Ok(parsed) = serde_json::from_str::<ContentsResponse>(&body) else {
            return Err(match http_status {
                401 => ResolveError::resolution_failed(
                    page_url,
                    "account token rejected; a new one is created on the next attempt",
                ),
                404 => ResolveError::not_found(page_url),
                _ => ResolveError::resolution_failed(
                    page_url,
                    &format!("unexpected content response (HTTP {http_status})"),
                ),
            });
        };

        debug!(status = %parsed.status, http_status, "Gofile content lookup answered");
        match parsed.status.as_str() {
            "ok" => {}
            "error-passwordRequired" => return Err(ResolveError::password_required(page_url)),
            "error-passwordWrong" | "error-wrongPassword" => {
                return Err(ResolveError::password_incorrect(page_url));
            }
            "error-notFound" => return Err(ResolveError::not_found(page_url)),
            "error-notPublic" => return Err(ResolveError::not_public(page_url)),
            "error-token" => {
                self.auth.invalidate_account_token().await;
                return Err(ResolveError::resolution_failed(
                    page_url,
                    "account token rejected; a new one is created on the next attempt",
                ));
            }
            other => {
                return Err(ResolveError::resolution_failed(
                    page_url,
                    &format!("content lookup status '{other}'"),
                ));
            }
        }

        let data = parsed
            .data
            .ok_or_else(|| ResolveError::resolution_failed(page_url, "response has no data"))?;
        match data.password_status.as_deref() {
            None | Some("passwordOk") => Ok(data),
            Some(_) if password.is_some_and(|p| !p.is_empty()) => {
                Err(ResolveError::password_incorrect(page_url))
            }
            Some(_) => Err(ResolveError::password_required(page_url)),
        }
    }
}

impl std::fmt::Debug for GofileResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GofileResolver")
            .field("api_base", &self.api_base)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolver for GofileResolver {
    fn name(&self) -> &'static str {
        "gofile"
    }

    fn priority(&self) -> ResolverPriority {
        ResolverPriority::Specialized
    }

    fn can_handle(&self, url: &Url) -> bool {
        canonical_host(url) == "gofile.io" && extract_content_id(url.as_str()).is_some()
    }

    #[tracing::instrument(skip(self, password), fields(resolver = "gofile", input = %page_url))]
    async fn resolve(
        &self,
        page_url: &str,
        password: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let content_id = extract_content_id(page_url)
            .ok_or_else(|| ResolveError::id_not_extractable("gofile", page_url))?;

        let account_token = self.auth.account_token().await?;
        let root = self
            .fetch_contents(page_url, &content_id, password, &account_token)
            .await?;

        let mut items = Vec::new();
        collect_items(&root, "", &content_id, 0, &mut items);
        if items.is_empty() {
            return Err(ResolveError::no_download_link(page_url));
        }

        info!(content_id = %content_id, items = items.len(), "Gofile share resolved");
        Ok(Resolution {
            items,
            auth_token: Some(account_token),
        })
    }
}

/// Returns the share id from any of the `d`, `download`, `w` or `edit` URL shapes.
fn extract_content_id(url: &str) -> Option<String> {
    first_capture(&CONTENT_ID_RE, url)
}

/// Lowercase hex SHA-256 of the share password, as the API expects.
fn hash_password(password: &str) -> String {
    Sha256::digest(password.as_bytes())
        .iter()
        .fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
}

fn collect_items(
    node: &ContentNode,
    parent_path: &str,
    group_id: &str,
    depth: usize,
    items: &mut Vec<ResolvedItem>,
) {
    let path = if parent_path.is_empty() {
        node.name.clone()
    } else {
        format!("{parent_path}/{}", node.name)
    };

    match node.kind.as_str() {
        "file" => match node.link.as_deref().filter(|link| !link.is_empty()) {
            Some(link) => items.push(
                ResolvedItem::new(path, link)
                    .with_size(node.size.unwrap_or(-1))
                    .with_group(group_id),
            ),
            None => warn!(name = %node.name, "Gofile file entry has no direct link; skipping"),
        },
        "folder" => {
            if depth >= MAX_FOLDER_DEPTH {
                warn!(folder = %path, depth, "Gofile folder nesting too deep; skipping");
                return;
            }
            for child in node.children.values() {
                collect_items(child, &path, group_id, depth + 1, items);
            }
        }
        other => debug!(kind = other, name = %node.name, "Skipping unknown Gofile entry type"),
    }
}
