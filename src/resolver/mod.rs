//! Link resolution: turning hosting-page URLs into direct, byte-servable URLs.
//!
//! A resolver never transfers file bodies. It only produces
//! [`ResolvedItem`]s and, when the provider needs it, an account token that
//! the transfer must send back as a cookie.
//!
//! # Architecture
//!
//! - [`Resolver`] - Async trait that individual resolvers implement
//! - [`ResolverRegistry`] - Priority-ordered collection that picks the resolver for a URL
//! - [`GofileResolver`] - Token-gated, folder-capable provider (with [`GofileAuth`])
//! - [`MediafireResolver`] - HTML redirect-chain scraping
//! - [`GoogleDriveResolver`] - Confirmation-token interstitial flow
//! - [`PixeldrainResolver`] - HEAD request against the file API
//! - [`DirectResolver`] - Passthrough for any other http(s) URL
//!
//! # Example
//!
//! ```no_run
//! use lockerdl_core::resolver::build_default_resolver_registry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = build_default_resolver_registry();
//! let resolution = registry.resolve("https://pixeldrain.com/u/abc123", None).await?;
//! for item in &resolution.items {
//!     println!("{} -> {}", item.relative_path, item.direct_url);
//! }
//! # Ok(())
//! # }
//! ```

mod direct;
mod error;
mod gdrive;
mod gofile;
mod gofile_auth;
mod http_client;
mod mediafire;
mod pixeldrain;
mod registry;
mod utils;

pub use direct::DirectResolver;
pub use error::ResolveError;
pub use gdrive::GoogleDriveResolver;
pub use gofile::GofileResolver;
pub use gofile_auth::{GofileAuth, WEBSITE_TOKEN_TTL};
pub use http_client::{
    RESOLVER_CONNECT_TIMEOUT, RESOLVER_REQUEST_TIMEOUT, ResolverClientOptions,
    build_resolver_http_client,
};
pub use mediafire::MediafireResolver;
pub use pixeldrain::PixeldrainResolver;
pub use registry::ResolverRegistry;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;
use url::Url;

/// Builds the registry used by the CLI: every provider plus the direct fallback.
///
/// A provider whose HTTP client cannot be built is skipped with a warning.
#[must_use]
pub fn build_default_resolver_registry() -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();

    match GofileResolver::new() {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(
            error = %error,
            "Gofile resolver unavailable; continuing with remaining resolvers"
        ),
    }

    match MediafireResolver::new() {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(
            error = %error,
            "MediaFire resolver unavailable; continuing with remaining resolvers"
        ),
    }

    match GoogleDriveResolver::new() {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(
            error = %error,
            "Google Drive resolver unavailable; continuing with remaining resolvers"
        ),
    }

    match PixeldrainResolver::new() {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(
            error = %error,
            "Pixeldrain resolver unavailable; continuing with direct fallback"
        ),
    }

    registry.register(Box::new(DirectResolver::new()));
    registry
}

/// Priority level for resolver ordering.
///
/// Derives `Ord` so that `Specialized < Fallback` for sorting (try
/// provider-specific resolvers first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolverPriority {
    /// Provider-specific resolvers.
    Specialized = 0,
    /// Direct URL passthrough.
    Fallback = 1,
}

/// One downloadable file produced by a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedItem {
    /// Destination relative to the download dir; `/` separates folders.
    pub relative_path: String,
    /// URL the transfer engine GETs.
    pub direct_url: String,
    /// Expected size in bytes, -1 if unknown.
    pub size_hint: i64,
    /// Groups sibling items of one share under a common subfolder.
    pub group_id: Option<String>,
}

impl ResolvedItem {
    /// Creates an ungrouped item with an unknown size.
    #[must_use]
    pub fn new(relative_path: impl Into<String>, direct_url: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            direct_url: direct_url.into(),
            size_hint: -1,
            group_id: None,
        }
    }

    /// Sets the size hint.
    #[must_use]
    pub fn with_size(mut self, size_hint: i64) -> Self {
        self.size_hint = size_hint;
        self
    }

    /// Sets the group id.
    #[must_use]
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}

/// Everything one resolution produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Files to download, in provider order.
    pub items: Vec<ResolvedItem>,
    /// Credential to send with every transfer of these items.
    pub auth_token: Option<String>,
}

impl Resolution {
    /// A resolution with one item and no credential.
    #[must_use]
    pub fn single(item: ResolvedItem) -> Self {
        Self {
            items: vec![item],
            auth_token: None,
        }
    }
}

/// Trait that all resolvers must implement.
///
/// # Object Safety
///
/// This trait uses `async_trait` to support dynamic dispatch via `Box<dyn Resolver>`.
/// Rust 2024 native async traits are not object-safe, so `async_trait` is required
/// for the registry pattern.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns the resolver's name (e.g., "gofile", "direct").
    fn name(&self) -> &str;

    /// Returns the resolver's priority level.
    fn priority(&self) -> ResolverPriority;

    /// Returns true if this resolver recognizes the URL.
    fn can_handle(&self, url: &Url) -> bool;

    /// Resolves `page_url` into direct links.
    ///
    /// `password` is only meaningful to providers with protected shares.
    async fn resolve(
        &self,
        page_url: &str,
        password: Option<&str>,
    ) -> Result<Resolution, ResolveError>;
}
