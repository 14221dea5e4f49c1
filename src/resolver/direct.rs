//! Direct URL resolver - passthrough for plain URLs.
//!
//! The [`DirectResolver`] accepts any http(s) URL no provider claims and
//! returns it unchanged as a single item named after its last path segment.

use async_trait::async_trait;
use url::Url;

use crate::download::filename_from_url;

use super::{Resolution, ResolveError, ResolvedItem, Resolver, ResolverPriority};

/// Name used when the URL path has no usable segment.
const FALLBACK_NAME: &str = "download";

/// A resolver that passes URLs through unchanged.
#[derive(Debug)]
pub struct DirectResolver;

impl DirectResolver {
    /// Creates a new `DirectResolver`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for DirectResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for DirectResolver {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn priority(&self) -> ResolverPriority {
        ResolverPriority::Fallback
    }

    fn can_handle(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    #[tracing::instrument(skip(self, _password), fields(resolver = "direct"))]
    async fn resolve(
        &self,
        page_url: &str,
        _password: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let name = filename_from_url(page_url).unwrap_or_else(|| FALLBACK_NAME.to_string());
        Ok(Resolution::single(ResolvedItem::new(name, page_url)))
    }
}
