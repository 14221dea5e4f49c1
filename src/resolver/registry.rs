//! Resolver registry that picks one resolver per URL.
//!
//! The registry tries resolvers in priority order (Specialized first, then
//! Fallback); within one level, registration order wins. Only the first
//! resolver that accepts a URL runs, and its error is final.

use tracing::{debug, info};
use url::Url;

use super::{Resolution, ResolveError, Resolver};

/// A priority-ordered collection of resolvers.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl ResolverRegistry {
    /// Creates an empty resolver registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// Registers a resolver with the registry.
    #[tracing::instrument(skip(self, resolver), fields(resolver_name))]
    pub fn register(&mut self, resolver: Box<dyn Resolver>) {
        tracing::Span::current().record("resolver_name", resolver.name());
        debug!(
            name = resolver.name(),
            priority = ?resolver.priority(),
            "Registering resolver"
        );
        self.resolvers.push(resolver);
    }

    /// Returns the number of registered resolvers.
    #[must_use]
    pub fn resolver_count(&self) -> usize {
        self.resolvers.len()
    }

    /// Returns true if no resolvers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Names of the registered resolvers, in registration order.
    #[must_use]
    pub fn resolver_names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Returns the resolver that would handle `input`, if any.
    #[must_use]
    pub fn find_handler(&self, input: &str) -> Option<&dyn Resolver> {
        let url = parse_web_url(input)?;
        self.resolvers
            .iter()
            .filter(|r| r.can_handle(&url))
            .min_by_key(|r| r.priority())
            .map(AsRef::as_ref)
    }

    /// Resolves `input` with the highest-priority resolver that accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NoResolver`] if `input` is not an http(s) URL
    /// or nothing accepts it, otherwise whatever the chosen resolver returns.
    #[tracing::instrument(skip(self, password), fields(input = %input))]
    pub async fn resolve(
        &self,
        input: &str,
        password: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let Some(handler) = self.find_handler(input) else {
            return Err(ResolveError::no_resolver(input));
        };
        debug!(resolver = handler.name(), "Resolving");

        let resolution = handler.resolve(input, password).await?;
        if resolution.items.is_empty() {
            return Err(ResolveError::no_download_link(input));
        }
        info!(
            resolver = handler.name(),
            items = resolution.items.len(),
            "Resolution successful"
        );
        Ok(resolution)
    }
}

fn parse_web_url(input: &str) -> Option<Url> {
    Url::parse(input.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("resolver_count", &self.resolvers.len())
            .field("resolvers", &self.resolver_names())
            .finish()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
