//! Error types for link resolution.
//!
//! Every variant is terminal for one resolution attempt; nothing here is
//! retried automatically. Messages follow the What/Why/Fix pattern used across
//! the project.

use thiserror::Error;

/// Errors that can occur while turning a hosting-page URL into direct links.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The provider's resource id could not be found in the URL.
    #[error("could not extract a {provider} id from '{input}'\n  Suggestion: Copy the full share link from the browser address bar")]
    IdNotExtractable {
        /// Provider name.
        provider: String,
        /// The URL that was inspected.
        input: String,
    },

    /// The content is password protected and no password was given.
    #[error("'{input}' is password protected\n  Suggestion: Pass the share password with --password")]
    PasswordRequired {
        /// The URL being resolved.
        input: String,
    },

    /// The given password was rejected.
    #[error("password rejected for '{input}'\n  Suggestion: Check the share password and try again")]
    PasswordIncorrect {
        /// The URL being resolved.
        input: String,
    },

    /// The content does not exist (deleted or mistyped).
    #[error("content not found: '{input}'")]
    NotFound {
        /// The URL being resolved.
        input: String,
    },

    /// The content exists but is not shared publicly.
    #[error("content is not public: '{input}'\n  Suggestion: Ask the owner to make the link public")]
    NotPublic {
        /// The URL being resolved.
        input: String,
    },

    /// The provider refuses to serve the file right now.
    #[error("download quota exceeded for '{input}'\n  Suggestion: Too many users fetched this file recently; try again later")]
    QuotaExceeded {
        /// The URL being resolved.
        input: String,
    },

    /// The page loaded but contained no usable download link.
    #[error("no download link found in page '{input}'")]
    NoDownloadLink {
        /// The page that was scraped.
        input: String,
    },

    /// The redirect or confirmation chain hit its cap without a file.
    #[error("gave up on '{input}' after {attempts} request(s) without reaching the file")]
    RedirectChainExhausted {
        /// The URL being resolved.
        input: String,
        /// Requests issued before giving up.
        attempts: usize,
    },

    /// No registered resolver accepts the URL.
    #[error("no resolver found for input '{input}'\n  Suggestion: Use an http:// or https:// link")]
    NoResolver {
        /// The input that no resolver could handle.
        input: String,
    },

    /// Transport failure or an unexpected provider response.
    #[error("resolution failed for '{input}': {reason}")]
    ResolutionFailed {
        /// The URL being resolved.
        input: String,
        /// What went wrong.
        reason: String,
    },
}

impl ResolveError {
    /// Creates an `IdNotExtractable` error.
    #[must_use]
    pub fn id_not_extractable(provider: &str, input: &str) -> Self {
        Self::IdNotExtractable {
            provider: provider.to_string(),
            input: input.to_string(),
        }
    }

    /// Creates a `PasswordRequired` error.
    #[must_use]
    pub fn password_required(input: &str) -> Self {
        Self::PasswordRequired {
            input: input.to_string(),
        }
    }

    /// Creates a `PasswordIncorrect` error.
    #[must_use]
    pub fn password_incorrect(input: &str) -> Self {
        Self::PasswordIncorrect {
            input: input.to_string(),
        }
    }

    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(input: &str) -> Self {
        Self::NotFound {
            input: input.to_string(),
        }
    }

    /// Creates a `NotPublic` error.
    #[must_use]
    pub fn not_public(input: &str) -> Self {
        Self::NotPublic {
            input: input.to_string(),
        }
    }

    /// Creates a `QuotaExceeded` error.
    #[must_use]
    pub fn quota_exceeded(input: &str) -> Self {
        Self::QuotaExceeded {
            input: input.to_string(),
        }
    }

    /// Creates a `NoDownloadLink` error.
    #[must_use]
    pub fn no_download_link(input: &str) -> Self {
        Self::NoDownloadLink {
            input: input.to_string(),
        }
    }

    /// Creates a `RedirectChainExhausted` error.
    #[must_use]
    pub fn redirect_chain_exhausted(input: &str, attempts: usize) -> Self {
        Self::RedirectChainExhausted {
            input: input.to_string(),
            attempts,
        }
    }

    /// Creates a `NoResolver` error.
    #[must_use]
    pub fn no_resolver(input: &str) -> Self {
        Self::NoResolver {
            input: input.to_string(),
        }
    }

    /// Creates a `ResolutionFailed` error.
    #[must_use]
    pub fn resolution_failed(input: &str, reason: &str) -> Self {
        Self::ResolutionFailed {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}
