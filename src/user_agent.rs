//! Shared User-Agent strings for transfer and resolver HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/lockerdl";

/// Browser token appended to resolver requests; hosting pages serve their
/// download interstitials only to clients that look like a browser.
const BROWSER_COMPAT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// User-Agent for byte transfers (identifies the tool).
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("lockerdl/{version} (+{PROJECT_UA_URL})")
}

/// User-Agent for resolver requests against hosting pages and provider APIs.
#[must_use]
pub(crate) fn default_resolver_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{BROWSER_COMPAT} lockerdl/{version}")
}
