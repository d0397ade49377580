//! Shared User-Agent string for outbound API calls.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/trackbatch/trackbatch";

/// Default User-Agent for API requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("trackbatch/{version} (batch-archiver; +{PROJECT_UA_URL})")
}
