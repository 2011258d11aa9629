//! Error types for request construction.

/// Errors that can occur before a request ever reaches the network.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The site lacks a field its declared capability requires (bank id, broker id, ...).
    #[error("Site {site} is misconfigured: {reason}")]
    Config { site: String, reason: String },
    /// The underlying HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl Error {
    pub(crate) fn config(site: &str, reason: impl Into<String>) -> Self {
        Self::Config {
            site: site.to_string(),
            reason: reason.into(),
        }
    }
}
