//! Error types for the library layer.

use std::fmt;
use std::path::{Path, PathBuf};

use ofxfetch_api::TransportFailure;

use crate::config::ConfigError;
use crate::scrubber::ScrubError;
use crate::validation::ValidationError;

/// Why one account's download attempt failed. Each variant aborts only that
/// account; the run continues with the next one.
#[derive(Debug)]
pub enum FetchError {
    /// The account or its site could not be resolved from configuration.
    Config(ConfigError),
    /// The site lacks a field its capability needs. Raised before any network call.
    Request(ofxfetch_api::Error),
    /// Connect/send/read/write failure or timeout.
    Transport(TransportFailure),
    /// The saved reply failed a structural check. The file is left on disk.
    Validation(ValidationError),
    /// The scrubber could not read or rewrite the saved reply.
    Scrub(ScrubError),
    /// The transfer directory could not be prepared.
    Io { path: PathBuf, source: std::io::Error },
}

impl FetchError {
    /// The statement file worth inspecting, when one was written.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Transport(e) => e.saved.as_deref(),
            Self::Validation(e) => Some(e.path()),
            Self::Scrub(ScrubError::Io { path, .. }) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::Request(e) => write!(f, "Request error: {}", e),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Validation(e) => write!(f, "Invalid statement: {}", e),
            Self::Scrub(e) => write!(f, "Scrub error: {}", e),
            Self::Io { path, source } => write!(f, "I/O error on {}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Request(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Validation(e) => Some(e),
            Self::Scrub(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for FetchError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ofxfetch_api::Error> for FetchError {
    fn from(e: ofxfetch_api::Error) -> Self {
        Self::Request(e)
    }
}

impl From<TransportFailure> for FetchError {
    fn from(e: TransportFailure) -> Self {
        Self::Transport(e)
    }
}

impl From<ValidationError> for FetchError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<ScrubError> for FetchError {
    fn from(e: ScrubError) -> Self {
        Self::Scrub(e)
    }
}
