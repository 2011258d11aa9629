//! Library layer for ofxfetch: configuration, the per-account download cycle,
//! response validation, the scrubber, and synthetic quote statements.
//!
//! Builds on `ofxfetch_api`, which owns the message grammar, request
//! construction and the HTTPS transport.

pub mod config;
pub mod error;
pub mod fetch;
pub mod files;
pub mod scrubber;
pub mod synthetic;
pub mod validation;

pub use ofxfetch_api;
pub use ofxfetch_api::types;
pub use ofxfetch_api::{Client, DateWindow, RequestKind, Session, Stage, TransportFailure};

pub use config::{AccountConfig, Config, ConfigError, Settings};
pub use error::FetchError;
pub use fetch::{AccountOutcome, FetchedStatement, Fetcher, RunSummary};
pub use scrubber::{RuleName, ScrubOptions, ScrubReport, Scrubber};
pub use synthetic::{QuoteFiles, Security, SecurityKind, SyntheticStatementWriter};
pub use validation::{validate_file, ValidationError};
