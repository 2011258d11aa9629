//! HTTPS transport for statement requests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::{Error, StatementRequest};

/// Connecting should fail fast.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Servers may take a while to assemble a large statement.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CONTENT_TYPE: &str = "application/x-ofx";
const ACCEPT: &str = "*/*, application/x-ofx";

/// Where in the exchange a transport failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Send,
    Read,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Connect => "connecting to",
            Stage::Send => "sending request to",
            Stage::Read => "reading response from",
            Stage::Write => "saving response from",
        };
        f.write_str(s)
    }
}

/// Diagnostic context for a failed exchange. Transport never panics or
/// bubbles raw `reqwest` errors; this value is all the caller sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub host: String,
    pub stage: Stage,
    /// Short error class, e.g. `timeout`, `connect`, `http status`.
    pub category: String,
    pub detail: String,
    pub status: Option<u16>,
    pub reason: Option<String>,
    /// Where the body of a rejected reply was saved for inspection.
    pub saved: Option<PathBuf>,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error {} {} ({}): {}",
            self.stage, self.host, self.category, self.detail
        )?;
        if let Some(status) = self.status {
            write!(f, " [HTTP {}", status)?;
            if let Some(reason) = &self.reason {
                write!(f, " {}", reason)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl std::error::Error for TransportFailure {}

/// HTTPS client that POSTs statement requests and saves the raw replies.
///
/// There are no retries here; the caller decides what to do per account.
pub struct Client {
    http: reqwest::Client,
}

impl Client {
    /// Creates a client with the default connect and request timeouts.
    pub fn new() -> Result<Self, Error> {
        Self::with_timeouts(CONNECT_TIMEOUT, REQUEST_TIMEOUT)
    }

    /// Creates a client with custom timeouts. Used by tests to exercise the timeout path quickly.
    pub fn with_timeouts(connect: Duration, request: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(request)
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                Error::ClientBuild(e.to_string())
            })?;
        Ok(Self { http })
    }

    /// POSTs `request` to `url` and writes the response body verbatim to `dest`.
    ///
    /// Returns the number of bytes written. Any failure to connect, send, read,
    /// get a success status, or write the file comes back as a [`TransportFailure`].
    /// A non-success reply is still written to `dest` and named in
    /// [`TransportFailure::saved`].
    pub async fn send(
        &self,
        url: &str,
        request: &StatementRequest,
        dest: &Path,
    ) -> Result<usize, TransportFailure> {
        self.post(url, request.to_text(), dest).await
    }

    /// POSTs a raw body. See [`Client::send`].
    pub async fn post(
        &self,
        url: &str,
        body: String,
        dest: &Path,
    ) -> Result<usize, TransportFailure> {
        let host = host_of(url);
        let parsed = Url::parse(url).map_err(|e| {
            failure(&host, Stage::Connect, "invalid url", e.to_string(), None)
        })?;

        let resp = self
            .http
            .post(parsed)
            .header("content-type", CONTENT_TYPE)
            .header("accept", ACCEPT)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let stage = if e.is_connect() {
                    Stage::Connect
                } else {
                    Stage::Send
                };
                failure(&host, stage, category(&e), e.to_string(), None)
            })?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| {
            failure(&host, Stage::Read, category(&e), e.to_string(), Some(status))
        })?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            let saved = match std::fs::write(dest, &bytes) {
                Ok(()) => Some(dest.to_path_buf()),
                Err(e) => {
                    tracing::warn!("Could not save rejected reply to {}: {}", dest.display(), e);
                    None
                }
            };
            let mut f = failure(
                &host,
                Stage::Read,
                "http status",
                truncate_body(&text),
                Some(status),
            );
            f.saved = saved;
            return Err(f);
        }

        std::fs::write(dest, &bytes).map_err(|e| {
            failure(&host, Stage::Write, "io", format!("{}: {}", dest.display(), e), None)
        })?;

        tracing::debug!(host = %host, bytes = bytes.len(), path = %dest.display(), "saved response");
        Ok(bytes.len())
    }
}

fn failure(
    host: &str,
    stage: Stage,
    category: &str,
    detail: String,
    status: Option<reqwest::StatusCode>,
) -> TransportFailure {
    let f = TransportFailure {
        host: host.to_string(),
        stage,
        category: category.to_string(),
        detail,
        status: status.map(|s| s.as_u16()),
        reason: status.and_then(|s| s.canonical_reason()).map(str::to_string),
        saved: None,
    };
    tracing::error!("{}", f);
    f
}

fn category(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_redirect() {
        "redirect"
    } else if e.is_body() || e.is_decode() {
        "body"
    } else if e.is_request() {
        "request"
    } else {
        "other"
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_extracted_from_url() {
        assert_eq!(host_of("https://ofx.example.com/cgi?x=1"), "ofx.example.com");
        assert_eq!(host_of("not a url"), "not a url");
    }

    #[test]
    fn failure_display_includes_status_and_reason() {
        let f = TransportFailure {
            host: "ofx.example.com".to_string(),
            stage: Stage::Read,
            category: "http status".to_string(),
            detail: "nope".to_string(),
            status: Some(503),
            reason: Some("Service Unavailable".to_string()),
            saved: None,
        };
        let shown = f.to_string();
        assert!(shown.contains("reading response from ofx.example.com"));
        assert!(shown.contains("[HTTP 503 Service Unavailable]"));
    }

    #[test]
    fn truncate_keeps_short_bodies() {
        assert_eq!(truncate_body("short"), "short");
        let long = "x".repeat(600);
        assert!(truncate_body(&long).ends_with("...[truncated]"));
    }

    #[test]
    fn client_creation_with_defaults() {
        assert!(Client::new().is_ok());
    }
}
