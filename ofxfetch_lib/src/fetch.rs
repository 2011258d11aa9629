//! Per-account download cycle: build, send, validate, scrub.
//!
//! Accounts are processed strictly one after another. A failure aborts only
//! the account it happened on; [`Fetcher::fetch_all`] keeps going and folds
//! every outcome into a [`RunSummary`].

use std::path::{Path, PathBuf};

use chrono::Local;
use ofxfetch_api::{Client, DateWindow, RequestKind, Session};
use serde::Serialize;

use crate::config::{AccountConfig, Config};
use crate::error::FetchError;
use crate::files::{ensure_dir, statement_path};
use crate::scrubber::{ScrubReport, Scrubber};
use crate::validation::validate_file;

/// A statement that made it through validation and scrubbing.
#[derive(Debug, Clone, Serialize)]
pub struct FetchedStatement {
    pub path: PathBuf,
    pub bytes: usize,
    #[serde(skip)]
    pub kind: RequestKind,
    pub scrub: ScrubReport,
}

/// The result for one configured account.
#[derive(Debug)]
pub struct AccountOutcome {
    pub site: String,
    pub number: String,
    pub result: Result<FetchedStatement, FetchError>,
}

impl AccountOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Every account outcome of one run, in processing order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<AccountOutcome>,
}

impl RunSummary {
    /// `true` only when every account succeeded.
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(AccountOutcome::is_success)
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    /// Paths of the statements ready for import.
    pub fn statement_paths(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Drives the download cycle for configured accounts.
pub struct Fetcher {
    client: Client,
    session: Session,
    scrubber: Scrubber,
    xfr_dir: PathBuf,
}

impl Fetcher {
    pub fn new(client: Client, scrubber: Scrubber, xfr_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            session: Session::new(),
            scrubber,
            xfr_dir: xfr_dir.into(),
        }
    }

    /// Replaces the request session. Used by tests for repeatable identifiers.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn xfr_dir(&self) -> &Path {
        &self.xfr_dir
    }

    /// Downloads one account's statement over the last `interval` days (or the
    /// site's minimum, when larger).
    ///
    /// Configuration problems surface before any network traffic. A reply that
    /// fails validation is left on disk and reported with its path.
    pub async fn fetch_account(
        &mut self,
        config: &Config,
        entry: &AccountConfig,
        interval: u32,
    ) -> Result<FetchedStatement, FetchError> {
        let site = config.site(&entry.site)?;
        let account = entry.resolve()?;

        let days = interval.max(site.min_interval);
        let window = DateWindow::last_days(days);
        let request = self.session.build_request(site, &account, &window)?;

        ensure_dir(&self.xfr_dir).map_err(|source| FetchError::Io {
            path: self.xfr_dir.clone(),
            source,
        })?;
        let path = statement_path(&self.xfr_dir, &site.name, Local::now().naive_local());

        tracing::info!(
            "{}: requesting {:?} statement ({} days)",
            site.name,
            request.kind,
            days
        );
        let bytes = self.client.send(&site.url, &request, &path).await?;

        validate_file(&path)?;
        let scrub = self.scrubber.scrub_file(&path, site)?;

        Ok(FetchedStatement {
            path,
            bytes,
            kind: request.kind,
            scrub,
        })
    }

    /// Fetches every configured account in order, optionally only those at
    /// `only_site`. Never stops early.
    pub async fn fetch_all(
        &mut self,
        config: &Config,
        interval: u32,
        only_site: Option<&str>,
    ) -> RunSummary {
        let wanted = only_site.map(|s| s.trim().to_uppercase());
        let mut summary = RunSummary::default();

        for entry in &config.accounts {
            let site = entry.site.trim().to_uppercase();
            if wanted.as_deref().is_some_and(|w| w != site) {
                continue;
            }

            let result = self.fetch_account(config, entry, interval).await;
            match &result {
                Ok(statement) => {
                    tracing::info!("{} {}: saved {}", site, entry.number, statement.path.display())
                }
                Err(e) => match e.path() {
                    Some(path) => {
                        tracing::error!("{} {}: {} (see {})", site, entry.number, e, path.display())
                    }
                    None => tracing::error!("{} {}: {}", site, entry.number, e),
                },
            }
            summary.outcomes.push(AccountOutcome {
                site,
                number: entry.number.clone(),
                result,
            });
        }

        summary
    }
}
