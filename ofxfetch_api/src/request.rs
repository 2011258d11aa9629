//! Statement request construction.
//!
//! A [`Session`] owns the per-client mutable state (identifier generator and
//! sequence cookie) and builds one [`StatementRequest`] per call. The request
//! kind is chosen by [`RequestKind::select`] with a fixed precedence.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};

use crate::message::{document_header, Node, UidGenerator};
use crate::timestamp::format_timestamp;
use crate::types::{Account, Capability, Site};
use crate::Error;

/// Start of the window used for account discovery.
pub const DISCOVERY_EPOCH: &str = "19700101000000";

/// The cookie counter is incremented before use, so the first request carries 4.
const INITIAL_COOKIE: u32 = 3;

/// Which request document a site/account pair gets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    AccountDiscovery,
    CreditCard,
    Investment,
    Bank,
}

impl RequestKind {
    /// Picks the request kind. Precedence is fixed: discovery (no account
    /// number), then credit card, then investment, then bank. A site declaring
    /// several statement capabilities gets the first match.
    pub fn select(site: &Site, account: &Account) -> Result<Self, Error> {
        if account.is_discovery() {
            Ok(Self::AccountDiscovery)
        } else if site.supports(Capability::CreditCardStatement) {
            Ok(Self::CreditCard)
        } else if site.supports(Capability::InvestmentStatement) {
            Ok(Self::Investment)
        } else if site.supports(Capability::BankStatement) {
            Ok(Self::Bank)
        } else {
            Err(Error::config(
                &site.name,
                "no statement capability (BASTMT, CCSTMT or INVSTMT) declared",
            ))
        }
    }
}

/// The lookback window for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateWindow {
    /// First day to include, at midnight.
    pub start: NaiveDateTime,
    /// Reference "now" for client timestamps and position as-of dates.
    pub now: NaiveDateTime,
}

impl DateWindow {
    /// A window covering `days` calendar days back from `now`.
    pub fn days_before(now: NaiveDateTime, days: u32) -> Self {
        let start_date: NaiveDate = now.date() - Duration::days(i64::from(days));
        Self {
            start: start_date.and_time(chrono::NaiveTime::MIN),
            now,
        }
    }

    /// A window covering `days` calendar days back from the local clock.
    pub fn last_days(days: u32) -> Self {
        Self::days_before(Local::now().naive_local(), days)
    }
}

/// A fully built request: header preamble plus the `<OFX>` tree.
#[derive(Clone, Debug)]
pub struct StatementRequest {
    pub kind: RequestKind,
    pub header: String,
    pub body: Node,
}

impl StatementRequest {
    /// The exact text POSTed to the server: header, blank line, body.
    pub fn to_text(&self) -> String {
        format!("{}\r\n{}", self.header, self.body.render())
    }
}

/// Per-client request state.
pub struct Session {
    uids: UidGenerator,
    cookie: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_uids(UidGenerator::new())
    }

    /// Creates a session drawing identifiers from `uids`.
    pub fn with_uids(uids: UidGenerator) -> Self {
        Self {
            uids,
            cookie: INITIAL_COOKIE,
        }
    }

    /// Builds the request document for `account` at `site`.
    ///
    /// Fails with [`Error::Config`] when the chosen statement kind needs a site
    /// field that is missing (bank id, broker id). Nothing touches the network.
    pub fn build_request(
        &mut self,
        site: &Site,
        account: &Account,
        window: &DateWindow,
    ) -> Result<StatementRequest, Error> {
        let kind = RequestKind::select(site, account)?;
        let dtstart = format_timestamp(window.start);

        let message = match kind {
            RequestKind::AccountDiscovery => {
                let req = Node::tag("ACCTINFORQ")
                    .field("DTACCTUP", DISCOVERY_EPOCH)
                    .build();
                self.message("SIGNUPMSGSRQV1", "ACCTINFOTRNRQ", req)
            }
            RequestKind::CreditCard => {
                let req = Node::tag("CCSTMTRQ")
                    .child(Node::tag("CCACCTFROM").field("ACCTID", &account.number))
                    .child(include_transactions(&dtstart))
                    .build();
                self.message("CREDITCARDMSGSRQV1", "CCSTMTTRNRQ", req)
            }
            RequestKind::Investment => {
                let broker_id = site.effective_broker_id().ok_or_else(|| {
                    Error::config(&site.name, "a broker_id or fi_org value is required")
                })?;
                let req = Node::tag("INVSTMTRQ")
                    .child(
                        Node::tag("INVACCTFROM")
                            .field("BROKERID", broker_id)
                            .field("ACCTID", &account.number),
                    )
                    .child(include_transactions(&dtstart))
                    .field("INCOO", "Y")
                    .child(
                        Node::tag("INCPOS")
                            .field("DTASOF", format_timestamp(window.now))
                            .field("INCLUDE", "Y"),
                    )
                    .field("INCBAL", "Y")
                    .build();
                self.message("INVSTMTMSGSRQV1", "INVSTMTTRNRQ", req)
            }
            RequestKind::Bank => {
                let bank_id = site
                    .effective_bank_id()
                    .ok_or_else(|| Error::config(&site.name, "a bank_id value is required"))?;
                let req = Node::tag("STMTRQ")
                    .child(
                        Node::tag("BANKACCTFROM")
                            .field("BANKID", bank_id)
                            .field("ACCTID", &account.number)
                            .field("ACCTTYPE", &account.account_type),
                    )
                    .child(include_transactions(&dtstart))
                    .build();
                self.message("BANKMSGSRQV1", "STMTTRNRQ", req)
            }
        };

        let body = Node::tag("OFX")
            .child(sign_on(site, account, window.now))
            .child(message)
            .build();
        let header = document_header(&site.ofx_version, &self.uids.next_uid());

        tracing::debug!(site = %site.name, ?kind, "built statement request");
        Ok(StatementRequest { kind, header, body })
    }

    fn next_cookie(&mut self) -> String {
        self.cookie += 1;
        self.cookie.to_string()
    }

    /// Wraps a request in its message set and transaction envelope.
    fn message(&mut self, msgset: &'static str, trn: &'static str, request: Node) -> Node {
        Node::tag(msgset)
            .child(
                Node::tag(trn)
                    .field("TRNUID", self.uids.next_uid())
                    .field("CLTCOOKIE", self.next_cookie())
                    .child(request),
            )
            .build()
    }
}

fn include_transactions(dtstart: &str) -> Node {
    Node::tag("INCTRAN")
        .field("DTSTART", dtstart)
        .field("INCLUDE", "Y")
        .build()
}

fn sign_on(site: &Site, account: &Account, now: NaiveDateTime) -> Node {
    // Servers speaking 102 may reject an unexpected CLIENTUID.
    let client_uid = if site.wants_client_uid() {
        site.client_uid.clone()
    } else {
        None
    };
    Node::tag("SIGNONMSGSRQV1")
        .child(
            Node::tag("SONRQ")
                .field("DTCLIENT", format_timestamp(now))
                .field("USERID", &account.username)
                .field("USERPASS", &account.password)
                .field("LANGUAGE", "ENG")
                .child(
                    Node::tag("FI")
                        .field("ORG", &site.fi_org)
                        .field("FID", &site.fid),
                )
                .field("APPID", &site.app_id)
                .field("APPVER", &site.app_ver)
                .opt_field("CLIENTUID", client_uid),
        )
        .build()
}
