use serde::{Deserialize, Serialize};

pub const DEFAULT_OFX_VERSION: &str = "102";
pub const DEFAULT_APP_ID: &str = "QWIN";
pub const DEFAULT_APP_VER: &str = "2200";

/// Message sets a financial institution supports.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    #[serde(rename = "SIGNON")]
    Signon,
    #[serde(rename = "BASTMT")]
    BankStatement,
    #[serde(rename = "CCSTMT")]
    CreditCardStatement,
    #[serde(rename = "INVSTMT")]
    InvestmentStatement,
}

/// Endpoint descriptor for one financial institution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Site {
    pub name: String,

    pub fi_org: String,

    pub fid: String,

    pub url: String,

    #[serde(default = "default_ofx_version")]
    pub ofx_version: String,

    #[serde(default = "default_app_id")]
    pub app_id: String,

    #[serde(default = "default_app_ver")]
    pub app_ver: String,

    #[serde(default)]
    pub bank_id: Option<String>,

    #[serde(default)]
    pub broker_id: Option<String>,

    #[serde(default)]
    pub client_uid: Option<String>,

    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// Minimum lookback, in days, this institution needs to return anything useful.
    #[serde(default)]
    pub min_interval: u32,

    /// Hours to shift `DTASOF` values by after download. Fractions allowed.
    #[serde(default)]
    pub time_offset: Option<f64>,
}

fn default_ofx_version() -> String {
    DEFAULT_OFX_VERSION.to_string()
}

fn default_app_id() -> String {
    DEFAULT_APP_ID.to_string()
}

fn default_app_ver() -> String {
    DEFAULT_APP_VER.to_string()
}

impl Site {
    /// Returns `true` when the site declares `capability`.
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// The broker identifier for investment requests: the declared broker id,
    /// falling back to the organization id.
    pub fn effective_broker_id(&self) -> Option<&str> {
        non_empty(self.broker_id.as_deref()).or_else(|| non_empty(Some(self.fi_org.as_str())))
    }

    /// The declared bank routing id, if any.
    pub fn effective_bank_id(&self) -> Option<&str> {
        non_empty(self.bank_id.as_deref())
    }

    /// The declared time-zone correction, ignoring an explicit zero.
    pub fn time_shift_hours(&self) -> Option<f64> {
        self.time_offset.filter(|h| *h != 0.0)
    }

    /// Whether the sign-on block must carry `CLIENTUID`.
    pub fn wants_client_uid(&self) -> bool {
        self.ofx_version.trim() == "103"
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
fn test_site(capabilities: &[Capability]) -> Site {
    Site {
        name: "TESTBANK".to_string(),
        fi_org: "TestOrg".to_string(),
        fid: "1234".to_string(),
        url: "https://ofx.testbank.example/ofx".to_string(),
        ofx_version: DEFAULT_OFX_VERSION.to_string(),
        app_id: DEFAULT_APP_ID.to_string(),
        app_ver: DEFAULT_APP_VER.to_string(),
        bank_id: None,
        broker_id: None,
        client_uid: None,
        capabilities: capabilities.to_vec(),
        min_interval: 0,
        time_offset: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_id_prefers_declared_value() {
        let mut site = test_site(&[Capability::InvestmentStatement]);
        assert_eq!(site.effective_broker_id(), Some("TestOrg"));
        site.broker_id = Some("broker.example.com".to_string());
        assert_eq!(site.effective_broker_id(), Some("broker.example.com"));
    }

    #[test]
    fn broker_id_missing_when_both_blank() {
        let mut site = test_site(&[Capability::InvestmentStatement]);
        site.fi_org = String::new();
        site.broker_id = Some("  ".to_string());
        assert_eq!(site.effective_broker_id(), None);
    }

    #[test]
    fn zero_offset_is_no_shift() {
        let mut site = test_site(&[]);
        site.time_offset = Some(0.0);
        assert_eq!(site.time_shift_hours(), None);
        site.time_offset = Some(-1.5);
        assert_eq!(site.time_shift_hours(), Some(-1.5));
    }
}
