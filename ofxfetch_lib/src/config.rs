//! TOML configuration: global settings, institution sites, and accounts.
//!
//! ```toml
//! [settings]
//! default_interval = 14
//!
//! [[sites]]
//! name = "MyBank"
//! fi_org = "MyBank"
//! fid = "1001"
//! url = "https://ofx.mybank.example/ofx"
//! bank_id = "123456789"
//! capabilities = ["SIGNON", "BASTMT"]
//!
//! [[accounts]]
//! site = "MYBANK"
//! number = "000111222"
//! username = "me"
//! password_env = "MYBANK_PASSWORD"
//! ```

use std::path::{Path, PathBuf};

use ofxfetch_api::types::{Account, Site};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scrubber::{RuleName, ScrubOptions};

pub const DEFAULT_CONFIG_FILE: &str = "ofxfetch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("unknown site '{0}'")]
    UnknownSite(String),
    #[error("site '{site}': {reason}")]
    InvalidSite { site: String, reason: String },
    #[error("no password for {site} account {number}: {reason}")]
    MissingCredential {
        site: String,
        number: String,
        reason: String,
    },
}

/// Run-wide settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Days of history requested when the command line does not say otherwise.
    pub default_interval: u32,
    /// Directory receiving downloaded and synthetic statements.
    pub xfr_dir: PathBuf,
    pub quiet_scrub: bool,
    /// Client id sent to sites speaking protocol version 103.
    pub client_uid: Option<String>,
    pub quote_account: String,
    pub quote_currency: String,
    pub force_quotes: bool,
    pub save_quote_history: bool,
    pub disabled_scrub_rules: Vec<RuleName>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_interval: 7,
            xfr_dir: PathBuf::from("xfr"),
            quiet_scrub: false,
            client_uid: None,
            quote_account: "0123456789".to_string(),
            quote_currency: "USD".to_string(),
            force_quotes: false,
            save_quote_history: false,
            disabled_scrub_rules: Vec::new(),
        }
    }
}

impl Settings {
    pub fn scrub_options(&self) -> ScrubOptions {
        ScrubOptions {
            quiet: self.quiet_scrub,
            disabled: self.disabled_scrub_rules.iter().copied().collect(),
        }
    }
}

/// One `[[accounts]]` entry. The password is resolved only when the account is fetched.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct AccountConfig {
    pub site: String,
    #[serde(default)]
    pub number: String,
    #[serde(default = "default_account_type")]
    pub account_type: String,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Name of an environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
}

fn default_account_type() -> String {
    "CHECKING".to_string()
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("site", &self.site)
            .field("number", &self.number)
            .field("account_type", &self.account_type)
            .field("username", &self.username)
            .field("password_env", &self.password_env)
            .finish_non_exhaustive()
    }
}

impl AccountConfig {
    /// Builds the request-time [`Account`], reading the password from the
    /// config value or the named environment variable.
    pub fn resolve(&self) -> Result<Account, ConfigError> {
        let missing = |reason: String| ConfigError::MissingCredential {
            site: self.site.clone(),
            number: self.number.clone(),
            reason,
        };

        let password = match (&self.password, &self.password_env) {
            (Some(password), _) => password.clone(),
            (None, Some(var)) => std::env::var(var)
                .map_err(|e| missing(format!("environment variable {}: {}", var, e)))?,
            (None, None) => return Err(missing("set password or password_env".to_string())),
        };

        Ok(Account {
            site: self.site.to_uppercase(),
            number: self.number.trim().to_string(),
            account_type: self.account_type.to_uppercase(),
            username: self.username.clone(),
            password,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(
            path = %path.display(),
            sites = config.sites.len(),
            accounts = config.accounts.len(),
            "loaded config"
        );
        Ok(config)
    }

    /// Parses and normalizes a config document. Site names are upper-cased so
    /// lookups are case-insensitive; sites without a client id inherit the
    /// global one. A `time_offset` must be a finite number of hours.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        for site in &mut config.sites {
            site.name = site.name.trim().to_uppercase();
            if let Some(hours) = site.time_offset.filter(|h| !h.is_finite()) {
                return Err(ConfigError::InvalidSite {
                    site: site.name.clone(),
                    reason: format!("time_offset must be a finite number of hours, got {}", hours),
                });
            }
            if site.client_uid.is_none() {
                site.client_uid = config.settings.client_uid.clone();
            }
        }
        Ok(config)
    }

    /// Looks up a site by name, ignoring case.
    pub fn site(&self, name: &str) -> Result<&Site, ConfigError> {
        let wanted = name.trim().to_uppercase();
        self.sites
            .iter()
            .find(|s| s.name == wanted)
            .ok_or(ConfigError::UnknownSite(wanted))
    }
}

#[cfg(test)]
mod tests {
    use ofxfetch_api::types::Capability;

    use super::*;

    const SAMPLE: &str = r#"
[settings]
default_interval = 14
client_uid = "GLOBAL-UID"
disabled_scrub_rules = ["vendor_fitid"]

[[sites]]
name = "MyBank"
fi_org = "MyBank"
fid = "1001"
url = "https://ofx.mybank.example/ofx"
bank_id = "123456789"
capabilities = ["SIGNON", "BASTMT"]

[[sites]]
name = "broker"
fi_org = "Broker Inc"
fid = "77"
url = "https://ofx.broker.example"
ofx_version = "103"
client_uid = "SITE-UID"
capabilities = ["SIGNON", "INVSTMT"]
min_interval = 30
time_offset = -5.5

[[accounts]]
site = "mybank"
number = "000111222"
username = "me"
password = "secret"

[[accounts]]
site = "BROKER"
number = "X1"
username = "me"
password_env = "OFXFETCH_TEST_UNSET_PASSWORD_VAR"
"#;

    #[test]
    fn parses_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.settings.default_interval, 14);
        assert_eq!(config.settings.xfr_dir, PathBuf::from("xfr"));
        assert_eq!(config.settings.quote_account, "0123456789");
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.accounts.len(), 2);

        let bank = config.site("MYBANK").unwrap();
        assert!(bank.supports(Capability::BankStatement));
        assert_eq!(bank.ofx_version, "102");
        assert_eq!(bank.client_uid.as_deref(), Some("GLOBAL-UID"));

        let broker = config.site("Broker").unwrap();
        assert_eq!(broker.client_uid.as_deref(), Some("SITE-UID"));
        assert_eq!(broker.min_interval, 30);
        assert_eq!(broker.time_offset, Some(-5.5));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.settings, Settings::default());
        assert!(config.sites.is_empty());
    }

    #[test]
    fn unknown_site_is_reported() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert!(matches!(
            config.site("nowhere"),
            Err(ConfigError::UnknownSite(name)) if name == "NOWHERE"
        ));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        assert!(matches!(
            Config::from_toml("[[sites]\nname="),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn non_finite_time_offset_is_rejected() {
        for value in ["inf", "-inf", "nan"] {
            let doc = format!(
                "[[sites]]\nname = \"Shifty\"\nfi_org = \"S\"\nfid = \"1\"\nurl = \"https://s\"\ntime_offset = {}\n",
                value
            );
            let err = Config::from_toml(&doc).unwrap_err();
            assert!(matches!(
                &err,
                ConfigError::InvalidSite { site, .. } if site == "SHIFTY"
            ));
            assert!(err.to_string().contains("time_offset"));
        }
    }

    #[test]
    fn scrub_options_follow_settings() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let options = config.settings.scrub_options();
        assert!(!options.quiet);
        assert!(options.disabled.contains(&RuleName::VendorFitid));
        assert_eq!(options.disabled.len(), 1);
    }

    #[test]
    fn resolves_inline_password() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let account = config.accounts[0].resolve().unwrap();
        assert_eq!(account.site, "MYBANK");
        assert_eq!(account.account_type, "CHECKING");
        assert_eq!(account.password, "secret");
    }

    #[test]
    fn unset_password_env_is_reported() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let err = config.accounts[1].resolve().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
        assert!(err.to_string().contains("OFXFETCH_TEST_UNSET_PASSWORD_VAR"));
    }

    #[test]
    fn debug_hides_password() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let shown = format!("{:?}", config.accounts[0]);
        assert!(!shown.contains("secret"));
    }
}
