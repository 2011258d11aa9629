use std::fmt;

/// One account to download, with credentials resolved for this call only.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    /// Name of the [`Site`](super::Site) this account lives at.
    pub site: String,
    /// Account number. Empty requests account discovery instead of a statement.
    pub number: String,
    /// Bank account sub-type (`CHECKING`, `SAVINGS`, ...). Ignored for other statement kinds.
    pub account_type: String,
    pub username: String,
    pub password: String,
}

impl Account {
    /// Returns `true` when this entry asks for account discovery.
    pub fn is_discovery(&self) -> bool {
        self.number.trim().is_empty()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("site", &self.site)
            .field("number", &self.number)
            .field("account_type", &self.account_type)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_shows_password() {
        let account = Account {
            site: "BANK".to_string(),
            number: "1".to_string(),
            account_type: "CHECKING".to_string(),
            username: "me".to_string(),
            password: "hunter2".to_string(),
        };
        let shown = format!("{:?}", account);
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn blank_number_means_discovery() {
        let account = Account {
            site: "BANK".to_string(),
            number: "  ".to_string(),
            account_type: String::new(),
            username: "me".to_string(),
            password: "pw".to_string(),
        };
        assert!(account.is_discovery());
    }
}
