mod account;
mod site;

pub use self::account::Account;
pub use self::site::{Capability, Site, DEFAULT_APP_ID, DEFAULT_APP_VER, DEFAULT_OFX_VERSION};
