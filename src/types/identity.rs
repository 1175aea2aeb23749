use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity role under which an independent set of pre-key records is
/// maintained. A registered account advertises keys for both roles; nothing
/// is ever shared between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    /// Keys tied to the long-term account identifier.
    Account,
    /// Keys tied to the account's phone number.
    Phone,
}

impl Identity {
    pub const ALL: [Identity; 2] = [Identity::Account, Identity::Phone];

    /// Stable label, also used as a storage key segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Identity::Account => "account",
            Identity::Phone => "phone",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
