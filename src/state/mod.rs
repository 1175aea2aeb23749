pub mod one_time_prekey_record;
pub mod signed_prekey_record;

pub use one_time_prekey_record::OneTimePreKeyRecord;
pub use signed_prekey_record::SignedPreKeyRecord;

use serde::{Deserialize, Serialize};

/// Observable lifecycle position of a signed pre-key record.
///
/// Acceptance and promotion to current happen in one atomic store write, so
/// "accepted but not yet current" is never observable: an accepted record is
/// either the current one or has been superseded by a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignedPreKeyState {
    /// Persisted locally, upload not yet acknowledged by the directory.
    Generated,
    /// Accepted by the directory and advertised as the active signed key.
    Current,
    /// Accepted previously, replaced by a newer current record; retained for
    /// sessions still in flight until culled.
    Superseded,
}
