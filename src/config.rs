use chrono::{DateTime, Utc};
use std::time::Duration;

/// We generate 100 one-time pre-keys per batch and replenish whenever roughly
/// two thirds of them have been consumed.
pub const MIN_ONE_TIME_PREKEY_COUNT: u32 = 35;

/// Number of one-time pre-keys generated per replenishment batch.
pub const ONE_TIME_PREKEY_BATCH_SIZE: u32 = 100;

/// Superseded signed pre-keys kept around for sessions still in flight.
pub const RETAINED_SIGNED_PREKEYS: usize = 3;

/// One-time pre-keys older than this are culled after a successful rotation.
pub const ONE_TIME_PREKEY_MAX_AGE: Duration = Duration::from_secs(90 * 24 * 60 * 60);

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Remote one-time pre-key count below which a rotation is triggered.
    pub min_one_time_prekey_count: u32,
    pub one_time_prekey_batch_size: u32,
    pub retention: RetentionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_one_time_prekey_count: MIN_ONE_TIME_PREKEY_COUNT,
            one_time_prekey_batch_size: ONE_TIME_PREKEY_BATCH_SIZE,
            retention: RetentionPolicy::default(),
        }
    }
}

/// How much superseded key material survives a successful rotation.
#[derive(Clone, Debug)]
pub struct RetentionPolicy {
    pub retained_signed_prekeys: usize,
    pub one_time_prekey_max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retained_signed_prekeys: RETAINED_SIGNED_PREKEYS,
            one_time_prekey_max_age: ONE_TIME_PREKEY_MAX_AGE,
        }
    }
}

impl RetentionPolicy {
    /// Creation-time cutoff below which one-time pre-keys are culled.
    /// `None` disables age-based culling (e.g. an out-of-range max age).
    pub fn one_time_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let age = chrono::Duration::from_std(self.one_time_prekey_max_age).ok()?;
        now.checked_sub_signed(age)
    }
}
