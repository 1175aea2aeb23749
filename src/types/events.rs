use crate::engine::RotationError;
use crate::types::Identity;

/// Outcome of one replenishment pass, consumed by alerting and retry-backoff
/// collaborators.
#[derive(Debug)]
pub enum RotationEvent {
    Succeeded {
        identity: Identity,
    },
    Failed {
        identity: Identity,
        /// Whether the failure counts toward user-visible alerting
        /// (service-classified errors do, connectivity blips do not).
        reportable: bool,
        error: RotationError,
    },
}
