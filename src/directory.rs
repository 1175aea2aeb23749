use crate::state::{OneTimePreKeyRecord, SignedPreKeyRecord};
use crate::types::Identity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error surface of the remote key directory.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service could not be reached at all.
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// The service answered with a non-success HTTP status.
    #[error("service returned status {0}")]
    Status(u16),

    /// The service answered with something we could not interpret.
    #[error("malformed service response: {0}")]
    Protocol(String),
}

impl ServiceError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ServiceError::Connectivity(_))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServiceError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Public half of a signed pre-key as uploaded to the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPreKeyUpload {
    pub key_id: u32,
    pub public_key: [u8; 32],
    #[serde(with = "serde_bytes")]
    pub signature: [u8; 64],
}

impl From<&SignedPreKeyRecord> for SignedPreKeyUpload {
    fn from(record: &SignedPreKeyRecord) -> Self {
        Self {
            key_id: record.id,
            public_key: record.key_pair.public_key,
            signature: record.signature,
        }
    }
}

/// Public half of a one-time pre-key as uploaded to the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimePreKeyUpload {
    pub key_id: u32,
    pub public_key: [u8; 32],
}

impl From<&OneTimePreKeyRecord> for OneTimePreKeyUpload {
    fn from(record: &OneTimePreKeyRecord) -> Self {
        Self {
            key_id: record.id,
            public_key: record.key_pair.public_key,
        }
    }
}

/// One rotation's worth of key material for upload. Carries public material
/// only; private halves never leave the local store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyUploadBundle {
    pub identity_key: [u8; 32],
    pub signed_prekey: SignedPreKeyUpload,
    pub one_time_prekeys: Vec<OneTimePreKeyUpload>,
}

/// Remote interface of the key directory service. Implementations wrap the
/// actual transport; the engine only sees counts and upload acknowledgments.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// How many one-time pre-keys the directory still holds for `identity`.
    async fn get_one_time_prekey_count(&self, identity: Identity) -> Result<u32, ServiceError>;

    /// Publishes a new signed pre-key and one-time batch. Must only return
    /// `Ok` once the directory has durably accepted the whole bundle.
    async fn upload_keys(
        &self,
        identity: Identity,
        bundle: KeyUploadBundle,
    ) -> Result<(), ServiceError>;
}
