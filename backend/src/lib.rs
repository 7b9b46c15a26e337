mod http;
pub mod memory;

use pamigrate_core::{
    Result,
    objects::{ObjectRef, ObjectResult},
    profiles::{ConnectionProfile, ProfileDraft, ProfileId},
};
use serde::{Deserialize, Serialize};

pub use http::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, HttpBackend};
pub use memory::MemoryBackend;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCheck {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResponse {
    pub success: bool,
    #[serde(default, alias = "error")]
    pub message: String,
    #[serde(default)]
    pub results: Vec<ObjectResult>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The remote execution service that owns the TM1 protocol, profile storage
/// and operator accounts.
///
/// Every failure to obtain a well-formed answer is reported as
/// `Error::BackendUnavailable`; an answer carrying `success: false` on an
/// endpoint without its own success flag is `Error::BackendRejected`.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn test_connection(&self, draft: &ProfileDraft) -> Result<ConnectionCheck>;
    async fn list_objects(&self, profile: &ConnectionProfile) -> Result<Vec<ObjectRef>>;
    async fn migrate_objects(
        &self,
        source: &ConnectionProfile,
        target: &ConnectionProfile,
        objects: &[ObjectRef],
    ) -> Result<MigrationResponse>;
    async fn list_profiles(&self, username: &str) -> Result<Vec<ConnectionProfile>>;
    async fn create_profile(&self, username: &str, draft: &ProfileDraft)
    -> Result<ConnectionProfile>;
    async fn update_profile(
        &self,
        username: &str,
        id: ProfileId,
        draft: &ProfileDraft,
    ) -> Result<ConnectionProfile>;
    async fn delete_profile(&self, username: &str, id: ProfileId) -> Result<()>;
    async fn login(&self, username: &str, password: &str) -> Result<AuthReply>;
    async fn register(&self, username: &str, password: &str) -> Result<AuthReply>;
}
