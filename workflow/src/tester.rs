use std::sync::Arc;

use pamigrate_backend::Backend;
use pamigrate_core::{
    Result,
    profiles::{FieldBag, ProfileDraft},
};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionReport {
    pub reachable: bool,
    pub detail: String,
}

/// Checks that a profile, saved or not, can be reached.
///
/// Shares nothing with the profile store, so tests may run at any time and
/// a failed test never blocks saving the profile.
#[derive(Clone)]
pub struct ConnectionTester {
    backend: Arc<dyn Backend>,
}

impl ConnectionTester {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Tests a field bag whose `type` names the profile kind.
    pub async fn test(&self, fields: &FieldBag) -> Result<ConnectionReport> {
        let draft = ProfileDraft::parse(fields)?;
        self.test_draft(&draft).await
    }

    pub async fn test_draft(&self, draft: &ProfileDraft) -> Result<ConnectionReport> {
        draft.validate()?;
        let endpoint = draft.settings.endpoint();
        let report = match self.backend.test_connection(draft).await {
            Ok(check) => ConnectionReport {
                reachable: check.success,
                detail: check.message,
            },
            Err(err) => ConnectionReport {
                reachable: false,
                detail: err.to_string(),
            },
        };
        if report.reachable {
            info!(%endpoint, "connection test passed");
        } else {
            warn!(%endpoint, detail = %report.detail, "connection test failed");
        }
        Ok(report)
    }
}
