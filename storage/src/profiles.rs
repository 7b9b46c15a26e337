use std::sync::Arc;

use pamigrate_backend::Backend;
use pamigrate_core::{
    Error, Result, ValidationError,
    profiles::{ConnectionProfile, FieldBag, ProfileDraft, ProfileId, ProfileKind, ProfileLookup},
    session::Session,
};
use serde_json::Value;
use tracing::{info, warn};

/// The operator's connection profiles, cached locally and owned by the backend.
///
/// The cache only changes after the backend confirmed a mutation. When the
/// two can no longer be trusted to agree, the cache is emptied and marked
/// unsynced until the next successful [`ProfileStore::list`].
pub struct ProfileStore {
    backend: Arc<dyn Backend>,
    session: Session,
    profiles: Vec<ConnectionProfile>,
    synced: bool,
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn Backend>, session: Session) -> Self {
        Self {
            backend,
            session,
            profiles: Vec::new(),
            synced: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn profiles(&self) -> &[ConnectionProfile] {
        &self.profiles
    }

    pub fn get(&self, id: ProfileId) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|profile| profile.id() == id)
    }

    /// Whether the cache reflects the backend. An empty unsynced cache means
    /// "unknown", not "no profiles".
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub async fn list(&mut self) -> Result<&[ConnectionProfile]> {
        match self.backend.list_profiles(self.session.username()).await {
            Ok(profiles) => {
                info!(
                    user = self.session.username(),
                    count = profiles.len(),
                    "loaded profiles"
                );
                self.profiles = profiles;
                self.synced = true;
                Ok(&self.profiles)
            }
            Err(err) => {
                // Carries the decode error when a stored entry is malformed.
                warn!(user = self.session.username(), error = %err, "failed to load profiles");
                self.invalidate();
                Err(err)
            }
        }
    }

    /// Creates a profile from a field bag whose `type` names the kind.
    pub async fn create(&mut self, fields: &FieldBag) -> Result<ConnectionProfile> {
        let draft = ProfileDraft::parse(fields)?;
        self.create_draft(draft).await
    }

    pub async fn create_draft(&mut self, draft: ProfileDraft) -> Result<ConnectionProfile> {
        draft.validate()?;
        let created = self
            .backend
            .create_profile(self.session.username(), &draft)
            .await?;
        if created.kind() != draft.kind() {
            return Err(self.out_of_sync(format!(
                "backend stored a {} profile for a {} request",
                created.kind(),
                draft.kind()
            )));
        }
        info!(id = %created.id(), kind = %created.kind(), "created profile");
        self.profiles.push(created.clone());
        Ok(created)
    }

    /// Updates a profile from a field bag interpreted for its existing kind.
    pub async fn update(&mut self, id: ProfileId, fields: &FieldBag) -> Result<ConnectionProfile> {
        let kind = self.existing_kind(id)?;
        if let Some(Value::String(requested)) = fields.get("type") {
            let requested: ProfileKind = requested.parse()?;
            if requested != kind {
                return Err(ValidationError::KindMismatch {
                    existing: kind,
                    requested,
                }
                .into());
            }
        }
        let draft = ProfileDraft::from_fields(kind, fields)?;
        self.update_draft(id, draft).await
    }

    pub async fn update_draft(
        &mut self,
        id: ProfileId,
        draft: ProfileDraft,
    ) -> Result<ConnectionProfile> {
        let kind = self.existing_kind(id)?;
        if draft.kind() != kind {
            return Err(ValidationError::KindMismatch {
                existing: kind,
                requested: draft.kind(),
            }
            .into());
        }
        draft.validate()?;

        let updated = self
            .backend
            .update_profile(self.session.username(), id, &draft)
            .await?;
        if updated.id() != id || updated.kind() != kind {
            return Err(self.out_of_sync(format!(
                "backend answered the update of {id} with {} profile {}",
                updated.kind(),
                updated.id()
            )));
        }
        match self.profiles.iter().position(|profile| profile.id() == id) {
            Some(index) => self.profiles[index] = updated.clone(),
            None => return Err(self.out_of_sync(format!("profile {id} vanished from the cache"))),
        }
        info!(%id, "updated profile");
        Ok(updated)
    }

    pub async fn delete(&mut self, id: ProfileId) -> Result<()> {
        self.backend
            .delete_profile(self.session.username(), id)
            .await?;
        self.profiles.retain(|profile| profile.id() != id);
        info!(%id, "deleted profile");
        Ok(())
    }

    fn existing_kind(&self, id: ProfileId) -> Result<ProfileKind> {
        self.get(id)
            .map(ConnectionProfile::kind)
            .ok_or_else(|| ValidationError::UnknownProfile(id).into())
    }

    fn invalidate(&mut self) {
        self.profiles.clear();
        self.synced = false;
    }

    fn out_of_sync(&mut self, detail: String) -> Error {
        warn!("profile cache out of sync: {detail}");
        self.invalidate();
        Error::BackendUnavailable(format!("{detail}; reload the profile list"))
    }
}

impl ProfileLookup for ProfileStore {
    fn resolve(&self, id: ProfileId) -> Option<&ConnectionProfile> {
        self.get(id)
    }
}
