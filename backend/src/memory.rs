//! In-process backend for tests.
//!
//! Profiles and accounts live in memory, ids and timestamps are assigned on
//! creation, and every object transfer succeeds unless told otherwise. A
//! migration with any failed object answers `success: false` and names the
//! failures in its message. The knobs let tests simulate outages,
//! unreachable environments and partial migration failures.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use pamigrate_core::{
    Error, Result,
    objects::{ObjectRef, ObjectResult},
    profiles::{ConnectionProfile, ProfileDraft, ProfileId},
};
use uuid::Uuid;

use crate::{AuthReply, Backend, ConnectionCheck, MigrationResponse};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    profiles: HashMap<String, Vec<ConnectionProfile>>,
    accounts: HashMap<String, String>,
    objects: HashMap<ProfileId, Vec<ObjectRef>>,
    unreachable: HashSet<String>,
    failing: HashSet<String>,
    silent: HashSet<String>,
    offline: bool,
    requests: usize,
    migrations: Vec<(ProfileId, ProfileId, Vec<ObjectRef>)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the request and fails it when the backend is offline.
    fn begin(&self) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.state();
        state.requests += 1;
        if state.offline {
            return Err(Error::unavailable(None));
        }
        Ok(state)
    }

    /// Every request fails as if the server could not be reached.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Objects discovered on the environment behind `profile`.
    pub fn set_objects(&self, profile: ProfileId, objects: Vec<ObjectRef>) {
        self.state().objects.insert(profile, objects);
    }

    /// Connection tests and listings against this endpoint fail.
    pub fn mark_unreachable(&self, endpoint: impl Into<String>) {
        self.state().unreachable.insert(endpoint.into());
    }

    /// Migrations of objects with this name report a failure.
    pub fn fail_object(&self, name: impl Into<String>) {
        self.state().failing.insert(name.into());
    }

    /// Migrations of objects with this name are left out of the results.
    pub fn omit_result(&self, name: impl Into<String>) {
        self.state().silent.insert(name.into());
    }

    /// Stores a profile directly, bypassing the request counter.
    pub fn seed_profile(&self, username: &str, draft: ProfileDraft) -> ConnectionProfile {
        let profile = ConnectionProfile::new(Uuid::new_v4(), Utc::now(), draft);
        self.state()
            .profiles
            .entry(username.to_string())
            .or_default()
            .push(profile.clone());
        profile
    }

    pub fn stored_profiles(&self, username: &str) -> Vec<ConnectionProfile> {
        self.state()
            .profiles
            .get(username)
            .cloned()
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.state().requests
    }

    /// Source id, target id and objects of every migration received.
    pub fn migrations(&self) -> Vec<(ProfileId, ProfileId, Vec<ObjectRef>)> {
        self.state().migrations.clone()
    }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn test_connection(&self, draft: &ProfileDraft) -> Result<ConnectionCheck> {
        let state = self.begin()?;
        let endpoint = draft.settings.endpoint();
        if state.unreachable.contains(&endpoint) {
            return Ok(ConnectionCheck {
                success: false,
                message: format!("Cannot reach {endpoint}"),
            });
        }
        Ok(ConnectionCheck {
            success: true,
            message: "Connection successful".into(),
        })
    }

    async fn list_objects(&self, profile: &ConnectionProfile) -> Result<Vec<ObjectRef>> {
        let state = self.begin()?;
        let endpoint = profile.endpoint();
        if state.unreachable.contains(&endpoint) {
            return Err(Error::unavailable(Some(format!("Cannot reach {endpoint}"))));
        }
        Ok(state
            .objects
            .get(&profile.id())
            .cloned()
            .unwrap_or_default())
    }

    async fn migrate_objects(
        &self,
        source: &ConnectionProfile,
        target: &ConnectionProfile,
        objects: &[ObjectRef],
    ) -> Result<MigrationResponse> {
        let mut state = self.begin()?;
        state
            .migrations
            .push((source.id(), target.id(), objects.to_vec()));
        if state.unreachable.contains(&source.endpoint())
            || state.unreachable.contains(&target.endpoint())
        {
            return Ok(MigrationResponse {
                success: false,
                message: INVALID_CREDENTIALS.into(),
                results: Vec::new(),
            });
        }

        let mut migrated = 0;
        let mut failed = Vec::new();
        let mut results = Vec::new();
        for object in objects {
            let status = if state.failing.contains(&object.name) {
                failed.push(object.name.clone());
                "not transferred"
            } else {
                migrated += 1;
                "ok"
            };
            if !state.silent.contains(&object.name) {
                results.push(ObjectResult {
                    name: object.name.clone(),
                    status: status.into(),
                    object_type: Some(object.object_type),
                });
            }
        }

        let message = if failed.is_empty() {
            format!("Migrated {migrated} objects successfully")
        } else {
            format!(
                "Migrated {migrated} objects successfully, Error on {}",
                failed.join(", ")
            )
        };
        Ok(MigrationResponse {
            success: failed.is_empty(),
            message,
            results,
        })
    }

    async fn list_profiles(&self, username: &str) -> Result<Vec<ConnectionProfile>> {
        let state = self.begin()?;
        Ok(state.profiles.get(username).cloned().unwrap_or_default())
    }

    async fn create_profile(
        &self,
        username: &str,
        draft: &ProfileDraft,
    ) -> Result<ConnectionProfile> {
        let mut state = self.begin()?;
        let profile = ConnectionProfile::new(Uuid::new_v4(), Utc::now(), draft.clone());
        state
            .profiles
            .entry(username.to_string())
            .or_default()
            .push(profile.clone());
        Ok(profile)
    }

    async fn update_profile(
        &self,
        username: &str,
        id: ProfileId,
        draft: &ProfileDraft,
    ) -> Result<ConnectionProfile> {
        let mut state = self.begin()?;
        let profiles = state.profiles.entry(username.to_string()).or_default();
        let Some(slot) = profiles.iter_mut().find(|profile| profile.id() == id) else {
            return Err(Error::unavailable(Some(format!("environment {id} not found"))));
        };
        let revised = slot.revise(draft.clone())?;
        *slot = revised.clone();
        Ok(revised)
    }

    async fn delete_profile(&self, username: &str, id: ProfileId) -> Result<()> {
        let mut state = self.begin()?;
        if let Some(profiles) = state.profiles.get_mut(username) {
            profiles.retain(|profile| profile.id() != id);
        }
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> Result<AuthReply> {
        let state = self.begin()?;
        let accepted = state
            .accounts
            .get(username)
            .is_some_and(|stored| stored == password);
        Ok(AuthReply {
            success: accepted,
            error: (!accepted).then(|| INVALID_CREDENTIALS.to_string()),
        })
    }

    async fn register(&self, username: &str, password: &str) -> Result<AuthReply> {
        let mut state = self.begin()?;
        if state.accounts.contains_key(username) {
            return Ok(AuthReply {
                success: false,
                error: Some("Username already taken".into()),
            });
        }
        state
            .accounts
            .insert(username.to_string(), password.to_string());
        Ok(AuthReply {
            success: true,
            error: None,
        })
    }
}
