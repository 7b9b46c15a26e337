use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use pamigrate_backend::{Backend, MigrationResponse};
use pamigrate_core::{
    MigrationBlocker, Result, ValidationError,
    objects::{MigratableObject, MigrationOutcome, MigrationRequest, ObjectRef, ObjectType},
    profiles::{ConnectionProfile, ProfileId, ProfileLookup},
    session::Session,
};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowState {
    /// No source selected, or the source was invalidated.
    Idle,
    /// Waiting for the object list of the current source.
    Listing,
    Ready,
    /// A migration snapshot is with the backend.
    Migrating,
}

impl WorkflowState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Listing => "listing",
            WorkflowState::Ready => "ready",
            WorkflowState::Migrating => "migrating",
        }
    }

    pub fn allows(self, operation: Operation) -> bool {
        match operation {
            Operation::SelectSource | Operation::SelectTarget => self != WorkflowState::Migrating,
            Operation::ToggleObject | Operation::ToggleType | Operation::Execute => {
                self == WorkflowState::Ready
            }
            Operation::ApplyListing => self == WorkflowState::Listing,
            Operation::FinishMigration => self == WorkflowState::Migrating,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    SelectSource,
    SelectTarget,
    ToggleObject,
    ToggleType,
    Execute,
    ApplyListing,
    FinishMigration,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::SelectSource => "select a source",
            Operation::SelectTarget => "select a target",
            Operation::ToggleObject => "toggle an object",
            Operation::ToggleType => "toggle an object type",
            Operation::Execute => "start a migration",
            Operation::ApplyListing => "apply an object listing",
            Operation::FinishMigration => "finish a migration",
        }
    }
}

/// Migration may start only with two distinct environments and a non-empty selection.
pub fn check_preconditions(
    source: Option<ProfileId>,
    target: Option<ProfileId>,
    selected: usize,
) -> std::result::Result<(), MigrationBlocker> {
    match (source, target) {
        (None, _) => Err(MigrationBlocker::SourceMissing),
        (_, None) => Err(MigrationBlocker::TargetMissing),
        (Some(source), Some(target)) if source == target => Err(MigrationBlocker::SameEnvironment),
        _ if selected == 0 => Err(MigrationBlocker::NothingSelected),
        _ => Ok(()),
    }
}

/// An object listing request, tagged with the selection it was issued for.
#[derive(Clone, Debug)]
pub struct ListingTicket {
    generation: u64,
    source: ConnectionProfile,
}

impl ListingTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> &ConnectionProfile {
        &self.source
    }

    pub async fn fetch(self, backend: &dyn Backend) -> ListingReply {
        let result = backend.list_objects(&self.source).await;
        self.resolve(result)
    }

    pub fn resolve(self, result: Result<Vec<ObjectRef>>) -> ListingReply {
        ListingReply {
            generation: self.generation,
            source: self.source.id(),
            result,
        }
    }
}

#[derive(Debug)]
pub struct ListingReply {
    generation: u64,
    source: ProfileId,
    result: Result<Vec<ObjectRef>>,
}

impl ListingReply {
    pub fn source(&self) -> ProfileId {
        self.source
    }
}

/// Whether a listing reply was applied or discarded as superseded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    Stale,
}

/// A migration snapshot taken when the operator executed.
#[derive(Clone, Debug)]
pub struct MigrationJob {
    source: ConnectionProfile,
    target: ConnectionProfile,
    request: MigrationRequest,
}

impl MigrationJob {
    pub fn source(&self) -> &ConnectionProfile {
        &self.source
    }

    pub fn target(&self) -> &ConnectionProfile {
        &self.target
    }

    pub fn request(&self) -> &MigrationRequest {
        &self.request
    }

    pub async fn run(self, backend: &dyn Backend) -> MigrationReply {
        let result = backend
            .migrate_objects(&self.source, &self.target, &self.request.objects)
            .await;
        self.resolve(result)
    }

    pub fn resolve(self, result: Result<MigrationResponse>) -> MigrationReply {
        let objects = &self.request.objects;
        let outcome = match result {
            Ok(response) => MigrationOutcome::reconcile(
                objects,
                response.success,
                response.message,
                response.results,
            ),
            Err(err) => MigrationOutcome::unreachable(objects, err.to_string()),
        };
        MigrationReply {
            request: self.request,
            outcome,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MigrationReply {
    request: MigrationRequest,
    outcome: MigrationOutcome,
}

impl MigrationReply {
    pub fn request(&self) -> &MigrationRequest {
        &self.request
    }

    pub fn outcome(&self) -> &MigrationOutcome {
        &self.outcome
    }
}

/// Drives discovery, selection and execution of one migration workflow.
///
/// Profiles are referenced by id only and resolved through a
/// [`ProfileLookup`] each time they are needed, so a profile deleted from the
/// store can never reach the backend through a stale copy.
pub struct Orchestrator {
    session: Session,
    state: WorkflowState,
    source: Option<ProfileId>,
    target: Option<ProfileId>,
    objects: Vec<MigratableObject>,
    generation: u64,
    last_error: Option<String>,
    last_outcome: Option<MigrationOutcome>,
}

impl Orchestrator {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            state: WorkflowState::Idle,
            source: None,
            target: None,
            objects: Vec::new(),
            generation: 0,
            last_error: None,
            last_outcome: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn source(&self) -> Option<ProfileId> {
        self.source
    }

    pub fn target(&self) -> Option<ProfileId> {
        self.target
    }

    pub fn objects(&self) -> &[MigratableObject] {
        &self.objects
    }

    /// Failure message of the last object listing, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_outcome(&self) -> Option<&MigrationOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn selected(&self) -> Vec<ObjectRef> {
        self.objects
            .iter()
            .filter(|object| object.selected)
            .map(MigratableObject::to_ref)
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.objects.iter().filter(|object| object.selected).count()
    }

    /// Objects by type, every type present even when empty.
    pub fn grouped(&self) -> BTreeMap<ObjectType, Vec<&MigratableObject>> {
        ObjectType::ALL
            .into_iter()
            .map(|object_type| {
                let members = self
                    .objects
                    .iter()
                    .filter(|object| object.object_type == object_type)
                    .collect();
                (object_type, members)
            })
            .collect()
    }

    fn ensure(&self, operation: Operation) -> Result<()> {
        if self.state.allows(operation) {
            Ok(())
        } else {
            Err(ValidationError::NotAllowed {
                operation: operation.as_str(),
                state: self.state.as_str(),
            }
            .into())
        }
    }

    /// Chooses the source environment and starts a fresh listing for it.
    ///
    /// Any listing still outstanding is superseded. Choosing the current
    /// source again lists it again.
    pub fn select_source<L>(
        &mut self,
        id: Option<ProfileId>,
        profiles: &L,
    ) -> Result<Option<ListingTicket>>
    where
        L: ProfileLookup + ?Sized,
    {
        self.ensure(Operation::SelectSource)?;
        let Some(id) = id else {
            self.clear_source();
            self.state = WorkflowState::Idle;
            return Ok(None);
        };
        let source = profiles
            .resolve(id)
            .ok_or(ValidationError::UnknownProfile(id))?
            .clone();

        self.clear_source();
        self.source = Some(id);
        self.state = WorkflowState::Listing;
        info!(
            user = self.session.username(),
            source = %id,
            generation = self.generation,
            "listing objects"
        );
        Ok(Some(ListingTicket {
            generation: self.generation,
            source,
        }))
    }

    pub fn select_target<L>(&mut self, id: Option<ProfileId>, profiles: &L) -> Result<()>
    where
        L: ProfileLookup + ?Sized,
    {
        self.ensure(Operation::SelectTarget)?;
        if let Some(id) = id {
            if profiles.resolve(id).is_none() {
                return Err(ValidationError::UnknownProfile(id).into());
            }
        }
        self.target = id;
        Ok(())
    }

    fn clear_source(&mut self) {
        self.generation += 1;
        self.source = None;
        self.objects.clear();
        self.last_error = None;
    }

    pub fn apply_listing(&mut self, reply: ListingReply) -> Delivery {
        if !self.state.allows(Operation::ApplyListing)
            || reply.generation != self.generation
            || Some(reply.source) != self.source
        {
            debug!(
                source = %reply.source,
                generation = reply.generation,
                current = self.generation,
                "discarding stale object listing"
            );
            return Delivery::Stale;
        }

        match reply.result {
            Ok(listed) => {
                let mut seen = HashSet::with_capacity(listed.len());
                let mut objects: Vec<MigratableObject> = Vec::with_capacity(listed.len());
                for object in listed {
                    if !seen.insert((object.object_type, object.name.clone())) {
                        debug!(%object, "ignoring duplicate object");
                        continue;
                    }
                    objects.push(MigratableObject::unselected(object));
                }
                info!(source = %reply.source, count = objects.len(), "objects listed");
                self.objects = objects;
                self.last_error = None;
            }
            Err(err) => {
                warn!(source = %reply.source, "failed to list objects: {err}");
                self.objects.clear();
                self.last_error = Some(err.to_string());
            }
        }
        self.state = WorkflowState::Ready;
        Delivery::Applied
    }

    /// Flips one object and returns its new selection.
    pub fn toggle_object(&mut self, object_type: ObjectType, name: &str) -> Result<bool> {
        self.ensure(Operation::ToggleObject)?;
        let object = self
            .objects
            .iter_mut()
            .find(|object| object.is(object_type, name))
            .ok_or_else(|| ValidationError::UnknownObject {
                object_type,
                name: name.to_string(),
            })?;
        object.selected = !object.selected;
        Ok(object.selected)
    }

    /// Selects every object of the type, or deselects them all when every one
    /// is already selected. Returns the resulting selection.
    pub fn toggle_type(&mut self, object_type: ObjectType) -> Result<bool> {
        self.ensure(Operation::ToggleType)?;
        let all_selected = self
            .objects
            .iter()
            .filter(|object| object.object_type == object_type)
            .all(|object| object.selected);
        let selected = !all_selected;
        for object in self
            .objects
            .iter_mut()
            .filter(|object| object.object_type == object_type)
        {
            object.selected = selected;
        }
        Ok(selected)
    }

    pub fn migration_blocker(&self) -> Option<MigrationBlocker> {
        check_preconditions(self.source, self.target, self.selected_count()).err()
    }

    pub fn can_migrate(&self) -> bool {
        self.state.allows(Operation::Execute) && self.migration_blocker().is_none()
    }

    /// Snapshots the selection and moves to `Migrating`.
    ///
    /// Both profiles are resolved again here; one deleted since it was
    /// selected fails with [`ValidationError::UnknownProfile`].
    pub fn begin_migration<L>(&mut self, profiles: &L) -> Result<MigrationJob>
    where
        L: ProfileLookup + ?Sized,
    {
        self.ensure(Operation::Execute)?;
        check_preconditions(self.source, self.target, self.selected_count())
            .map_err(ValidationError::MigrationBlocked)?;
        let source_id = self
            .source
            .ok_or(ValidationError::MigrationBlocked(MigrationBlocker::SourceMissing))?;
        let target_id = self
            .target
            .ok_or(ValidationError::MigrationBlocked(MigrationBlocker::TargetMissing))?;
        let source = profiles
            .resolve(source_id)
            .ok_or(ValidationError::UnknownProfile(source_id))?
            .clone();
        let target = profiles
            .resolve(target_id)
            .ok_or(ValidationError::UnknownProfile(target_id))?
            .clone();

        let request = MigrationRequest {
            source: source_id,
            target: target_id,
            objects: self.selected(),
        };
        info!(
            user = self.session.username(),
            source = %source_id,
            target = %target_id,
            count = request.objects.len(),
            "starting migration"
        );
        self.state = WorkflowState::Migrating;
        Ok(MigrationJob {
            source,
            target,
            request,
        })
    }

    /// Records the outcome and returns to `Ready`, keeping objects and selection.
    pub fn finish_migration(&mut self, reply: MigrationReply) -> Result<&MigrationOutcome> {
        self.ensure(Operation::FinishMigration)?;
        let outcome = reply.outcome;
        if outcome.success {
            info!(message = %outcome.message, "migration finished");
        } else {
            warn!(
                message = %outcome.message,
                unknown = outcome.unknown_count(),
                "migration failed"
            );
        }
        self.state = if self.source.is_some() {
            WorkflowState::Ready
        } else {
            WorkflowState::Idle
        };
        Ok(self.last_outcome.insert(outcome))
    }

    /// Drops every reference to a profile that no longer exists.
    pub fn forget_profile(&mut self, id: ProfileId) {
        if self.source == Some(id) {
            info!(profile = %id, "source profile removed, clearing objects");
            self.clear_source();
            if self.state != WorkflowState::Migrating {
                self.state = WorkflowState::Idle;
            }
        }
        if self.target == Some(id) {
            info!(profile = %id, "target profile removed");
            self.target = None;
        }
    }

    pub fn sync_profiles<L>(&mut self, profiles: &L)
    where
        L: ProfileLookup + ?Sized,
    {
        for id in [self.source, self.target].into_iter().flatten() {
            if profiles.resolve(id).is_none() {
                self.forget_profile(id);
            }
        }
    }
}
