use std::{path::Path, sync::Arc};

use anyhow::{Context as _, anyhow, bail};
use async_channel::Receiver;
use pamigrate_backend::{Backend, HttpBackend};
use pamigrate_core::{
    objects::{ObjectOutcome, ObjectType},
    profiles::{ConnectionProfile, ProfileDraft, ProfileId},
    session::Session,
};
use pamigrate_storage::{ProfileStore, SecretStore, auth};
use pamigrate_workflow::{
    ConnectionReport, ConnectionTester, Handled, Orchestrator, WorkflowEvent, spawn_listing,
    spawn_migration,
};
use tracing::{info, warn};

use crate::{
    Result,
    cli::{Cli, Command, FieldArgs, MigrateArgs, ProfilesCommand},
    config::{AppConfig, ConfigStore},
};

pub async fn dispatch(cli: Cli, config_dir: &Path) -> Result<()> {
    let config_store = ConfigStore::new(config_dir);
    let config = config_store.load()?;
    let backend_url = config.backend_url(cli.backend_url.as_deref()).to_string();
    let backend = HttpBackend::new(&backend_url, config.request_timeout(cli.timeout))?;
    info!(backend = backend.base_url(), "using backend");

    let mut app = App {
        backend: Arc::new(backend),
        backend_url,
        config,
        config_store,
        secrets: SecretStore::new(),
        user: cli.user,
        password: cli.password,
    };
    match cli.command {
        Command::Login { remember } => app.login(false, remember).await,
        Command::Register { remember } => app.login(true, remember).await,
        Command::Logout => app.logout(),
        Command::Profiles(command) => app.profiles(command).await,
        Command::Test { profile, fields } => app.test(profile.as_deref(), &fields).await,
        Command::Objects { source } => app.objects(&source).await,
        Command::Migrate(args) => app.migrate(args).await,
    }
}

struct App {
    backend: Arc<dyn Backend>,
    backend_url: String,
    config: AppConfig,
    config_store: ConfigStore,
    secrets: SecretStore,
    user: Option<String>,
    password: Option<String>,
}

impl App {
    fn username(&self) -> Result<String> {
        self.user
            .clone()
            .or_else(|| self.config.username.clone())
            .context("No operator known; pass --user or run `pamigrate login`")
    }

    fn password(&self, username: &str) -> Result<String> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        let remembered = self
            .secrets
            .read_password(&self.backend_url, username)
            .unwrap_or_else(|err| {
                warn!("{err}");
                None
            });
        remembered.with_context(|| {
            format!("No password for {username}; pass --password or log in with --remember")
        })
    }

    async fn session(&self) -> Result<Session> {
        let username = self.username()?;
        let password = self.password(&username)?;
        let session = auth::login(self.backend.as_ref(), &username, &password).await?;
        Ok(session)
    }

    async fn store(&self) -> Result<ProfileStore> {
        let mut store = ProfileStore::new(self.backend.clone(), self.session().await?);
        store.list().await.context("Failed to load profiles")?;
        Ok(store)
    }

    async fn login(&mut self, register: bool, remember: bool) -> Result<()> {
        let username = self.username()?;
        let password = self.password(&username)?;
        let session = if register {
            auth::register(self.backend.as_ref(), &username, &password).await?
        } else {
            auth::login(self.backend.as_ref(), &username, &password).await?
        };
        if remember {
            self.secrets
                .write_password(&self.backend_url, session.username(), &password)?;
        }
        self.config.username = Some(session.username().to_string());
        self.config_store.save(&self.config)?;
        println!("Logged in as {}", session.username());
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        let Some(username) = self.config.username.take() else {
            println!("Not logged in");
            return Ok(());
        };
        if let Err(err) = self.secrets.delete_password(&self.backend_url, &username) {
            warn!("{err}");
        }
        self.config_store.save(&self.config)?;
        println!("Logged out {username}");
        Ok(())
    }

    async fn profiles(&self, command: ProfilesCommand) -> Result<()> {
        let mut store = self.store().await?;
        match command {
            ProfilesCommand::List => {
                if store.profiles().is_empty() {
                    println!("No profiles");
                }
                for profile in store.profiles() {
                    print_profile(profile);
                }
            }
            ProfilesCommand::Add { fields } => {
                let created = store.create(&fields.to_bag()).await?;
                print_profile(&created);
            }
            ProfilesCommand::Update { profile, fields } => {
                let existing = find_profile(store.profiles(), &profile)?;
                let id = existing.id();
                let mut bag = existing.draft().to_fields();
                fields.apply_to(&mut bag);
                let updated = store.update(id, &bag).await?;
                print_profile(&updated);
            }
            ProfilesCommand::Remove { profile } => {
                let id = find_profile(store.profiles(), &profile)?.id();
                store.delete(id).await?;
                println!("Removed {id}");
            }
        }
        Ok(())
    }

    async fn test(&self, profile: Option<&str>, fields: &FieldArgs) -> Result<()> {
        let tester = ConnectionTester::new(self.backend.clone());
        let report = match profile {
            Some(profile) => {
                let store = self.store().await?;
                let existing = find_profile(store.profiles(), profile)?;
                let mut bag = existing.draft().to_fields();
                fields.apply_to(&mut bag);
                let draft = ProfileDraft::from_fields(existing.kind(), &bag)?;
                tester.test_draft(&draft).await?
            }
            None if fields.is_empty() => bail!("Name a profile or pass its fields with --set"),
            None => tester.test(&fields.to_bag()).await?,
        };
        let ConnectionReport { reachable, detail } = report;
        if !reachable {
            bail!("Connection failed: {detail}");
        }
        println!("Connection OK: {detail}");
        Ok(())
    }

    async fn objects(&self, source: &str) -> Result<()> {
        let store = self.store().await?;
        let source = find_profile(store.profiles(), source)?.id();
        let mut workflow = Orchestrator::new(store.session().clone());
        let (event_tx, event_rx) = async_channel::unbounded();

        if let Some(ticket) = workflow.select_source(Some(source), &store)? {
            spawn_listing(ticket, self.backend.clone(), event_tx);
        }
        next_event(&mut workflow, &event_rx).await?;
        if let Some(error) = workflow.last_error() {
            bail!("Failed to list objects: {error}");
        }
        for (object_type, objects) in workflow.grouped() {
            println!("{} ({})", object_type.label(), objects.len());
            for object in objects {
                println!("  {}", object.name);
            }
        }
        Ok(())
    }

    async fn migrate(&self, args: MigrateArgs) -> Result<()> {
        let store = self.store().await?;
        let source = find_profile(store.profiles(), &args.source)?.id();
        let target = find_profile(store.profiles(), &args.target)?.id();
        let mut workflow = Orchestrator::new(store.session().clone());
        let (event_tx, event_rx) = async_channel::unbounded();

        if let Some(ticket) = workflow.select_source(Some(source), &store)? {
            spawn_listing(ticket, self.backend.clone(), event_tx.clone());
        }
        next_event(&mut workflow, &event_rx).await?;
        if let Some(error) = workflow.last_error() {
            bail!("Failed to list objects: {error}");
        }
        workflow.select_target(Some(target), &store)?;
        for object_type in &args.all {
            select_type(&mut workflow, *object_type)?;
        }
        for object in &args.objects {
            let selected = workflow
                .objects()
                .iter()
                .any(|known| known.selected && known.is(object.object_type, &object.name));
            if !selected {
                workflow.toggle_object(object.object_type, &object.name)?;
            }
        }

        let job = workflow.begin_migration(&store)?;
        println!(
            "Migrating {} objects from {} to {}",
            job.request().objects.len(),
            job.source().name(),
            job.target().name()
        );
        spawn_migration(job, self.backend.clone(), event_tx);
        next_event(&mut workflow, &event_rx).await?;

        let outcome = workflow
            .last_outcome()
            .ok_or_else(|| anyhow!("Migration finished without an outcome"))?;
        for result in &outcome.results {
            println!("{}", outcome_line(result));
        }
        if !outcome.success {
            bail!("Migration failed: {}", outcome.message);
        }
        let unconfirmed = outcome
            .results
            .iter()
            .filter(|result| !result.status.is_success())
            .count();
        if unconfirmed > 0 {
            warn!(unconfirmed, "backend reported success without confirming every object");
        }
        println!("{}", outcome.message);
        Ok(())
    }
}

async fn next_event(
    workflow: &mut Orchestrator,
    event_rx: &Receiver<WorkflowEvent>,
) -> Result<Handled> {
    let event = event_rx
        .recv()
        .await
        .context("Workflow task ended without reporting")?;
    Ok(workflow.handle_event(event)?)
}

/// Selects every object of the type, whatever was selected before.
fn select_type(workflow: &mut Orchestrator, object_type: ObjectType) -> Result<()> {
    if !workflow.toggle_type(object_type)? {
        workflow.toggle_type(object_type)?;
    }
    Ok(())
}

/// Looks a profile up by id, then by exact name.
fn find_profile<'a>(
    profiles: &'a [ConnectionProfile],
    key: &str,
) -> Result<&'a ConnectionProfile> {
    if let Ok(id) = ProfileId::parse_str(key) {
        if let Some(profile) = profiles.iter().find(|profile| profile.id() == id) {
            return Ok(profile);
        }
    }
    let mut matches = profiles.iter().filter(|profile| profile.name() == key);
    match (matches.next(), matches.next()) {
        (Some(profile), None) => Ok(profile),
        (Some(_), Some(_)) => bail!("Several profiles are named `{key}`; use the id"),
        (None, _) => bail!("No profile `{key}`"),
    }
}

/// One result row, failures and unconfirmed objects marked for scanning.
fn outcome_line(result: &ObjectOutcome) -> String {
    let mark = if result.status.is_success() { "ok" } else { "FAILED" };
    format!("  {mark:<6} {:<40} {}", result.object.to_string(), result.status)
}

fn print_profile(profile: &ConnectionProfile) {
    println!(
        "{}  {:<5}  {:<24}  {}",
        profile.id(),
        profile.kind(),
        profile.name(),
        profile.endpoint()
    );
}
