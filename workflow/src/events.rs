use std::sync::Arc;

use async_channel::Sender;
use pamigrate_backend::Backend;
use pamigrate_core::Result;
use tokio::task::JoinHandle;

use crate::orchestrator::{
    Delivery, ListingReply, ListingTicket, MigrationJob, MigrationReply, Orchestrator,
};

pub enum WorkflowEvent {
    ObjectsListed(ListingReply),
    MigrationFinished(MigrationReply),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handled {
    Listing(Delivery),
    Migration,
}

/// Lists the ticket's source on the runtime and reports back on `event_tx`.
///
/// Superseded listings still complete; the orchestrator discards their reply.
pub fn spawn_listing(
    ticket: ListingTicket,
    backend: Arc<dyn Backend>,
    event_tx: Sender<WorkflowEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reply = ticket.fetch(backend.as_ref()).await;
        let _ = event_tx.send(WorkflowEvent::ObjectsListed(reply)).await;
    })
}

pub fn spawn_migration(
    job: MigrationJob,
    backend: Arc<dyn Backend>,
    event_tx: Sender<WorkflowEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reply = job.run(backend.as_ref()).await;
        let _ = event_tx.send(WorkflowEvent::MigrationFinished(reply)).await;
    })
}

impl Orchestrator {
    pub fn handle_event(&mut self, event: WorkflowEvent) -> Result<Handled> {
        match event {
            WorkflowEvent::ObjectsListed(reply) => Ok(Handled::Listing(self.apply_listing(reply))),
            WorkflowEvent::MigrationFinished(reply) => {
                self.finish_migration(reply)?;
                Ok(Handled::Migration)
            }
        }
    }
}
