pub mod events;
pub mod orchestrator;
pub mod tester;

pub use events::{Handled, WorkflowEvent, spawn_listing, spawn_migration};
pub use orchestrator::{
    Delivery, ListingReply, ListingTicket, MigrationJob, MigrationReply, Operation, Orchestrator,
    WorkflowState, check_preconditions,
};
pub use tester::{ConnectionReport, ConnectionTester};
