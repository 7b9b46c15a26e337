pub mod error;
pub mod objects;
pub mod profiles;
pub mod session;

pub use error::{Error, MigrationBlocker, Result, ValidationError};
