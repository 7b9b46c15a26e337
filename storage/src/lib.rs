pub mod auth;
pub mod profiles;
pub mod secrets;

pub use profiles::ProfileStore;
pub use secrets::{SecretError, SecretStore};
