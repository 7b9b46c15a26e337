use pamigrate_backend::Backend;
use pamigrate_core::{Error, Result, ValidationError, session::Session};
use tracing::info;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

pub async fn login(backend: &dyn Backend, username: &str, password: &str) -> Result<Session> {
    let session = credentials(username, password)?;
    let reply = backend.login(session.username(), password).await?;
    if !reply.success {
        return Err(Error::rejected(reply.error, INVALID_CREDENTIALS));
    }
    info!(user = session.username(), "logged in");
    Ok(session)
}

/// Creates the account and opens a session for it.
pub async fn register(backend: &dyn Backend, username: &str, password: &str) -> Result<Session> {
    let session = credentials(username, password)?;
    let reply = backend.register(session.username(), password).await?;
    if !reply.success {
        return Err(Error::rejected(reply.error, "registration failed"));
    }
    info!(user = session.username(), "registered");
    Ok(session)
}

fn credentials(username: &str, password: &str) -> Result<Session> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField { field: "password" }.into());
    }
    Ok(Session::new(username)?)
}
