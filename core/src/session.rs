use crate::error::ValidationError;

/// The authenticated operator on whose behalf profiles are read and written.
///
/// A session is created after a successful login or registration and handed
/// to the profile store and the migration workflow. Logging out drops it
/// together with everything constructed from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    username: String,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Result<Self, ValidationError> {
        let username = username.into().trim().to_string();
        if username.is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        Ok(Self { username })
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}
