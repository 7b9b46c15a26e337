use keyring::Entry;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("keychain access failed: {0}")]
pub struct SecretError(#[from] keyring::Error);

/// Remembers operator passwords for a backend in the OS keychain.
pub struct SecretStore {
    service_name: String,
}

impl SecretStore {
    pub fn new() -> Self {
        Self {
            service_name: "PaMigrate".into(),
        }
    }

    pub fn read_password(
        &self,
        backend_url: &str,
        username: &str,
    ) -> Result<Option<String>, SecretError> {
        let entry = self.entry(backend_url, username)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn write_password(
        &self,
        backend_url: &str,
        username: &str,
        password: &str,
    ) -> Result<(), SecretError> {
        let entry = self.entry(backend_url, username)?;
        entry.set_password(password)?;
        Ok(())
    }

    pub fn delete_password(&self, backend_url: &str, username: &str) -> Result<(), SecretError> {
        let entry = self.entry(backend_url, username)?;
        match entry.delete_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn entry(&self, backend_url: &str, username: &str) -> Result<Entry, SecretError> {
        let account = format!("{username}@{backend_url}");
        Ok(Entry::new(&self.service_name, &account)?)
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}
