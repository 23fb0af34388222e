//! Persistence for the OAuth token between runs.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{ProvisionError, Result};
use crate::gcp::types::StoredToken;

pub trait CredentialStore {
    /// Returns the cached token, if any. An unreadable cache counts as empty.
    fn load(&self) -> Option<StoredToken>;
    fn save(&self, token: &StoredToken) -> Result<()>;
}

/// JSON token cache on disk (`token.json` by default).
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<StoredToken> {
        let text = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&text) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable token cache");
                None
            }
        }
    }

    fn save(&self, token: &StoredToken) -> Result<()> {
        let json = serde_json::to_string(token)
            .map_err(|e| ProvisionError::Credentials(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| {
            ProvisionError::Credentials(format!("cannot write {}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), "token cache written");
        Ok(())
    }
}

/// In-memory store, for tests and one-off runs.
#[derive(Default)]
pub struct MemoryCredentialStore {
    token: RefCell<Option<StoredToken>>,
    saves: RefCell<usize>,
}

impl MemoryCredentialStore {
    pub fn with_token(token: StoredToken) -> Self {
        Self {
            token: RefCell::new(Some(token)),
            saves: RefCell::new(0),
        }
    }

    pub fn saves(&self) -> usize {
        *self.saves.borrow()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<StoredToken> {
        self.token.borrow().clone()
    }

    fn save(&self, token: &StoredToken) -> Result<()> {
        *self.token.borrow_mut() = Some(token.clone());
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}
