//! # Credential storage
//!
//! The bearer token is the only piece of client state that outlives the
//! process. Absence of a stored token means "not logged in".

use std::sync::Mutex;

use crate::error::{ClientError, Result};
use crate::lock;

/// Persisted slot for the bearer token
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;

    fn store(&self, token: &str) -> Result<()>;

    /// Removing a token that is not there is not an error
    fn clear(&self) -> Result<()>;
}

/// Keeps the token for the lifetime of the process only
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(lock(&self.token).clone())
    }

    fn store(&self, token: &str) -> Result<()> {
        *lock(&self.token) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *lock(&self.token) = None;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use self::file::FileCredentialStore;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use super::*;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};
    use tracing::debug;

    /// Stores the token in a single file, written through a temp file
    #[derive(Debug, Clone)]
    pub struct FileCredentialStore {
        path: PathBuf,
    }

    impl FileCredentialStore {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    fn storage_error(action: &str, path: &Path, error: io::Error) -> ClientError {
        ClientError::Storage(format!("failed to {} {}: {}", action, path.display(), error))
    }

    impl CredentialStore for FileCredentialStore {
        fn load(&self) -> Result<Option<String>> {
            match fs::read_to_string(&self.path) {
                Ok(content) => {
                    let token = content.trim();
                    Ok((!token.is_empty()).then(|| token.to_string()))
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(storage_error("read", &self.path, e)),
            }
        }

        fn store(&self, token: &str) -> Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).map_err(|e| storage_error("create", parent, e))?;
            }

            let temp_path = self.path.with_extension("tmp");
            fs::write(&temp_path, token).map_err(|e| storage_error("write", &temp_path, e))?;
            fs::rename(&temp_path, &self.path).map_err(|e| storage_error("replace", &self.path, e))?;

            debug!("Stored credential at {}", self.path.display());
            Ok(())
        }

        fn clear(&self) -> Result<()> {
            match fs::remove_file(&self.path) {
                Ok(()) => {
                    debug!("Removed credential at {}", self.path.display());
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(storage_error("remove", &self.path, e)),
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use self::local_storage::LocalStorageCredentialStore;

#[cfg(target_arch = "wasm32")]
mod local_storage {
    use super::*;
    use gloo::storage::{LocalStorage, Storage};

    /// Browser local storage; the raw string is stored, not a JSON value
    #[derive(Debug, Clone)]
    pub struct LocalStorageCredentialStore {
        key: String,
    }

    impl LocalStorageCredentialStore {
        pub fn new(key: impl Into<String>) -> Self {
            Self { key: key.into() }
        }
    }

    impl Default for LocalStorageCredentialStore {
        fn default() -> Self {
            Self::new("token")
        }
    }

    impl CredentialStore for LocalStorageCredentialStore {
        fn load(&self) -> Result<Option<String>> {
            LocalStorage::raw()
                .get_item(&self.key)
                .map_err(|e| ClientError::Storage(format!("{:?}", e)))
        }

        fn store(&self, token: &str) -> Result<()> {
            LocalStorage::raw()
                .set_item(&self.key, token)
                .map_err(|e| ClientError::Storage(format!("{:?}", e)))
        }

        fn clear(&self) -> Result<()> {
            LocalStorage::raw()
                .remove_item(&self.key)
                .map_err(|e| ClientError::Storage(format!("{:?}", e)))
        }
    }
}
