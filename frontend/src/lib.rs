//! Client-side core of the personal finance tracker.
//!
//! [`FinanceTracker`] wires an [`ApiClient`] to the [`AuthState`] and
//! [`DataState`] that a view layer reads from. Aggregations for the dashboard
//! and statistics views live in the `shared` crate.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use services::api::ApiClient;
pub use services::credentials::{CredentialStore, MemoryCredentialStore};
pub use services::transport::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use state::{AuthState, DataSnapshot, DataState};
pub use tracker::FinanceTracker;

#[cfg(not(target_arch = "wasm32"))]
pub use services::credentials::FileCredentialStore;
#[cfg(not(target_arch = "wasm32"))]
pub use services::transport::TowerTransport;

#[cfg(target_arch = "wasm32")]
pub use services::credentials::LocalStorageCredentialStore;
#[cfg(target_arch = "wasm32")]
pub use services::transport::BrowserTransport;

/// Lock a state mutex. Critical sections never await, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
