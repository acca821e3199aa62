pub mod auth;
pub mod data;

pub use auth::AuthState;
pub use data::{DataSnapshot, DataState};
