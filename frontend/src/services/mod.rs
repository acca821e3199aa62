pub mod api;
pub mod credentials;
pub mod logging;
pub mod transport;
