//! # fibserv-server
//!
//! The thin HTTP boundary over the scheduling core: request parsing,
//! disconnect-triggered cancellation, the discovery page, and process
//! bootstrap (including the hidden worker mode that process-isolated
//! algorithms re-invoke).

pub mod app;
pub mod config;
pub mod routes;

pub use app::{serve, worker_main};
pub use config::{AppConfig, Mode};
pub use routes::router;
