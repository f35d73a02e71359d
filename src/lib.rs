//! Team Agenda - REST backend for a shared team calendar
//!
//! Users authenticate with a bearer JWT; their role's permission descriptor
//! decides what they may read, write or administer. Storage is MySQL in
//! production and an in-memory store for development and tests.

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod response;
pub mod security;
pub mod security_logger;
pub mod storage;

// Re-export main components
pub use config::ServerConfig;
pub use error::{AgendaError, Result};
pub use handlers::{routes, AppState, SharedState};
