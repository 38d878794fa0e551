//! Digest Worker Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod clients;
pub mod config;
pub mod decision;
pub mod health;
pub mod limiter;
pub mod lock;
pub mod model;
pub mod pipeline;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod sqlite_persistence;
pub mod store;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig};
pub use health::HealthState;
pub use lock::LockRegistry;
pub use model::{Category, ContentField, UserRecord, UserUpdate};
pub use pipeline::ContentPipeline;
pub use scheduler::{CycleContext, CycleScheduler};
pub use server::{run_server, RequestsLoggingLevel};
pub use store::{InMemoryUserStore, RestUserStore, SqliteUserStore, UserStore};
