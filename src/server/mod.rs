pub mod metrics;
mod requests_logging;
pub mod server;

pub use requests_logging::{log_requests, RequestsLoggingLevel};
pub use server::{format_uptime, make_app, run_server};
