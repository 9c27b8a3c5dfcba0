pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod service;

pub use connection::{connect_with_settings, DbPool};
pub use service::{DecisionService, RunSummary, ServiceError};
