pub mod config;
pub mod evaluate;
pub mod import_costs;
pub mod lifecycle;
pub mod list;
pub mod migrate;
pub mod run;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use marginscout_core::config::{AppConfig, LoadOptions};
use marginscout_core::domain::order::OrderRecord;
use marginscout_db::repositories::{
    SqlCostRepository, SqlDecisionRepository, SqlOutcomeRepository, SqlSettingsRepository,
};
use marginscout_db::{connect_with_settings, migrations, DbPool, DecisionService};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// (error_class, message, exit_code) for the async command bodies.
pub(crate) type CommandFailure = (&'static str, String, u8);

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

/// Connect, apply pending migrations, and wire the service over the
/// SQL repositories.
pub(crate) async fn open_service(
    config: &AppConfig,
) -> Result<(DbPool, DecisionService), CommandFailure> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), 5u8))?;

    let service = DecisionService::new(
        Arc::new(SqlDecisionRepository::new(pool.clone())),
        Arc::new(SqlOutcomeRepository::new(pool.clone())),
        Arc::new(SqlCostRepository::new(pool.clone())),
        Arc::new(SqlSettingsRepository::new(pool.clone())),
        config.engine.clone(),
    );
    Ok((pool, service))
}

/// Orders exports arrive either as a bare array or wrapped in an
/// `{"orders": [...]}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrdersFile {
    List(Vec<OrderRecord>),
    Wrapped { orders: Vec<OrderRecord> },
}

pub(crate) fn load_orders(path: &Path) -> Result<Vec<OrderRecord>, CommandFailure> {
    let raw = fs::read_to_string(path).map_err(|error| {
        ("orders_file", format!("could not read `{}`: {error}", path.display()), 6u8)
    })?;
    let parsed: OrdersFile = serde_json::from_str(&raw).map_err(|error| {
        ("orders_file", format!("could not parse `{}`: {error}", path.display()), 6u8)
    })?;
    Ok(match parsed {
        OrdersFile::List(orders) | OrdersFile::Wrapped { orders } => orders,
    })
}
