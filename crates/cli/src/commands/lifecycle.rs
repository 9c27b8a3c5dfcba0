use serde_json::json;

use marginscout_db::ServiceError;

use crate::commands::{build_runtime, load_config, open_service, CommandResult};

pub fn done(decision_id: &str) -> CommandResult {
    transition("done", decision_id)
}

pub fn ignore(decision_id: &str) -> CommandResult {
    transition("ignore", decision_id)
}

fn transition(command: &'static str, decision_id: &str) -> CommandResult {
    let config = match load_config(command) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime(command) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let (pool, service) = open_service(&config).await?;
        let outcome = match command {
            "done" => service.mark_done(decision_id).await,
            _ => service.mark_ignored(decision_id).await,
        };
        let decision = outcome.map_err(map_service_error)?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(decision)
    });

    match result {
        Ok(decision) => CommandResult::success_with(
            command,
            format!("decision {} marked {}", decision.id, decision.status.as_str()),
            Some(json!({
                "id": decision.id,
                "status": decision.status.as_str(),
                "rule": decision.rule.as_str(),
                "headline": decision.headline,
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}

fn map_service_error(error: ServiceError) -> (&'static str, String, u8) {
    match error {
        ServiceError::DecisionNotFound(id) => {
            ("decision_not_found", format!("no decision with id `{id}`"), 7)
        }
        ServiceError::Domain(error) => ("decision_state", error.to_string(), 7),
        ServiceError::Repository(error) => ("db_query", error.to_string(), 4),
    }
}
