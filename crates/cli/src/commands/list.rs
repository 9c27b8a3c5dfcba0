use serde_json::json;

use crate::commands::{build_runtime, load_config, open_service, CommandResult};

pub fn run(merchant: &str) -> CommandResult {
    let config = match load_config("list") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("list") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let (pool, service) = open_service(&config).await?;
        let active = service
            .list_active(merchant)
            .await
            .map_err(|error| ("db_query", error.to_string(), 4u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(active)
    });

    match result {
        Ok(active) => {
            let decisions: Vec<_> = active
                .iter()
                .map(|decision| {
                    json!({
                        "id": decision.id,
                        "rule": decision.rule.as_str(),
                        "headline": decision.headline,
                        "action": decision.action,
                        "reason": decision.reason,
                        "impact": decision.impact.to_string(),
                        "confidence": decision.confidence.as_str(),
                        "context": decision.context,
                        "created_at": decision.created_at.to_rfc3339(),
                    })
                })
                .collect();
            CommandResult::success_with(
                "list",
                format!("{} active decision(s)", decisions.len()),
                Some(json!({ "active": decisions })),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("list", error_class, message, exit_code)
        }
    }
}
