use std::path::Path;

use serde_json::json;

use marginscout_core::engine::MIN_ORDERS_FOR_RUN;

use crate::commands::{build_runtime, load_config, load_orders, open_service, CommandResult};

pub fn run(merchant: &str, orders_path: &Path, window_days: Option<u32>) -> CommandResult {
    let config = match load_config("run") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("run") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let orders = load_orders(orders_path)?;
        let (pool, service) = open_service(&config).await?;

        let summary = service
            .run_decision_engine(merchant, &orders, window_days)
            .await
            .map_err(|error| ("engine_run", error.to_string(), 4u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(summary) => {
            let active: Vec<_> = summary
                .active
                .iter()
                .map(|decision| {
                    json!({
                        "id": decision.id,
                        "rule": decision.rule.as_str(),
                        "headline": decision.headline,
                        "action": decision.action,
                        "impact": decision.impact.to_string(),
                        "confidence": decision.confidence.as_str(),
                    })
                })
                .collect();
            let details = json!({
                "run_id": summary.run_id,
                "order_count": summary.order_count,
                "created": summary.created,
                "resurfaced_decision_id": summary.resurfaced_decision_id,
                "active": active,
            });
            let message = if summary.order_count < MIN_ORDERS_FOR_RUN {
                format!(
                    "not enough orders to analyze ({} of {MIN_ORDERS_FOR_RUN} required)",
                    summary.order_count
                )
            } else {
                format!("run complete: {} active decision(s)", active.len())
            };
            CommandResult::success_with("run", message, Some(details))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("run", error_class, message, exit_code)
        }
    }
}
