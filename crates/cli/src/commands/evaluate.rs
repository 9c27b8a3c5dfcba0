use std::path::Path;

use serde_json::json;

use crate::commands::{build_runtime, load_config, load_orders, open_service, CommandResult};

pub fn run(merchant: &str, orders_path: &Path) -> CommandResult {
    let config = match load_config("evaluate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("evaluate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let orders = load_orders(orders_path)?;
        let (pool, service) = open_service(&config).await?;

        let evaluated = service
            .evaluate_outcomes(merchant, &orders)
            .await
            .map_err(|error| ("outcome_evaluation", error.to_string(), 4u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(evaluated)
    });

    match result {
        Ok(evaluated) => CommandResult::success_with(
            "evaluate",
            format!("{evaluated} outcome(s) evaluated"),
            Some(json!({ "evaluated": evaluated })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("evaluate", error_class, message, exit_code)
        }
    }
}
