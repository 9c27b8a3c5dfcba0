use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use serde_json::json;

use marginscout_core::domain::cost::{parse_cost_import, CostSource, VariantCost};

use crate::commands::{build_runtime, load_config, open_service, CommandResult};

pub fn run(merchant: &str, file: &Path, source: &str) -> CommandResult {
    let source = match CostSource::from_str(source) {
        Ok(source) => source,
        Err(error) => {
            return CommandResult::failure("import-costs", "cost_source", error, 6);
        }
    };
    let raw = match fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "import-costs",
                "costs_file",
                format!("could not read `{}`: {error}", file.display()),
                6,
            );
        }
    };

    let report = parse_cost_import(&raw);
    let now = Utc::now();
    let costs: Vec<VariantCost> = report
        .imported
        .iter()
        .map(|(variant_id, unit_cost)| VariantCost {
            variant_id: variant_id.clone(),
            unit_cost: *unit_cost,
            source,
            updated_at: now,
        })
        .collect();

    let config = match load_config("import-costs") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("import-costs") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let (pool, service) = open_service(&config).await?;
        let written = service
            .import_costs(merchant, costs)
            .await
            .map_err(|error| ("cost_import", error.to_string(), 4u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(written)
    });

    match result {
        Ok(written) => CommandResult::success_with(
            "import-costs",
            format!(
                "{} cost(s) written, {} line(s) skipped",
                written,
                report.skipped_lines.len()
            ),
            Some(json!({
                "parsed": report.imported.len(),
                "written": written,
                "skipped_lines": report.skipped_lines,
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("import-costs", error_class, message, exit_code)
        }
    }
}
