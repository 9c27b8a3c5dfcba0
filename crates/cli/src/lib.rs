pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "marginscout",
    about = "Marginscout operator CLI",
    long_about = "Run the profit decision engine over order exports, walk the decision \
                  lifecycle, grade outcomes, and manage variant costs.",
    after_help = "Examples:\n  marginscout migrate\n  marginscout run --merchant shop-1 --orders orders.json\n  marginscout done 4f7c…\n  marginscout import-costs --merchant shop-1 --file costs.csv"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Run the decision engine over an orders JSON export")]
    Run {
        #[arg(long, help = "Merchant identifier")]
        merchant: String,
        #[arg(long, help = "Path to the orders JSON export")]
        orders: PathBuf,
        #[arg(long, help = "Analysis window in days (defaults to the configured window)")]
        window_days: Option<u32>,
    },
    #[command(about = "Grade due decision outcomes against fresh orders")]
    Evaluate {
        #[arg(long, help = "Merchant identifier")]
        merchant: String,
        #[arg(long, help = "Path to the orders JSON export")]
        orders: PathBuf,
    },
    #[command(about = "Mark an active decision done and start its outcome window")]
    Done {
        #[arg(help = "Decision id")]
        decision_id: String,
    },
    #[command(about = "Mark an active decision ignored")]
    Ignore {
        #[arg(help = "Decision id")]
        decision_id: String,
    },
    #[command(about = "Bulk-import variant costs from a delimited text file")]
    ImportCosts {
        #[arg(long, help = "Merchant identifier")]
        merchant: String,
        #[arg(long, help = "Path to a variant_id,unit_cost file")]
        file: PathBuf,
        #[arg(long, default_value = "imported", help = "Cost source: manual, imported or platform")]
        source: String,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "List active decisions for a merchant")]
    List {
        #[arg(long, help = "Merchant identifier")]
        merchant: String,
    },
}

pub fn run() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Run { merchant, orders, window_days } => {
            commands::run::run(&merchant, &orders, window_days)
        }
        Command::Evaluate { merchant, orders } => commands::evaluate::run(&merchant, &orders),
        Command::Done { decision_id } => commands::lifecycle::done(&decision_id),
        Command::Ignore { decision_id } => commands::lifecycle::ignore(&decision_id),
        Command::ImportCosts { merchant, file, source } => {
            commands::import_costs::run(&merchant, &file, &source)
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::List { merchant } => commands::list::run(&merchant),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Diagnostics go to stderr so stdout stays machine-readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
