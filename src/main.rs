use clap::Parser;
use expense_pipeline::args::{Args, Command};
use expense_pipeline::pipeline::Pipeline;
use expense_pipeline::{
    commands, error_type, pipeline_error, Config, ErrorType, IntoResult, Mode, Result,
};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            // Pipeline failures also go to stdout so that scripts see which stage failed.
            if let Some(failure) = pipeline_error(&e) {
                if let Ok(json) = serde_json::to_string_pretty(failure) {
                    println!("{json}");
                }
            }
            error_type(&e)
                .map(|t| t.exit_code())
                .unwrap_or(ExitCode::FAILURE)
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().expense_home().path();

    // When EXPENSE_IN_TEST_MODE is set and non-empty, every model call is answered by the
    // in-memory test model and no API key is needed.
    let mode = Mode::from_env();
    let today = chrono::Local::now().date_naive();

    let _: () = match args.command() {
        Command::Init(init_args) => {
            commands::init(home, init_args.provider(), init_args.model())
                .await?
                .print()
        }

        Command::Parse(parse_args) => {
            let config = load(home).await?;
            let pipeline = Pipeline::from_config(&config, mode).pub_result(ErrorType::Config)?;
            commands::parse(&config, &pipeline, parse_args, today)
                .await?
                .print()
        }

        Command::Receipt(receipt_args) => {
            let config = load(home).await?;
            let pipeline = Pipeline::from_config(&config, mode).pub_result(ErrorType::Config)?;
            commands::receipt(&config, &pipeline, receipt_args, today)
                .await?
                .print()
        }

        Command::Add(add_args) => {
            let config = load(home).await?;
            commands::add(&config, add_args, today).await?.print()
        }

        Command::Validate(validate_args) => {
            commands::validate(validate_args.file()).await?.print()
        }

        Command::List(list_args) => {
            let config = load(home).await?;
            commands::list(&config, list_args).await?.print()
        }

        Command::Delete(delete_args) => {
            let config = load(home).await?;
            commands::delete(&config, delete_args).await?.print()
        }

        Command::Totals(totals_args) => {
            let config = load(home).await?;
            commands::totals(&config, totals_args).await?.print()
        }

        Command::Check => {
            let config = load(home).await?;
            commands::check(&config, mode).await?.print()
        }

        Command::Schema => commands::schema()?.print(),
    };
    Ok(())
}

async fn load(home: &std::path::Path) -> Result<Config> {
    Config::load(home).await.pub_result(ErrorType::Config)
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                "expense_pipeline",
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
