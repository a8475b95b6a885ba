use crate::infra::load_service;
use clap::Args;
use hortensia::config::AppConfig;
use hortensia::error::AppError;
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct DecideArgs {
    /// JSON file holding one request body, as sent to `/predecir/`
    #[arg(long)]
    pub(crate) request: PathBuf,
    /// Underwriting configuration file (defaults to HORTENSIA_CONFIG)
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Keep the full counter-offer on declined applications
    #[arg(long)]
    pub(crate) detailed: bool,
}

pub(crate) fn run_decide(args: DecideArgs) -> Result<(), AppError> {
    let config_path = match args.config {
        Some(path) => path,
        None => AppConfig::load()?.underwriting_path,
    };
    let service = load_service(&config_path)?;

    let raw = std::fs::read_to_string(&args.request)?;
    let payload: Value = serde_json::from_str(&raw)?;
    let decision = service.decide_and_predict(&payload)?;

    let response = if args.detailed {
        decision.to_detailed_response()
    } else {
        decision.to_response()
    };
    let rendered = serde_json::to_string_pretty(&json!({ "resultado": response }))?;

    println!("{rendered}");
    println!();
    println!("Engine: {} ({})", decision.engine, decision.summary());
    Ok(())
}
