//! CLI command implementations
//!
//! Each command loads configuration, sets up tracing, loads the fixture into
//! an in-memory tenant and drives the report service on a tokio runtime.

use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;
use tracing::info;

use crate::config::EngineConfig;
use crate::observability::{init_tracing, Event};
use crate::query::ReportQuery;
use crate::report::{MaterializationState, MaterializationStatus};
use crate::service::ReportService;
use crate::tenant::Tenant;

use super::args::{Cli, Command, FixtureArgs};
use super::errors::{CliError, CliErrorCode, CliResult};
use super::io::{load_fixture, read_request, write_line, write_response};

const FIXTURE_TENANT: &str = "fixture";

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.log)?;
    info!(event = %Event::ConfigLoaded, path = ?cli.config);
    run_command(cli.command, config)
}

/// Defaults apply when no path is given.
pub fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command, config: EngineConfig) -> CliResult<()> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        match cmd {
            Command::Materialize { fixture, report } => materialize(&fixture, config, &report).await,
            Command::Query { fixture } => query(&fixture, config, read_request()?).await,
            Command::Count {
                fixture,
                report,
                owners,
            } => count(&fixture, config, &report, &owners).await,
            Command::Download { fixture } => download(&fixture, config, read_request()?).await,
        }
    })
}

async fn open_service(fixture: &FixtureArgs, config: EngineConfig) -> CliResult<ReportService> {
    let store = load_fixture(&fixture.fixture).await?;
    let tenant = Tenant::in_store(FIXTURE_TENANT, Arc::new(store), config);
    Ok(ReportService::new(tenant))
}

/// Runs a materialization and fails unless it reached a usable state.
async fn materialize_checked(service: &ReportService, report_id: &str) -> CliResult<MaterializationStatus> {
    let status = service.materialize_now(report_id).await?;
    if status.state == MaterializationState::Failed {
        return Err(CliError::new(
            CliErrorCode::EngineError,
            status.last_error.unwrap_or_else(|| "materialization failed".to_string()),
        ));
    }
    Ok(status)
}

/// Materialize one report and print its status
pub async fn materialize(fixture: &FixtureArgs, config: EngineConfig, report_id: &str) -> CliResult<()> {
    let service = open_service(fixture, config).await?;
    let status = materialize_checked(&service, report_id).await?;
    write_response(serde_json::to_value(status)?)
}

/// Materialize the queried report and print the requested page
pub async fn query(fixture: &FixtureArgs, config: EngineConfig, request: ReportQuery) -> CliResult<()> {
    let service = open_service(fixture, config).await?;
    materialize_checked(&service, &request.report_id).await?;
    let page = service.find_report_data(&request).await?;
    write_response(serde_json::to_value(page)?)
}

/// Materialize one report and print how many rows the owners see
pub async fn count(
    fixture: &FixtureArgs,
    config: EngineConfig,
    report_id: &str,
    owners: &[String],
) -> CliResult<()> {
    let service = open_service(fixture, config).await?;
    materialize_checked(&service, report_id).await?;
    let (field_infos, total) = service.find_count(report_id, owners).await?;
    write_response(json!({ "field_infos": field_infos, "total": total }))
}

/// Materialize the queried report and stream every row as a JSON line
///
/// The first line carries the field infos.
pub async fn download(fixture: &FixtureArgs, config: EngineConfig, request: ReportQuery) -> CliResult<()> {
    let service = open_service(fixture, config).await?;
    materialize_checked(&service, &request.report_id).await?;
    let mut download = service.download_report_data(&request).await?;

    write_line(&json!({ "field_infos": download.field_infos }))?;
    while let Some(batch) = download.rows.next().await {
        for row in batch? {
            write_line(&row)?;
        }
    }
    Ok(())
}
