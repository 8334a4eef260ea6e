use chartlift_config::MigrationConfig;
use chartlift_types::{ChartIdentity, MigrationOutcome, MigrationReport};
use chrono::Utc;
use serde::Serialize;

use crate::auth::{AuthError, Authenticator, authenticate};
use crate::discovery::{ChartDiscovery, DiscoveryError, discover};
use crate::report::write_report;
use crate::staging::StagingArea;
use crate::transfer::{ChartPusher, ChartSource, TransferContext, transfer};

pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);

    /// Called once per attempted chart, `index` counting from 1.
    fn chart_finished(&mut self, _index: usize, _total: usize, _chart: &ChartIdentity, _ok: bool) {
    }
}

/// The external systems a run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub authenticator: &'a dyn Authenticator,
    pub discovery: &'a dyn ChartDiscovery,
    pub source: &'a dyn ChartSource,
    pub pusher: &'a dyn ChartPusher,
}

/// Errors that abort a run before any chart is attempted.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid configuration: {0:#}")]
    InvalidConfig(anyhow::Error),
    #[error("failed to prepare staging directory: {0:#}")]
    Staging(anyhow::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// One entry of a dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChart {
    pub chart: ChartIdentity,
    pub destination_reference: String,
}

/// Validate the config and resolve the work list without touching the
/// destination.
pub fn plan_migration(
    config: &MigrationConfig,
    discovery: &dyn ChartDiscovery,
    reporter: &mut dyn Reporter,
) -> Result<Vec<PlannedChart>, RunError> {
    config.validate().map_err(RunError::InvalidConfig)?;

    let host = config.destination.host();
    let charts = discover(discovery, &config.projects, reporter)?;
    Ok(charts
        .into_iter()
        .map(|chart| PlannedChart {
            destination_reference: chart
                .destination_reference(host, &config.destination_path_suffix),
            chart,
        })
        .collect())
}

/// Authenticate, discover and transfer every chart version in order.
///
/// Chart failures are recorded in the returned report and never stop the
/// loop. Anything that goes wrong before the first transfer is a
/// [`RunError`].
pub fn run_migration(
    config: &MigrationConfig,
    collaborators: &Collaborators<'_>,
    reporter: &mut dyn Reporter,
) -> Result<MigrationReport, RunError> {
    let started_at = Utc::now();
    config.validate().map_err(RunError::InvalidConfig)?;

    reporter.info(&format!("logging in to source {}", config.source.base_url));
    let source = authenticate(collaborators.authenticator, &config.source)?;
    reporter.info(&format!(
        "logging in to destination {}",
        config.destination.base_url
    ));
    let destination = authenticate(collaborators.authenticator, &config.destination)?;

    let charts = discover(collaborators.discovery, &config.projects, reporter)?;
    reporter.info(&format!("{} Helm charts to migrate", charts.len()));

    let staging = match &config.staging_dir {
        Some(dir) => StagingArea::in_dir(dir),
        None => StagingArea::temporary(),
    }
    .map_err(RunError::Staging)?;
    reporter.info(&format!("staging archives in {}", staging.path().display()));

    let ctx = TransferContext {
        source: &source,
        destination: &destination,
        destination_path_suffix: &config.destination_path_suffix,
        fetcher: collaborators.source,
        pusher: collaborators.pusher,
        staging: &staging,
    };

    let mut outcome = MigrationOutcome::new();
    let total = charts.len();
    for (i, chart) in charts.iter().enumerate() {
        match transfer(chart, &ctx, reporter) {
            Ok(()) => {
                outcome.record_success();
                reporter.chart_finished(i + 1, total, chart, true);
            }
            Err(err) => {
                reporter.error(&format!("{chart}: {err}"));
                outcome.record_failure(err.into_failure());
                reporter.chart_finished(i + 1, total, chart, false);
            }
        }
    }

    let report = MigrationReport::new(
        &config.source,
        &config.destination,
        &config.destination_path_suffix,
        started_at,
        outcome,
    );

    if let Some(path) = &config.report_path {
        match write_report(path, &report) {
            Ok(()) => reporter.info(&format!("report written to {}", path.display())),
            Err(err) => reporter.warn(&format!("{err:#}")),
        }
    }

    Ok(report)
}
