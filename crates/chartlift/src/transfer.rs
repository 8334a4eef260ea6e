use std::path::Path;

use chartlift_registry::DownloadError;
use chartlift_types::{ChartFailure, ChartIdentity, FailureStage};

use crate::auth::RegistrySession;
use crate::engine::Reporter;
use crate::staging::StagingArea;

/// Downloads chart archives from the source registry.
pub trait ChartSource {
    fn fetch(
        &self,
        session: &RegistrySession,
        chart: &ChartIdentity,
    ) -> Result<Vec<u8>, DownloadError>;
}

/// Uploads a staged archive to an OCI reference on the destination.
pub trait ChartPusher {
    fn push(
        &self,
        destination: &RegistrySession,
        artifact: &Path,
        reference: &str,
    ) -> anyhow::Result<()>;
}

/// Why a single chart could not be migrated. Never aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("fetch failed: received status {status}")]
    FetchStatus { chart: ChartIdentity, status: u16 },
    #[error("fetch failed: {cause}")]
    Fetch { chart: ChartIdentity, cause: String },
    #[error("could not stage archive: {cause}")]
    Persist { chart: ChartIdentity, cause: String },
    #[error("push to {reference} failed: {cause}")]
    Push {
        chart: ChartIdentity,
        reference: String,
        cause: String,
    },
}

impl TransferError {
    pub fn chart(&self) -> &ChartIdentity {
        match self {
            TransferError::FetchStatus { chart, .. }
            | TransferError::Fetch { chart, .. }
            | TransferError::Persist { chart, .. }
            | TransferError::Push { chart, .. } => chart,
        }
    }

    pub fn stage(&self) -> FailureStage {
        match self {
            TransferError::FetchStatus { .. } | TransferError::Fetch { .. } => FailureStage::Fetch,
            TransferError::Persist { .. } => FailureStage::Persist,
            TransferError::Push { .. } => FailureStage::Push,
        }
    }

    pub fn into_failure(self) -> ChartFailure {
        let stage = self.stage();
        let message = self.to_string();
        let chart = match self {
            TransferError::FetchStatus { chart, .. }
            | TransferError::Fetch { chart, .. }
            | TransferError::Persist { chart, .. }
            | TransferError::Push { chart, .. } => chart,
        };
        ChartFailure {
            chart,
            stage,
            message,
        }
    }
}

/// Everything a transfer needs that stays fixed for the whole run.
pub struct TransferContext<'a> {
    pub source: &'a RegistrySession,
    pub destination: &'a RegistrySession,
    pub destination_path_suffix: &'a str,
    pub fetcher: &'a dyn ChartSource,
    pub pusher: &'a dyn ChartPusher,
    pub staging: &'a StagingArea,
}

/// Move one chart version: fetch, stage, push, then clean up.
///
/// Cleanup runs exactly once whatever happened before it. A cleanup failure
/// is reported as a warning and does not change the result. An artifact name
/// that would land outside the staging directory fails before any download.
pub fn transfer(
    chart: &ChartIdentity,
    ctx: &TransferContext<'_>,
    reporter: &mut dyn Reporter,
) -> Result<(), TransferError> {
    let staged = ctx
        .staging
        .staged_path(chart)
        .map_err(|err| TransferError::Persist {
            chart: chart.clone(),
            cause: err.to_string(),
        })?;
    let result = fetch_and_push(chart, ctx, &staged);

    if let Err(err) = ctx.staging.remove_if_present(&staged) {
        reporter.warn(&format!(
            "{chart}: failed to remove staged file {}: {err}",
            staged.display()
        ));
    }

    result
}

fn fetch_and_push(
    chart: &ChartIdentity,
    ctx: &TransferContext<'_>,
    staged: &Path,
) -> Result<(), TransferError> {
    let bytes = ctx
        .fetcher
        .fetch(ctx.source, chart)
        .map_err(|err| match err {
            DownloadError::UnexpectedStatus(status) => TransferError::FetchStatus {
                chart: chart.clone(),
                status,
            },
            DownloadError::Transport(cause) => TransferError::Fetch {
                chart: chart.clone(),
                cause,
            },
        })?;

    let path = ctx
        .staging
        .persist(chart, &bytes)
        .map_err(|err| TransferError::Persist {
            chart: chart.clone(),
            cause: format!("{}: {err}", staged.display()),
        })?;

    let reference = chart.destination_reference(
        ctx.destination.endpoint().host(),
        ctx.destination_path_suffix,
    );
    ctx.pusher
        .push(ctx.destination, &path, &reference)
        .map_err(|err| TransferError::Push {
            chart: chart.clone(),
            cause: format!("{err:#}"),
            reference,
        })
}
