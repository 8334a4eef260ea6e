//! Harbor ChartMuseum adapters for discovery and chart download.

use std::time::Duration;

use anyhow::Result;
use chartlift_registry::{ChartRepoClient, DownloadError};
use chartlift_types::{ChartIdentity, RegistryEndpoint};

use crate::auth::RegistrySession;
use crate::discovery::ChartDiscovery;
use crate::transfer::ChartSource;

/// Discovery through Harbor's `/api/chartrepo` and `/api/v2.0/projects`.
#[derive(Debug, Clone)]
pub struct HarborDiscovery {
    client: ChartRepoClient,
}

impl HarborDiscovery {
    pub fn new(source: &RegistryEndpoint, timeout: Duration) -> Result<Self> {
        let client = ChartRepoClient::new(&source.http_base())?
            .with_timeout(timeout)?
            .with_basic_auth(&source.username, &source.password);
        Ok(Self { client })
    }
}

impl ChartDiscovery for HarborDiscovery {
    fn list_projects(&self) -> Result<Vec<String>> {
        self.client.list_projects()
    }

    fn list_charts(&self, project: &str) -> Result<Vec<ChartIdentity>> {
        let mut charts = Vec::new();
        for summary in self.client.list_charts(project)? {
            for version in self.client.list_chart_versions(project, &summary.name)? {
                charts.push(ChartIdentity::new(
                    summary.name.clone(),
                    project,
                    version.version,
                ));
            }
        }
        Ok(charts)
    }
}

/// Downloads archives from `{source}/chartrepo/{project}/charts/{file}`
/// with the source credentials attached to each request.
#[derive(Debug, Clone)]
pub struct HarborChartSource {
    client: ChartRepoClient,
}

impl HarborChartSource {
    pub fn new(source: &RegistryEndpoint, timeout: Duration) -> Result<Self> {
        let client = ChartRepoClient::new(&source.http_base())?
            .with_timeout(timeout)?
            .with_basic_auth(&source.username, &source.password);
        Ok(Self { client })
    }
}

impl ChartSource for HarborChartSource {
    fn fetch(
        &self,
        _session: &RegistrySession,
        chart: &ChartIdentity,
    ) -> std::result::Result<Vec<u8>, DownloadError> {
        self.client
            .download_chart(&chart.project, &chart.artifact_file_name())
    }
}
