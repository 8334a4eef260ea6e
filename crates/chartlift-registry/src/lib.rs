//! Harbor ChartMuseum API client for chartlift.
//!
//! This crate talks to the legacy chart repository endpoints of a Harbor
//! instance: listing projects, listing the charts and versions of a project,
//! and downloading chart archives.
//!
//! # Example
//!
//! ```no_run
//! use chartlift_registry::ChartRepoClient;
//!
//! let client = ChartRepoClient::new("https://harbor.example.com")
//!     .expect("client")
//!     .with_basic_auth("admin", "secret");
//!
//! for chart in client.list_charts("library").unwrap_or_default() {
//!     println!("{}", chart.name);
//! }
//! ```

use std::error::Error as StdError;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

/// Default timeout for API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Page size used when listing projects
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Default user agent for API requests
pub const USER_AGENT: &str = concat!("chartlift/", env!("CARGO_PKG_VERSION"));

/// Failure to download a chart archive.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The server answered with something other than `200 OK`.
    #[error("received status {0}")]
    UnexpectedStatus(u16),
    /// The request never produced a usable response.
    #[error("{0}")]
    Transport(String),
}

/// Harbor chart repository client
#[derive(Debug, Clone)]
pub struct ChartRepoClient {
    base_url: String,
    credentials: Option<(String, String)>,
    page_size: usize,
    client: Client,
}

impl ChartRepoClient {
    /// Create a new client for the given base URL (scheme included).
    pub fn new(base_url: &str) -> Result<Self> {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            page_size: DEFAULT_PAGE_SIZE,
            client: build_client(timeout)?,
        })
    }

    /// Attach basic-auth credentials to every request. An empty username
    /// leaves the client anonymous.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.credentials = if username.is_empty() {
            None
        } else {
            Some((username.to_string(), password.to_string()))
        };
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Set the page size used for paginated listings
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.credentials {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    /// List every project name visible to the client, following pagination
    /// until a short page is returned.
    pub fn list_projects(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut previous: Option<Vec<String>> = None;

        for page in 1.. {
            let url = format!(
                "{}/api/v2.0/projects?page={}&page_size={}",
                self.base_url, page, self.page_size
            );
            let response = self
                .get(&url)
                .send()
                .context("failed to send project listing request")?;

            if response.status() != StatusCode::OK {
                bail!(
                    "unexpected status while listing projects: {}",
                    response.status()
                );
            }

            let projects: Vec<Project> = response
                .json()
                .context("failed to parse project listing")?;
            let page_names: Vec<String> = projects.into_iter().map(|p| p.name).collect();

            // Servers that ignore `page` would otherwise loop forever.
            if previous.as_ref() == Some(&page_names) {
                break;
            }

            let short = page_names.len() < self.page_size;
            names.extend(page_names.iter().cloned());
            if short {
                break;
            }
            previous = Some(page_names);
        }

        Ok(names)
    }

    /// List the charts stored in a project's chart repository
    pub fn list_charts(&self, project: &str) -> Result<Vec<ChartSummary>> {
        let url = format!("{}/api/chartrepo/{}/charts", self.base_url, project);
        let response = self
            .get(&url)
            .send()
            .with_context(|| format!("failed to list charts of project {project}"))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .with_context(|| format!("failed to parse chart listing of project {project}")),
            status => bail!("unexpected status while listing charts of project {project}: {status}"),
        }
    }

    /// List every version of one chart
    pub fn list_chart_versions(&self, project: &str, chart: &str) -> Result<Vec<ChartVersion>> {
        let url = format!("{}/api/chartrepo/{}/charts/{}", self.base_url, project, chart);
        let response = self
            .get(&url)
            .send()
            .with_context(|| format!("failed to list versions of chart {project}/{chart}"))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .with_context(|| format!("failed to parse versions of chart {project}/{chart}")),
            status => {
                bail!("unexpected status while listing versions of chart {project}/{chart}: {status}")
            }
        }
    }

    /// URL a chart archive is downloaded from
    pub fn chart_download_url(&self, project: &str, file_name: &str) -> String {
        format!("{}/chartrepo/{}/charts/{}", self.base_url, project, file_name)
    }

    /// Download a chart archive
    pub fn download_chart(
        &self,
        project: &str,
        file_name: &str,
    ) -> std::result::Result<Vec<u8>, DownloadError> {
        let url = self.chart_download_url(project, file_name);
        let response = self
            .get(&url)
            .send()
            .map_err(|err| DownloadError::Transport(error_chain(&err)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DownloadError::UnexpectedStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .map_err(|err| DownloadError::Transport(error_chain(&err)))?;
        Ok(body.to_vec())
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")
}

/// `outer: inner: root` rendering of an error and its sources.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Project entry from `/api/v2.0/projects`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub project_id: Option<u64>,
}

/// Chart entry from `/api/chartrepo/{project}/charts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSummary {
    pub name: String,
    #[serde(default)]
    pub total_versions: Option<u64>,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
}

/// Version entry from `/api/chartrepo/{project}/charts/{chart}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}
