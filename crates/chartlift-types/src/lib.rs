//! Core types for chartlift.
//!
//! Every other chartlift crate speaks in these types: the chart being moved,
//! the registry endpoints on either side, and the aggregate outcome of a run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extension of the chart archives served by ChartMuseum.
pub const CHART_ARCHIVE_EXTENSION: &str = "tgz";

/// Current report schema version
pub const CURRENT_REPORT_VERSION: &str = "chartlift.report.v1";

/// One chart version to migrate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartIdentity {
    pub name: String,
    pub project: String,
    pub version: String,
}

impl ChartIdentity {
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            version: version.into(),
        }
    }

    /// `true` when name, project and version are all non-empty.
    pub fn is_resolved(&self) -> bool {
        !self.name.is_empty() && !self.project.is_empty() && !self.version.is_empty()
    }

    /// `true` when name and version contain no path separators and no `..`,
    /// so the archive file name is a single path component.
    pub fn has_plain_artifact_name(&self) -> bool {
        [&self.name, &self.version]
            .iter()
            .all(|part| !part.contains(['/', '\\']) && !part.contains(".."))
    }

    /// Archive file name, e.g. `redis-1.0.0.tgz`.
    ///
    /// Depends only on `name` and `version`; the same name is used for the
    /// source download path and for the staged file handed to the pusher.
    pub fn artifact_file_name(&self) -> String {
        format!("{}-{}.{}", self.name, self.version, CHART_ARCHIVE_EXTENSION)
    }

    /// OCI reference the chart is pushed to: `oci://{host}/{project}{suffix}`.
    pub fn destination_reference(&self, destination_host: &str, path_suffix: &str) -> String {
        format!("oci://{}/{}{}", destination_host, self.project, path_suffix)
    }
}

impl fmt::Display for ChartIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.project, self.name, self.version)
    }
}

/// Base URL plus credentials for one side of the migration.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEndpoint {
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl RegistryEndpoint {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Endpoint without credentials.
    pub fn anonymous(base_url: impl Into<String>) -> Self {
        Self::new(base_url, "", "")
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }

    /// Base URL for HTTP calls. `https://` is assumed when no scheme is given.
    pub fn http_base(&self) -> String {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        }
    }

    /// Registry host (and optional path) without scheme, as used in `oci://`
    /// references and `helm registry login`.
    pub fn host(&self) -> &str {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .or_else(|| trimmed.strip_prefix("oci://"))
            .unwrap_or(trimmed)
    }
}

impl fmt::Debug for RegistryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEndpoint")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field(
                "password",
                &if self.password.is_empty() { "" } else { "<redacted>" },
            )
            .finish()
    }
}

/// Step of a chart transfer that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Persist,
    Push,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Fetch => "fetch",
            FailureStage::Persist => "persist",
            FailureStage::Push => "push",
        };
        f.write_str(s)
    }
}

/// Diagnostic record for a chart that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartFailure {
    pub chart: ChartIdentity,
    pub stage: FailureStage,
    pub message: String,
}

impl fmt::Display for ChartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.chart,
            self.chart.artifact_file_name(),
            self.message
        )
    }
}

/// Running tally of a migration run.
///
/// `total` only grows through [`MigrationOutcome::record_success`] and
/// [`MigrationOutcome::record_failure`], so `succeeded + failed == total`
/// holds at every point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failures in the order the charts were attempted.
    pub failures: Vec<ChartFailure>,
}

impl MigrationOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, failure: ChartFailure) {
        self.total += 1;
        self.failed += 1;
        self.failures.push(failure);
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// `migrated 1/2 Helm charts (1 failed)`
    pub fn summary_line(&self) -> String {
        format!(
            "migrated {}/{} Helm charts ({} failed)",
            self.succeeded, self.total, self.failed
        )
    }
}

/// Receipt written at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub report_version: String,
    /// Source base URL. Credentials are never written.
    pub source: String,
    pub destination: String,
    pub destination_path_suffix: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub outcome: MigrationOutcome,
}

impl MigrationReport {
    pub fn new(
        source: &RegistryEndpoint,
        destination: &RegistryEndpoint,
        destination_path_suffix: &str,
        started_at: DateTime<Utc>,
        outcome: MigrationOutcome,
    ) -> Self {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at)
            .to_std()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self {
            report_version: CURRENT_REPORT_VERSION.to_string(),
            source: source.base_url.clone(),
            destination: destination.base_url.clone(),
            destination_path_suffix: destination_path_suffix.to_string(),
            started_at,
            finished_at,
            duration_ms,
            outcome,
        }
    }
}
