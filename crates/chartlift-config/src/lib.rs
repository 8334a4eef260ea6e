//! Configuration file handling for chartlift.
//!
//! Settings come from three layers, later layers winning:
//! built-in defaults, an optional `.chartlift.toml`, then CLI flags (which
//! clap may in turn have read from `CHARTLIFT_*` environment variables).
//! The merge produces one immutable [`MigrationConfig`] that is handed to the
//! migration engine by reference.
//!
//! # Example
//!
//! ```
//! use chartlift_config::{ChartliftConfig, CliOverrides};
//!
//! let config = ChartliftConfig::default();
//! let migration = config
//!     .build_migration_config(CliOverrides {
//!         source_url: Some("https://old-harbor.example.com".into()),
//!         destination_url: Some("https://new-harbor.example.com".into()),
//!         projects: vec!["library".into()],
//!         ..Default::default()
//!     })
//!     .expect("valid config");
//! assert_eq!(migration.projects, vec!["library".to_string()]);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chartlift_types::RegistryEndpoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default configuration file name
pub const CONFIG_FILE: &str = ".chartlift.toml";

/// Default helm executable
pub const DEFAULT_HELM_BINARY: &str = "helm";

/// Default bound on a single chart download
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single `helm push`
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(120);

/// Default bound on `helm registry login`
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Get the config file path for a directory
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// `[source]` / `[destination]` tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Registry base URL
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Password. Supported formats:
    /// - "env:VAR_NAME" - read from environment variable
    /// - "file:/path/to/secret" - read from file
    /// - Raw string (not recommended)
    #[serde(default)]
    pub password: Option<String>,
}

/// `[migration]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationSection {
    /// Projects to migrate; all projects when empty
    #[serde(default)]
    pub projects: Vec<String>,
    /// Suffix appended to the project in every destination reference
    #[serde(default)]
    pub destpath: Option<String>,
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Where to write the JSON report
    #[serde(default)]
    pub report: Option<PathBuf>,
}

/// `[timeouts]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    #[serde(default = "default_fetch_timeout")]
    pub fetch: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    #[serde(default = "default_push_timeout")]
    pub push: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    #[serde(default = "default_login_timeout")]
    pub login: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            fetch: default_fetch_timeout(),
            push: default_push_timeout(),
            login: default_login_timeout(),
        }
    }
}

/// `[helm]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelmConfig {
    #[serde(default = "default_helm_binary")]
    pub binary: String,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            binary: default_helm_binary(),
        }
    }
}

/// Contents of `.chartlift.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartliftConfig {
    #[serde(default)]
    pub source: EndpointConfig,
    #[serde(default)]
    pub destination: EndpointConfig,
    #[serde(default)]
    pub migration: MigrationSection,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub helm: HelmConfig,
}

/// CLI overrides for merging with config file values.
///
/// `Option` fields mean "user did not pass this flag" when `None`.
/// An empty `projects` list defers to the config file.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub source_url: Option<String>,
    pub source_username: Option<String>,
    pub source_password: Option<String>,
    pub destination_url: Option<String>,
    pub destination_username: Option<String>,
    pub destination_password: Option<String>,
    pub destpath: Option<String>,
    pub projects: Vec<String>,
    pub fetch_timeout: Option<Duration>,
    pub push_timeout: Option<Duration>,
    pub login_timeout: Option<Duration>,
    pub staging_dir: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub helm_binary: Option<String>,
}

/// Fully merged settings for one migration run.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub source: RegistryEndpoint,
    pub destination: RegistryEndpoint,
    /// Appended verbatim after the project name in destination references.
    pub destination_path_suffix: String,
    /// Projects in the order given; empty means every project on the source.
    pub projects: Vec<String>,
    pub fetch_timeout: Duration,
    pub push_timeout: Duration,
    pub login_timeout: Duration,
    /// Where staged archives are written; a temporary directory when `None`.
    pub staging_dir: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub helm_binary: String,
}

impl MigrationConfig {
    /// Config with the given endpoints and every other knob at its default.
    pub fn new(source: RegistryEndpoint, destination: RegistryEndpoint) -> Self {
        Self {
            source,
            destination,
            destination_path_suffix: String::new(),
            projects: Vec::new(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            staging_dir: None,
            report_path: None,
            helm_binary: DEFAULT_HELM_BINARY.to_string(),
        }
    }

    /// Checks that must pass before any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.source.base_url.trim().is_empty() {
            bail!("missing required --source-url");
        }
        if self.destination.base_url.trim().is_empty() {
            bail!("missing required --destination-url");
        }
        if self.fetch_timeout.is_zero() {
            bail!("fetch timeout must be greater than 0");
        }
        if self.push_timeout.is_zero() {
            bail!("push timeout must be greater than 0");
        }
        if self.login_timeout.is_zero() {
            bail!("login timeout must be greater than 0");
        }
        if self.helm_binary.trim().is_empty() {
            bail!("helm binary cannot be empty");
        }
        if self.projects.iter().any(|p| p.trim().is_empty()) {
            bail!("project names cannot be empty");
        }
        Ok(())
    }
}

impl ChartliftConfig {
    /// Load `.chartlift.toml` from a directory.
    ///
    /// Returns `Ok(None)` if no config file exists.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = config_path(dir);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from_file(&path).map(Some)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ChartliftConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Merge CLI overrides over this file's values, resolve secrets and
    /// validate the result.
    pub fn build_migration_config(&self, cli: CliOverrides) -> Result<MigrationConfig> {
        let source = merge_endpoint(
            &self.source,
            cli.source_url,
            cli.source_username,
            cli.source_password,
        )
        .context("invalid source registry settings")?;
        let destination = merge_endpoint(
            &self.destination,
            cli.destination_url,
            cli.destination_username,
            cli.destination_password,
        )
        .context("invalid destination registry settings")?;

        let projects = if cli.projects.is_empty() {
            self.migration.projects.clone()
        } else {
            cli.projects
        };

        let config = MigrationConfig {
            source,
            destination,
            destination_path_suffix: cli
                .destpath
                .or_else(|| self.migration.destpath.clone())
                .unwrap_or_default(),
            projects,
            fetch_timeout: cli.fetch_timeout.unwrap_or(self.timeouts.fetch),
            push_timeout: cli.push_timeout.unwrap_or(self.timeouts.push),
            login_timeout: cli.login_timeout.unwrap_or(self.timeouts.login),
            staging_dir: cli
                .staging_dir
                .or_else(|| self.migration.staging_dir.clone()),
            report_path: cli.report.or_else(|| self.migration.report.clone()),
            helm_binary: cli
                .helm_binary
                .unwrap_or_else(|| self.helm.binary.clone()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Commented template written by `chartlift --print-config`.
    pub fn default_toml_template() -> String {
        r#"# chartlift configuration

[source]
# url = "https://old-harbor.example.com"
# username = "admin"
# password = "env:SOURCE_HARBOR_PASSWORD"

[destination]
# url = "https://new-harbor.example.com"
# username = "robot$migrator"
# password = "file:/run/secrets/harbor"

[migration]
# Projects to migrate; every project on the source when empty
projects = []
# Suffix appended to the project in each oci:// reference
# destpath = "/charts"
# staging_dir = "/var/tmp/chartlift"
# report = "chartlift-report.json"

[timeouts]
fetch = "5s"
push = "2m"
login = "30s"

[helm]
binary = "helm"
"#
        .to_string()
    }
}

fn merge_endpoint(
    file: &EndpointConfig,
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<RegistryEndpoint> {
    let raw_password = password.or_else(|| file.password.clone());
    let password = match raw_password {
        Some(raw) => resolve_secret(&raw)?,
        None => String::new(),
    };

    Ok(RegistryEndpoint {
        base_url: url.or_else(|| file.url.clone()).unwrap_or_default(),
        username: username
            .or_else(|| file.username.clone())
            .unwrap_or_default(),
        password,
    })
}

/// Resolve `env:VAR`, `file:/path` or a literal secret.
pub fn resolve_secret(raw: &str) -> Result<String> {
    if let Some(var) = raw.strip_prefix("env:") {
        return std::env::var(var)
            .with_context(|| format!("environment variable {var} is not set"));
    }
    if let Some(path) = raw.strip_prefix("file:") {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read secret file {path}"))?;
        return Ok(content.trim().to_string());
    }
    Ok(raw.to_string())
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

fn default_push_timeout() -> Duration {
    DEFAULT_PUSH_TIMEOUT
}

fn default_login_timeout() -> Duration {
    DEFAULT_LOGIN_TIMEOUT
}

fn default_helm_binary() -> String {
    DEFAULT_HELM_BINARY.to_string()
}

/// Deserialize a humantime string such as `"5s"` or `"2m"`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}

pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}
