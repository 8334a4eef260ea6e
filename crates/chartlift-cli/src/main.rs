use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use chartlift::engine::{self, Collaborators, Reporter};
use chartlift::harbor::{HarborChartSource, HarborDiscovery};
use chartlift::helm::HelmCli;
use chartlift_config::{ChartliftConfig, CliOverrides, MigrationConfig};
use chartlift_types::{ChartIdentity, MigrationReport};

mod progress;

use progress::MigrationProgress;

/// Exit status when at least one chart failed to migrate.
const EXIT_PARTIAL_FAILURE: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "chartlift", version)]
#[command(about = "Migrate Helm charts from Harbor ChartMuseum to an OCI registry")]
struct Cli {
    /// Source Harbor base URL
    #[arg(long, env = "CHARTLIFT_SOURCE_URL")]
    source_url: Option<String>,

    #[arg(long, env = "CHARTLIFT_SOURCE_USERNAME")]
    source_username: Option<String>,

    #[arg(long, env = "CHARTLIFT_SOURCE_PASSWORD", hide_env_values = true)]
    source_password: Option<String>,

    /// Destination OCI registry base URL
    #[arg(long, env = "CHARTLIFT_DESTINATION_URL")]
    destination_url: Option<String>,

    #[arg(long, env = "CHARTLIFT_DESTINATION_USERNAME")]
    destination_username: Option<String>,

    #[arg(long, env = "CHARTLIFT_DESTINATION_PASSWORD", hide_env_values = true)]
    destination_password: Option<String>,

    /// Path appended after the project in each destination reference (e.g. /charts)
    #[arg(long)]
    destpath: Option<String>,

    /// Project to migrate (repeatable). Every project on the source when omitted.
    #[arg(long = "project")]
    projects: Vec<String>,

    /// Config file (default: .chartlift.toml in the current directory, if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Timeout for one chart download (e.g. 5s)
    #[arg(long, value_parser = parse_duration)]
    fetch_timeout: Option<Duration>,

    /// Timeout for one helm push (e.g. 2m)
    #[arg(long, value_parser = parse_duration)]
    push_timeout: Option<Duration>,

    /// Timeout for helm registry login
    #[arg(long, value_parser = parse_duration)]
    login_timeout: Option<Duration>,

    /// Directory for downloaded archives (default: a temporary directory)
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// helm executable
    #[arg(long = "helm-bin")]
    helm_bin: Option<String>,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Discover charts and print where each would be pushed, then exit.
    #[arg(long)]
    dry_run: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Print a commented config template and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            source_url: self.source_url.clone(),
            source_username: self.source_username.clone(),
            source_password: self.source_password.clone(),
            destination_url: self.destination_url.clone(),
            destination_username: self.destination_username.clone(),
            destination_password: self.destination_password.clone(),
            destpath: self.destpath.clone(),
            projects: self.projects.clone(),
            fetch_timeout: self.fetch_timeout,
            push_timeout: self.push_timeout,
            login_timeout: self.login_timeout,
            staging_dir: self.staging_dir.clone(),
            report: self.report.clone(),
            helm_binary: self.helm_bin.clone(),
        }
    }
}

struct CliReporter {
    progress: MigrationProgress,
}

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        self.progress.println(&format!("[info] {msg}"));
    }

    fn warn(&mut self, msg: &str) {
        self.progress.println(&format!("[warn] {msg}"));
    }

    fn error(&mut self, msg: &str) {
        self.progress.println(&format!("[error] {msg}"));
    }

    fn chart_finished(&mut self, index: usize, total: usize, chart: &ChartIdentity, ok: bool) {
        self.progress.chart_finished(index, total, chart, ok);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[error] {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if cli.print_config {
        print!("{}", ChartliftConfig::default_toml_template());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    let mut reporter = CliReporter {
        progress: MigrationProgress::new(!cli.no_progress && !cli.dry_run),
    };

    let discovery = HarborDiscovery::new(&config.source, config.fetch_timeout)?;

    if cli.dry_run {
        let planned = engine::plan_migration(&config, &discovery, &mut reporter)?;
        print_plan(&planned);
        return Ok(ExitCode::SUCCESS);
    }

    let helm = HelmCli::from_config(&config);
    if !helm.is_available() {
        reporter.warn(&format!(
            "helm binary '{}' not found; login and push will fail",
            helm.binary()
        ));
    }
    let source = HarborChartSource::new(&config.source, config.fetch_timeout)?;
    let collaborators = Collaborators {
        authenticator: &helm,
        discovery: &discovery,
        source: &source,
        pusher: &helm,
    };

    let report = engine::run_migration(&config, &collaborators, &mut reporter)?;
    reporter.progress.finish();
    print_summary(&report);

    if report.outcome.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
    }
}

fn load_config(cli: &Cli) -> Result<MigrationConfig> {
    let file = match &cli.config {
        Some(path) => ChartliftConfig::load_from_file(path)?,
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            ChartliftConfig::load_from_dir(&cwd)?.unwrap_or_default()
        }
    };
    file.build_migration_config(cli.overrides())
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|err| format!("invalid duration '{s}': {err}"))
}

fn print_plan(planned: &[engine::PlannedChart]) {
    for (idx, p) in planned.iter().enumerate() {
        println!("{:>3}. {} -> {}", idx + 1, p.chart, p.destination_reference);
    }
    println!();
    println!("{} Helm charts would be migrated", planned.len());
}

fn print_summary(report: &MigrationReport) {
    for failure in &report.outcome.failures {
        println!("failed: {failure}");
    }
    println!("{}", report.outcome.summary_line());
}
