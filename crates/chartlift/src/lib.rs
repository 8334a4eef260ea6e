//! # chartlift
//!
//! Moves Helm charts out of a Harbor ChartMuseum repository and into an OCI
//! registry.
//!
//! Every chart version found on the source is fetched over HTTP, staged on
//! local disk, pushed with `helm push`, and the staged file removed. A chart
//! that fails is recorded and the run moves on; only problems that happen
//! before the first transfer (bad configuration, failed login, failed
//! discovery) abort the run.
//!
//! ## Pipeline
//!
//! 1. [`auth::authenticate`] logs in to the source, then the destination.
//! 2. [`discovery::discover`] flattens the configured projects (or every
//!    project) into an ordered list of [`ChartIdentity`] values.
//! 3. [`transfer::transfer`] runs fetch → persist → push → cleanup for each.
//! 4. [`engine::run_migration`] ties it together and returns a
//!    [`MigrationReport`].
//!
//! [`engine::plan_migration`] stops after discovery and is what
//! `chartlift --dry-run` prints.
//!
//! ## Example
//!
//! ```ignore
//! use chartlift::engine::{Collaborators, run_migration};
//! use chartlift::harbor::{HarborChartSource, HarborDiscovery};
//! use chartlift::helm::HelmCli;
//!
//! let helm = HelmCli::from_config(&config);
//! let discovery = HarborDiscovery::new(&config.source, config.fetch_timeout)?;
//! let source = HarborChartSource::new(&config.source, config.fetch_timeout)?;
//! let collaborators = Collaborators {
//!     authenticator: &helm,
//!     discovery: &discovery,
//!     source: &source,
//!     pusher: &helm,
//! };
//! let report = run_migration(&config, &collaborators, &mut reporter)?;
//! println!("{}", report.outcome.summary_line());
//! ```

/// Registry login and the sessions it produces.
pub mod auth;

/// Turning project names into an ordered chart work list.
pub mod discovery;

/// Run orchestration, dry-run planning and the `Reporter` trait.
pub mod engine;

/// Harbor ChartMuseum HTTP adapters.
pub mod harbor;

/// `helm` subprocess adapters.
pub mod helm;

/// JSON run report persistence.
pub mod report;

/// Local directory for archives between fetch and push.
pub mod staging;

/// The per-chart fetch, persist, push and cleanup sequence.
pub mod transfer;

pub use chartlift_config as config;
pub use chartlift_types::{
    ChartFailure, ChartIdentity, FailureStage, MigrationOutcome, MigrationReport,
    RegistryEndpoint,
};
