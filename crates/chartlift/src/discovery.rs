use chartlift_types::ChartIdentity;

use crate::engine::Reporter;

/// Lists what exists on the source registry.
pub trait ChartDiscovery {
    /// Every project on the source, used when no project was configured.
    fn list_projects(&self) -> anyhow::Result<Vec<String>>;

    /// Every chart version stored in one project, in server order.
    fn list_charts(&self, project: &str) -> anyhow::Result<Vec<ChartIdentity>>;
}

#[derive(Debug, thiserror::Error)]
#[error("failed to discover charts ({scope}): {cause}")]
pub struct DiscoveryError {
    /// `project <name>` or `project listing`
    pub scope: String,
    pub cause: String,
}

/// Flatten the charts of `projects` (or of every project when empty) into
/// one ordered work list: project order first, then server order.
///
/// Entries with an empty name, project or version are skipped with a warning.
pub fn discover(
    discovery: &dyn ChartDiscovery,
    projects: &[String],
    reporter: &mut dyn Reporter,
) -> Result<Vec<ChartIdentity>, DiscoveryError> {
    let projects = if projects.is_empty() {
        reporter.info("no project given; listing every project on the source...");
        discovery.list_projects().map_err(|err| DiscoveryError {
            scope: "project listing".to_string(),
            cause: format!("{err:#}"),
        })?
    } else {
        projects.to_vec()
    };

    let mut charts = Vec::new();
    for project in &projects {
        let found = discovery.list_charts(project).map_err(|err| DiscoveryError {
            scope: format!("project {project}"),
            cause: format!("{err:#}"),
        })?;

        reporter.info(&format!("{project}: {} chart versions", found.len()));
        for chart in found {
            if !chart.is_resolved() {
                reporter.warn(&format!(
                    "{project}: skipping chart with missing name or version ({chart:?})"
                ));
            } else if !chart.has_plain_artifact_name() {
                reporter.warn(&format!(
                    "{project}: skipping chart whose name or version contains a path ({chart:?})"
                ));
            } else {
                charts.push(chart);
            }
        }
    }

    Ok(charts)
}
