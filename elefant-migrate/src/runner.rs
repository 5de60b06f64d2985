use std::collections::HashSet;
use itertools::Itertools;
use tracing::{debug, error, info, instrument};
use crate::capabilities::{MigrationContext, VersionRegistry};
use crate::step::{MigrationStep, StepState};
use crate::{MigrationError, MigrationVersion, Result};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MigrationRunnerOptions {
    /// Runs every step, and the record of it being applied, in its own transaction. Postgres
    /// supports transactional DDL, so a failed step leaves nothing behind.
    pub transactional_steps: bool,
}

impl Default for MigrationRunnerOptions {
    fn default() -> Self {
        Self {
            transactional_steps: true,
        }
    }
}

/// The outcome of a run. A failed run carries its report in
/// [`MigrationError::MigrationFailed`].
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct RunReport {
    pub applied: Vec<MigrationVersion>,
    /// Versions that were already recorded as applied before the run.
    pub skipped: Vec<MigrationVersion>,
    pub steps: Vec<(MigrationVersion, StepState)>,
}

/// Applies migration steps in version order, recording each one as it succeeds.
pub struct MigrationRunner<'a> {
    context: &'a dyn MigrationContext,
    registry: &'a dyn VersionRegistry,
    options: MigrationRunnerOptions,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(
        context: &'a dyn MigrationContext,
        registry: &'a dyn VersionRegistry,
        options: MigrationRunnerOptions,
    ) -> Self {
        MigrationRunner {
            context,
            registry,
            options,
        }
    }

    /// The versions that [`MigrationRunner::apply_pending`] would apply, in order.
    pub async fn pending(&self, steps: &[Box<dyn MigrationStep>]) -> Result<Vec<MigrationVersion>> {
        let ordered = order_steps(steps)?;
        let applied = self.applied_versions().await?;

        Ok(ordered
            .into_iter()
            .map(|s| s.version())
            .filter(|v| !applied.contains(v))
            .collect())
    }

    /// Applies every step that has not been applied yet, lowest version first.
    ///
    /// Stops at the first failure. Steps before it stay recorded, the failing step and anything
    /// after it are not.
    #[instrument(skip_all)]
    pub async fn apply_pending(&self, steps: &[Box<dyn MigrationStep>]) -> Result<RunReport> {
        let ordered = order_steps(steps)?;
        let applied = self.applied_versions().await?;

        let mut report = RunReport::default();

        for step in ordered {
            let version = step.version();

            if applied.contains(&version) {
                debug!(%version, "Already applied");
                report.skipped.push(version);
                continue;
            }

            let state = advance(&version, StepState::Pending, StepState::Running);
            info!(%version, description = step.description(), "Applying migration");

            match self.apply_step(step, &version).await {
                Ok(()) => {
                    let state = advance(&version, state, StepState::Succeeded);
                    info!(%version, "Applied migration");
                    report.applied.push(version.clone());
                    report.steps.push((version, state));
                }
                Err(e) => {
                    let state = advance(&version, state, StepState::Failed);
                    error!(%version, error = %e, "Migration failed");
                    report.steps.push((version.clone(), state));
                    return Err(MigrationError::MigrationFailed {
                        version,
                        source: Box::new(e),
                        report: Box::new(report),
                    });
                }
            }
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Migrations are up to date"
        );

        Ok(report)
    }

    async fn applied_versions(&self) -> Result<HashSet<MigrationVersion>> {
        self.registry.ensure_created().await?;

        Ok(self
            .registry
            .applied_versions()
            .await?
            .into_iter()
            .map(|a| a.version)
            .collect())
    }

    async fn apply_step(&self, step: &dyn MigrationStep, version: &MigrationVersion) -> Result {
        let connection = self.context.connection();

        if !self.options.transactional_steps {
            step.up(self.context).await?;
            return self.registry.record_applied(version).await;
        }

        connection.begin().await?;

        let result = match step.up(self.context).await {
            Ok(()) => self.registry.record_applied(version).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => connection.commit().await,
            Err(e) => {
                if let Err(rollback_error) = connection.rollback().await {
                    error!(%version, error = %rollback_error, "Failed to roll back migration");
                }
                Err(e)
            }
        }
    }
}

fn advance(version: &MigrationVersion, from: StepState, to: StepState) -> StepState {
    match from.transition(to) {
        Some(next) => {
            debug!(%version, %from, %next, "Step state changed");
            next
        }
        None => from,
    }
}

/// Sorts the steps by version. Two steps with the same version is an error, as only one of them
/// could ever be recorded.
fn order_steps(steps: &[Box<dyn MigrationStep>]) -> Result<Vec<&dyn MigrationStep>> {
    let ordered = steps
        .iter()
        .map(|s| s.as_ref())
        .sorted_by_key(|s| s.version())
        .collect_vec();

    for (a, b) in ordered.iter().tuple_windows() {
        if a.version() == b.version() {
            return Err(MigrationError::DuplicateVersion(a.version()));
        }
    }

    Ok(ordered)
}
