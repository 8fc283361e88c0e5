//! Sequential scenario executor

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cluster::Cluster;
use crate::common::{Error, Result};
use crate::metrics::MetricsSource;
use crate::scenario::{Scenario, StepContext, StepOutput, StepWrapper};

use super::registry::BackgroundTaskRegistry;
use super::report::{ScenarioReport, StepRecord};

/// Runs scenarios one step at a time against a cluster
pub struct Executor {
    ctx: StepContext,
    /// Deadline for a whole scenario
    timeout: Option<Duration>,
}

impl Executor {
    pub fn new(cluster: Arc<dyn Cluster>, metrics: Arc<dyn MetricsSource>) -> Self {
        Self {
            ctx: StepContext {
                cluster,
                metrics,
                tasks: Arc::new(BackgroundTaskRegistry::new()),
            },
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<BackgroundTaskRegistry> {
        &self.ctx.tasks
    }

    /// Run every step in order, stopping at the first unexpected outcome
    ///
    /// Background tasks still registered when the run ends are cancelled
    /// before the report is returned, whatever the outcome.
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let started = Instant::now();
        let mut records = Vec::with_capacity(scenario.steps().len());
        tracing::info!(scenario = scenario.name(), steps = scenario.steps().len(), "Running scenario");

        let outcome = match self.timeout {
            Some(limit) => {
                let bounded = tokio::time::timeout(limit, self.run_steps(scenario, &mut records)).await;
                match bounded {
                    Ok(outcome) => outcome,
                    Err(_) => Err(timed_out(scenario, records.len(), limit)),
                }
            }
            None => self.run_steps(scenario, &mut records).await,
        };

        let leftover = self.ctx.tasks.cancel_all().await;
        match &outcome {
            Ok(()) if leftover > 0 => {
                tracing::warn!(leftover, "Background tasks were never stopped; cancelled them");
            }
            Ok(()) => {}
            Err(e) => {
                tracing::error!(scenario = scenario.name(), error = %e, cancelled = leftover, "Scenario failed");
            }
        }

        ScenarioReport {
            name: scenario.name().to_string(),
            steps_total: scenario.steps().len(),
            records,
            elapsed: started.elapsed(),
            error: outcome.err(),
        }
    }

    async fn run_steps(&self, scenario: &Scenario, records: &mut Vec<StepRecord>) -> Result<()> {
        for (i, wrapper) in scenario.steps().iter().enumerate() {
            let index = i + 1;
            self.check_background().await?;

            let kind = wrapper.kind();
            let description = wrapper.step.describe();
            tracing::info!(index, %kind, "{}", description);

            let started = Instant::now();
            let result = self.execute(index, wrapper).await;
            let elapsed = started.elapsed();

            let (output, expected_failure) = match (result, wrapper.opts.expect_error) {
                (Ok(output), false) => (output, None),
                (Ok(_), true) => return Err(Error::ExpectationMismatch.at_step(index, kind)),
                (Err(e), true) => {
                    tracing::debug!(index, %kind, error = %e, "Step failed as expected");
                    (StepOutput::none(), Some(e.to_string()))
                }
                (Err(e), false) => return Err(e.at_step(index, kind)),
            };

            tracing::debug!(index, %kind, elapsed_ms = elapsed.as_millis() as u64, "Step finished");
            records.push(StepRecord {
                index,
                kind,
                description,
                elapsed_ms: elapsed.as_millis() as u64,
                expected_failure,
                output: if wrapper.opts.skip_saving_output {
                    None
                } else {
                    output.text
                },
            });
        }

        self.check_background().await
    }

    async fn execute(&self, index: usize, wrapper: &StepWrapper) -> Result<StepOutput> {
        match &wrapper.opts.background_id {
            Some(id) => {
                // Refuse before launching so a duplicate never opens a second tunnel
                if self.ctx.tasks.contains(id).await {
                    return Err(Error::DuplicateTask(id.clone()));
                }
                let unit = wrapper.step.launch(&self.ctx).await?;
                self.ctx.tasks.start(id, index, wrapper.kind(), unit).await?;
                Ok(StepOutput::text(format!("started background task {}", id)))
            }
            None => wrapper.step.run(&self.ctx).await,
        }
    }

    /// Surface a background task that failed since the last step
    async fn check_background(&self) -> Result<()> {
        match self.ctx.tasks.reap_failed().await {
            Some(failure) => {
                tracing::warn!(id = %failure.id, "Background task failed on its own");
                Err(failure.into_error())
            }
            None => Ok(()),
        }
    }
}

/// Timeout error attributed to the step that was in flight
fn timed_out(scenario: &Scenario, completed: usize, limit: Duration) -> Error {
    let err = Error::ScenarioTimeout(limit);
    match scenario.steps().get(completed) {
        Some(wrapper) => err.at_step(completed + 1, wrapper.kind()),
        None => err,
    }
}
