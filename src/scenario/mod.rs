//! Scenarios and the steps they are made of
//!
//! A [`Scenario`] is a named, ordered list of [`StepWrapper`]s. Each wrapper
//! pairs a [`Step`] with the [`StepOptions`] the executor honors when running it.

mod dns;
mod steps;
mod suite;
mod validate;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::cluster::Cluster;
use crate::common::{Error, Result};
use crate::metrics::MetricsSource;
use crate::runner::BackgroundTaskRegistry;

pub use dns::{
    RequestValidationParams, ResponseValidationParams, ScenarioBuilder, ScenarioSettings,
    EMPTY_RESPONSE,
};
pub use steps::{CreateWorkload, DeleteResource, ExecInPod, PortForward, Sleep, Stop};
pub use suite::{Suite, SuiteCase, Template};
pub use validate::{MetricsEndpoint, ValidateRequestMetrics, ValidateResponseMetrics, WorkloadScope};

/// The kinds of step a scenario can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CreateWorkload,
    ExecInPod,
    Sleep,
    PortForward,
    Stop,
    ValidateRequestMetrics,
    ValidateResponseMetrics,
    DeleteResource,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::CreateWorkload => "create_workload",
            StepKind::ExecInPod => "exec_in_pod",
            StepKind::Sleep => "sleep",
            StepKind::PortForward => "port_forward",
            StepKind::Stop => "stop",
            StepKind::ValidateRequestMetrics => "validate_request_metrics",
            StepKind::ValidateResponseMetrics => "validate_response_metrics",
            StepKind::DeleteResource => "delete_resource",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step produced, kept for the run report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub text: Option<String>,
}

impl StepOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// Collaborators shared by every step of a run
pub struct StepContext {
    pub cluster: Arc<dyn Cluster>,
    pub metrics: Arc<dyn MetricsSource>,
    pub tasks: Arc<BackgroundTaskRegistry>,
}

/// A unit of scenario execution: a cluster action or an assertion
#[async_trait]
pub trait Step: Send + Sync + fmt::Debug {
    fn kind(&self) -> StepKind;

    /// One-line description used in plans and reports
    fn describe(&self) -> String;

    /// Run the step to completion
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput>;

    /// Bring up the long-lived part of the step for background execution.
    ///
    /// The returned future keeps the unit alive and only resolves if it
    /// ends on its own; the executor drops it to cancel.
    async fn launch(&self, _ctx: &StepContext) -> Result<BoxFuture<'static, Result<()>>> {
        Err(Error::Execution(format!(
            "{} steps cannot run in the background",
            self.kind()
        )))
    }
}

/// Per-step execution options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOptions {
    /// The step passes only if it fails
    pub expect_error: bool,
    /// Leave the step's output out of the run report
    pub skip_saving_output: bool,
    /// Launch in the background under this id until a matching [`Stop`]
    pub background_id: Option<String>,
}

/// A step paired with its options
#[derive(Debug, Clone)]
pub struct StepWrapper {
    pub step: Arc<dyn Step>,
    pub opts: StepOptions,
}

impl StepWrapper {
    pub fn new(step: impl Step + 'static) -> Self {
        Self {
            step: Arc::new(step),
            opts: StepOptions::default(),
        }
    }

    pub fn with_opts(mut self, opts: StepOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn kind(&self) -> StepKind {
        self.step.kind()
    }
}

/// A named, ordered sequence of steps; immutable once built
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    steps: Vec<StepWrapper>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<StepWrapper>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepWrapper] {
        &self.steps
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(StepWrapper::kind).collect()
    }
}
