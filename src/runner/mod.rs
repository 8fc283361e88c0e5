//! Scenario execution
//!
//! The [`Executor`] runs a scenario's steps in order and hands background
//! steps to the [`BackgroundTaskRegistry`]; every run produces a
//! [`ScenarioReport`].

mod executor;
mod registry;
mod report;

pub use executor::Executor;
pub use registry::{BackgroundTaskRegistry, TaskFailure};
pub use report::{ReportSummary, ScenarioReport, StepRecord};
