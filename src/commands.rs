//! CLI command definitions
//!
//! Defines the clap commands for the DNS metrics harness.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::scenario::{RequestValidationParams, ResponseValidationParams};

#[derive(Subcommand)]
pub enum Commands {
    /// Run one DNS scenario
    #[command(subcommand)]
    Run(TemplateCommand),

    /// Run every case of a suite file (the built-in cases when omitted)
    Suite {
        /// Path to the YAML suite file
        path: Option<PathBuf>,

        /// Stop at the first failing case
        #[arg(long)]
        fail_fast: bool,
    },

    /// Print the steps of a scenario without running it
    #[command(subcommand)]
    Plan(TemplateCommand),

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
pub enum TemplateCommand {
    /// Coarse DNS request/response metrics
    Basic(CaseArgs),

    /// Pod-scoped DNS metrics with workload attribution
    Advanced(CaseArgs),
}

impl TemplateCommand {
    pub fn case(&self) -> &CaseArgs {
        match self {
            TemplateCommand::Basic(case) | TemplateCommand::Advanced(case) => case,
        }
    }
}

/// Request and response parameters of a single case
///
/// An empty label value requires the label to be absent from the sample.
#[derive(Args, Debug, Clone)]
pub struct CaseArgs {
    /// Scenario name used in output and reports
    #[arg(long, default_value = "dns")]
    pub name: String,

    /// Command executed in the client pod
    #[arg(long, default_value = "nslookup kubernetes.default")]
    pub command: String,

    /// The command is expected to fail (e.g. NXDOMAIN)
    #[arg(long)]
    pub expect_error: bool,

    /// Query label value
    #[arg(long, default_value = "kubernetes.default.svc.cluster.local.")]
    pub query: String,

    /// Query type label value
    #[arg(long, default_value = "A")]
    pub query_type: String,

    /// num_response label value of the request metric
    #[arg(long, default_value = "0")]
    pub request_num_response: String,

    /// num_response label value of the response metric
    #[arg(long, default_value = "1")]
    pub response_num_response: String,

    /// Return code label value of the response metric
    #[arg(long, default_value = "NOERROR")]
    pub return_code: String,

    /// Response label value ("emptyResponse" for no answers)
    #[arg(long, default_value = "10.0.0.1")]
    pub response: String,

    /// Exact request counter value to require
    #[arg(long)]
    pub request_count: Option<String>,

    /// Exact response counter value to require
    #[arg(long)]
    pub response_count: Option<String>,
}

impl CaseArgs {
    pub fn request(&self) -> RequestValidationParams {
        RequestValidationParams {
            num_response: self.request_num_response.clone(),
            query: self.query.clone(),
            query_type: self.query_type.clone(),
            command: self.command.clone(),
            expect_error: self.expect_error,
            expected_count: self.request_count.clone(),
        }
    }

    pub fn response(&self) -> ResponseValidationParams {
        ResponseValidationParams {
            num_response: self.response_num_response.clone(),
            query: self.query.clone(),
            query_type: self.query_type.clone(),
            return_code: self.return_code.clone(),
            response: self.response.clone(),
            expected_count: self.response_count.clone(),
        }
    }
}
