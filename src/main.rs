//! DNS metrics e2e harness CLI
//!
//! Runs the DNS scenarios against the cluster selected by the kubeconfig and
//! reports which steps passed.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use dns_e2e::cli::{self, GlobalOptions};
use dns_e2e::commands;
use dns_e2e::common::logging;

#[derive(Parser)]
#[command(name = "dns-e2e", about = "End-to-end checks for DNS metrics")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Namespace for the DNS client and the agent
    #[arg(long, short, global = true)]
    namespace: Option<String>,

    /// Kubeconfig used for kubectl and owner lookups
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Save a JSON report for every scenario run
    #[arg(long, global = true)]
    save_report: bool,

    /// Verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    let options = GlobalOptions {
        config: cli.config,
        namespace: cli.namespace,
        kubeconfig: cli.kubeconfig,
        save_report: cli.save_report,
    };

    if let Err(e) = cli::dispatch(cli.command, &options).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
