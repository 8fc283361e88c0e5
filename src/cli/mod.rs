//! CLI command handling
//!
//! Builds scenarios from the command line, runs them and formats output.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;

use crate::cluster::Kubectl;
use crate::commands::{Commands, TemplateCommand};
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::metrics::HttpScraper;
use crate::runner::{Executor, ScenarioReport};
use crate::scenario::{Scenario, ScenarioBuilder, ScenarioSettings, Suite};

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Explicit configuration file
    pub config: Option<PathBuf>,
    /// Override the namespace for the workload and the agent
    pub namespace: Option<String>,
    /// Override the kubeconfig used by kubectl and owner lookups
    pub kubeconfig: Option<PathBuf>,
    /// Write a JSON report per scenario
    pub save_report: bool,
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, options: &GlobalOptions) -> Result<()> {
    let config = load_config(options)?;
    let builder = ScenarioBuilder::new(ScenarioSettings::from(&config));

    match command {
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| Error::Config(format!("Failed to render configuration: {}", e)))?;
            match options.config.clone().or_else(paths::config_path) {
                Some(path) => println!("# {}", path.display().to_string().dimmed()),
                None => println!("# {}", "defaults".dimmed()),
            }
            print!("{}", rendered);
            Ok(())
        }

        Commands::Plan(template) => {
            let scenario = build_scenario(&builder, &template, &config)?;
            print_plan(&scenario);
            Ok(())
        }

        Commands::Run(template) => {
            let scenario = build_scenario(&builder, &template, &config)?;
            let executor = executor(&config)?;
            let report = executor.run(&scenario).await;
            print_report(&report);
            save_report(&report, options)?;
            report.into_result().map(|_| ())
        }

        Commands::Suite { path, fail_fast } => {
            let suite = match &path {
                Some(path) => Suite::load(path)?,
                None => Suite::builtin(),
            };
            let kubeconfig = resolve_kubeconfig(&config);
            let scenarios = suite.scenarios(&builder, kubeconfig.as_deref())?;
            let executor = executor(&config)?;

            println!(
                "\n{} {} ({} cases)",
                "Running Suite:".blue().bold(),
                suite.display_name().white().bold(),
                scenarios.len()
            );

            let mut passed = 0;
            let mut failed = Vec::new();
            for scenario in &scenarios {
                let report = executor.run(scenario).await;
                print_report(&report);
                save_report(&report, options)?;
                if report.passed() {
                    passed += 1;
                } else {
                    failed.push(report.name.clone());
                    if fail_fast {
                        break;
                    }
                }
            }

            println!(
                "\n{} {} passed, {} failed, {} total",
                "Summary:".cyan().bold(),
                passed.to_string().green(),
                failed.len().to_string().red(),
                scenarios.len()
            );
            if failed.is_empty() {
                Ok(())
            } else {
                Err(Error::Execution(format!(
                    "{} case(s) failed: {}",
                    failed.len(),
                    failed.join(", ")
                )))
            }
        }
    }
}

fn load_config(options: &GlobalOptions) -> Result<Config> {
    let mut config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(namespace) = &options.namespace {
        config.cluster.namespace = namespace.clone();
    }
    if let Some(kubeconfig) = &options.kubeconfig {
        config.cluster.kubeconfig = Some(kubeconfig.clone());
    }
    Ok(config)
}

fn executor(config: &Config) -> Result<Executor> {
    let cluster = Kubectl::from_config(config)?;
    let scraper = HttpScraper::new()?;
    Ok(Executor::new(Arc::new(cluster), Arc::new(scraper))
        .with_timeout(config.timing.scenario_timeout()))
}

/// Kubeconfig for owner lookups: configured, then `$KUBECONFIG`, then `~/.kube/config`
fn resolve_kubeconfig(config: &Config) -> Option<PathBuf> {
    if let Some(path) = &config.cluster.kubeconfig {
        return Some(path.clone());
    }
    if let Some(path) = std::env::var_os("KUBECONFIG").filter(|v| !v.is_empty()) {
        // Only the first entry of a path list is used
        return std::env::split_paths(&path).next();
    }
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".kube").join("config"))
}

fn build_scenario(
    builder: &ScenarioBuilder,
    template: &TemplateCommand,
    config: &Config,
) -> Result<Scenario> {
    let case = template.case();
    let (request, response) = (case.request(), case.response());
    request.validate()?;
    response.validate()?;
    match template {
        TemplateCommand::Basic(_) => Ok(builder.basic(&case.name, &request, &response)),
        TemplateCommand::Advanced(_) => {
            let kubeconfig = resolve_kubeconfig(config).ok_or_else(|| {
                Error::Config("No kubeconfig found; pass --kubeconfig".to_string())
            })?;
            Ok(builder.advanced(&case.name, &request, &response, kubeconfig))
        }
    }
}

fn save_report(report: &ScenarioReport, options: &GlobalOptions) -> Result<()> {
    if !options.save_report {
        return Ok(());
    }
    let dir = paths::ensure_report_dir()?
        .ok_or_else(|| Error::Config("Could not determine the report directory".to_string()))?;
    let path = report.save(&dir)?;
    println!("  {} {}", "Report:".dimmed(), path.display());
    Ok(())
}

fn print_plan(scenario: &Scenario) {
    println!("\n{} {}", "Plan:".blue().bold(), scenario.name().white().bold());
    for (i, wrapper) in scenario.steps().iter().enumerate() {
        let mut flags = Vec::new();
        if wrapper.opts.expect_error {
            flags.push("expect error".to_string());
        }
        if let Some(id) = &wrapper.opts.background_id {
            flags.push(format!("background {}", id));
        }
        if wrapper.opts.skip_saving_output {
            flags.push("no output".to_string());
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!(
            "  {:>2}. {:<26} {}{}",
            i + 1,
            wrapper.kind().as_str(),
            wrapper.step.describe(),
            flags.dimmed()
        );
    }
}

fn print_report(report: &ScenarioReport) {
    println!(
        "\n{} {}",
        "Running Scenario:".blue().bold(),
        report.name.white().bold()
    );

    for record in &report.records {
        let note = if record.expected_failure.is_some() {
            " (expected failure)"
        } else {
            ""
        };
        println!(
            "  {} Step {}: {}{} {}",
            "✓".green(),
            record.index,
            record.description.dimmed(),
            note,
            format!("{}ms", record.elapsed_ms).dimmed()
        );
        if let Some(output) = &record.output {
            for line in output.lines() {
                println!("      {}", line.dimmed());
            }
        }
    }

    match &report.error {
        None => println!(
            "\n{} {} ({}/{} steps, {:.1}s)\n",
            "✓".green().bold(),
            "Scenario Passed".green().bold(),
            report.steps_run(),
            report.steps_total,
            report.elapsed.as_secs_f64()
        ),
        Some(error) => {
            match error.step_index() {
                Some(index) => println!("  {} Step {}: {}", "✗".red(), index, error.root()),
                None => println!("  {} {}", "✗".red(), error),
            }
            println!(
                "\n{} {} ({}/{} steps)\n",
                "✗".red().bold(),
                "Scenario Failed".red().bold(),
                report.steps_run(),
                report.steps_total
            );
        }
    }
}
