//! DNS scenario templates
//!
//! Both templates share one eleven-step shape:
//!
//! 1. create the agnhost StatefulSet
//! 2. exec the DNS command
//! 3. sleep
//! 4. exec the DNS command again (resolver warm-up, see below)
//! 5. sleep
//! 6. port-forward to the agent metrics endpoint, in the background
//! 7. validate request metrics
//! 8. validate response metrics
//! 9. stop the port-forward
//! 10. delete the StatefulSet
//! 11. sleep
//!
//! The command runs twice because the first query after pod start is
//! sometimes lost while the resolver warms up
//! (<https://github.com/microsoft/retina/issues/415>).

use std::path::PathBuf;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::steps::{CreateWorkload, DeleteResource, ExecInPod, PortForward, Sleep, Stop};
use super::validate::{MetricsEndpoint, ValidateRequestMetrics, ValidateResponseMetrics, WorkloadScope};
use super::{Scenario, StepOptions, StepWrapper};
use crate::cluster::{PortForwardSpec, ResourceType};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::metrics::parse_count;

/// Label value the agent reports when a DNS response carried no answer records
pub const EMPTY_RESPONSE: &str = "emptyResponse";

/// Workload kind the templates create
const WORKLOAD_KIND: &str = "StatefulSet";

/// Inputs for the request half of a DNS scenario
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RequestValidationParams {
    pub num_response: String,
    pub query: String,
    pub query_type: String,
    /// Shell-free command line executed in the client pod
    pub command: String,
    /// The command itself is expected to fail (e.g. NXDOMAIN lookups)
    #[serde(default)]
    pub expect_error: bool,
    /// Exact counter value to require; any integer passes when unset
    #[serde(default)]
    pub expected_count: Option<String>,
}

/// Inputs for the response half of a DNS scenario
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResponseValidationParams {
    pub num_response: String,
    pub query: String,
    pub query_type: String,
    pub return_code: String,
    /// Answer content, or [`EMPTY_RESPONSE`]
    pub response: String,
    #[serde(default)]
    pub expected_count: Option<String>,
}

impl RequestValidationParams {
    /// Reject values that could never match at validation time
    pub fn validate(&self) -> Result<()> {
        check_expected_count("request", self.expected_count.as_deref())
    }
}

impl ResponseValidationParams {
    /// Reject values that could never match at validation time
    pub fn validate(&self) -> Result<()> {
        check_expected_count("response", self.expected_count.as_deref())
    }
}

fn check_expected_count(half: &str, expected: Option<&str>) -> Result<()> {
    match expected {
        Some(raw) if parse_count(raw).is_none() => Err(Error::Config(format!(
            "{} expected_count '{}' is not a non-negative integer",
            half, raw
        ))),
        _ => Ok(()),
    }
}

/// Cluster-specific values baked into every template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSettings {
    /// Namespace for the client workload and the agent
    pub namespace: String,
    /// Selects the agent pods
    pub agent_selector: String,
    pub metrics_port: u16,
    pub metrics_path: String,
    pub sleep_delay: Duration,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ScenarioSettings {
    fn from(config: &Config) -> Self {
        Self {
            namespace: config.cluster.namespace.clone(),
            agent_selector: config.agent.label_selector.clone(),
            metrics_port: config.agent.metrics_port,
            metrics_path: config.agent.metrics_path.clone(),
            sleep_delay: config.timing.sleep_delay(),
        }
    }
}

/// Names derived from the per-build id
struct Names {
    id: String,
    workload: String,
    pod: String,
}

impl Names {
    /// Draw a fresh id from a generator owned by this call
    fn generate(prefix: &str) -> Self {
        let mut rng = StdRng::from_entropy();
        let id = format!("{}-{}", prefix, rng.gen::<u32>());
        let workload = format!("agnhost-{}", id);
        let pod = format!("{}-0", workload);
        Self { id, workload, pod }
    }
}

/// Assembles the DNS scenario templates
#[derive(Debug, Clone, Default)]
pub struct ScenarioBuilder {
    settings: ScenarioSettings,
}

impl ScenarioBuilder {
    pub fn new(settings: ScenarioSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ScenarioSettings {
        &self.settings
    }

    /// Validate the coarse DNS metrics
    pub fn basic(
        &self,
        name: &str,
        req: &RequestValidationParams,
        resp: &ResponseValidationParams,
    ) -> Scenario {
        let names = Names::generate("basic-dns-port-forward");
        let request = ValidateRequestMetrics {
            num_response: req.num_response.clone(),
            query: req.query.clone(),
            query_type: req.query_type.clone(),
            expected_count: req.expected_count.clone(),
            endpoint: self.endpoint(),
            scope: None,
        };
        let response = ValidateResponseMetrics {
            num_response: resp.num_response.clone(),
            query: resp.query.clone(),
            query_type: resp.query_type.clone(),
            return_code: resp.return_code.clone(),
            response: resp.response.clone(),
            expected_count: resp.expected_count.clone(),
            endpoint: self.endpoint(),
            scope: None,
        };
        self.assemble(name, &names, req, request, response)
    }

    /// Validate the pod-scoped DNS metrics, cross-checking the owning workload
    pub fn advanced(
        &self,
        name: &str,
        req: &RequestValidationParams,
        resp: &ResponseValidationParams,
        kubeconfig: impl Into<PathBuf>,
    ) -> Scenario {
        let names = Names::generate("adv-dns-port-forward");
        let scope = WorkloadScope {
            namespace: self.settings.namespace.clone(),
            pod_name: names.pod.clone(),
            workload_kind: WORKLOAD_KIND.to_string(),
            workload_name: names.workload.clone(),
            kubeconfig: kubeconfig.into(),
        };
        let request = ValidateRequestMetrics {
            num_response: req.num_response.clone(),
            query: req.query.clone(),
            query_type: req.query_type.clone(),
            expected_count: req.expected_count.clone(),
            endpoint: self.endpoint(),
            scope: Some(scope.clone()),
        };
        let response = ValidateResponseMetrics {
            num_response: resp.num_response.clone(),
            query: resp.query.clone(),
            query_type: resp.query_type.clone(),
            return_code: resp.return_code.clone(),
            response: resp.response.clone(),
            expected_count: resp.expected_count.clone(),
            endpoint: self.endpoint(),
            scope: Some(scope),
        };
        self.assemble(name, &names, req, request, response)
    }

    fn endpoint(&self) -> MetricsEndpoint {
        MetricsEndpoint {
            port: self.settings.metrics_port,
            path: self.settings.metrics_path.clone(),
        }
    }

    fn assemble(
        &self,
        name: &str,
        names: &Names,
        req: &RequestValidationParams,
        request: ValidateRequestMetrics,
        response: ValidateResponseMetrics,
    ) -> Scenario {
        let namespace = &self.settings.namespace;
        let quiet = StepOptions {
            skip_saving_output: true,
            ..StepOptions::default()
        };
        let exec_opts = StepOptions {
            expect_error: req.expect_error,
            skip_saving_output: true,
            background_id: None,
        };
        let exec = || ExecInPod {
            pod_name: names.pod.clone(),
            namespace: namespace.clone(),
            command: req.command.clone(),
        };
        let sleep = || Sleep {
            duration: self.settings.sleep_delay,
        };

        let steps = vec![
            StepWrapper::new(CreateWorkload {
                name: names.workload.clone(),
                namespace: namespace.clone(),
            }),
            StepWrapper::new(exec()).with_opts(exec_opts.clone()),
            StepWrapper::new(sleep()),
            StepWrapper::new(exec()).with_opts(exec_opts),
            StepWrapper::new(sleep()),
            StepWrapper::new(PortForward {
                spec: PortForwardSpec {
                    namespace: namespace.clone(),
                    label_selector: self.settings.agent_selector.clone(),
                    local_port: self.settings.metrics_port,
                    remote_port: self.settings.metrics_port,
                    endpoint: self.settings.metrics_path.trim_start_matches('/').to_string(),
                    label_affinity: Some(format!("app={}", names.workload)),
                },
            })
            .with_opts(StepOptions {
                skip_saving_output: true,
                background_id: Some(names.id.clone()),
                ..StepOptions::default()
            }),
            StepWrapper::new(request).with_opts(quiet.clone()),
            StepWrapper::new(response).with_opts(quiet.clone()),
            StepWrapper::new(Stop {
                background_id: names.id.clone(),
            }),
            StepWrapper::new(DeleteResource {
                resource_type: ResourceType::StatefulSet,
                name: names.workload.clone(),
                namespace: namespace.clone(),
            })
            .with_opts(quiet),
            StepWrapper::new(sleep()),
        ];

        Scenario::new(name, steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::StepKind;

    const SHAPE: [StepKind; 11] = [
        StepKind::CreateWorkload,
        StepKind::ExecInPod,
        StepKind::Sleep,
        StepKind::ExecInPod,
        StepKind::Sleep,
        StepKind::PortForward,
        StepKind::ValidateRequestMetrics,
        StepKind::ValidateResponseMetrics,
        StepKind::Stop,
        StepKind::DeleteResource,
        StepKind::Sleep,
    ];

    fn request(command: &str, expect_error: bool) -> RequestValidationParams {
        RequestValidationParams {
            num_response: "0".to_string(),
            query: "kubernetes.default.svc.cluster.local.".to_string(),
            query_type: "A".to_string(),
            command: command.to_string(),
            expect_error,
            expected_count: None,
        }
    }

    #[test]
    fn test_expected_count_must_be_an_integer() {
        let mut req = request("nslookup kubernetes.default", false);
        assert!(req.validate().is_ok());
        req.expected_count = Some(" 4 ".to_string());
        assert!(req.validate().is_ok());
        req.expected_count = Some("four".to_string());
        assert!(matches!(req.validate(), Err(Error::Config(msg)) if msg.contains("'four'")));

        let mut resp = response();
        resp.expected_count = Some("1.5".to_string());
        assert!(matches!(resp.validate(), Err(Error::Config(_))));
    }

    fn response() -> ResponseValidationParams {
        ResponseValidationParams {
            num_response: "1".to_string(),
            query: "kubernetes.default.svc.cluster.local.".to_string(),
            query_type: "A".to_string(),
            return_code: "NOERROR".to_string(),
            response: "10.0.0.1".to_string(),
            expected_count: None,
        }
    }

    fn background_id(scenario: &Scenario) -> String {
        scenario.steps()[5].opts.background_id.clone().unwrap()
    }

    #[test]
    fn test_shape_is_fixed_for_both_templates() {
        let builder = ScenarioBuilder::default();
        let inputs = [
            ("nslookup kubernetes.default", false),
            ("nslookup some.non.existent.domain.", true),
            ("", false),
        ];
        for (command, expect_error) in inputs {
            let req = request(command, expect_error);
            let basic = builder.basic("basic", &req, &response());
            let advanced = builder.advanced("adv", &req, &response(), "/tmp/kubeconfig");
            assert_eq!(basic.kinds(), SHAPE);
            assert_eq!(advanced.kinds(), SHAPE);
        }
    }

    #[test]
    fn test_options_per_step() {
        let builder = ScenarioBuilder::default();
        let scenario = builder.basic("opts", &request("nslookup x.", true), &response());
        let steps = scenario.steps();

        assert!(steps[1].opts.expect_error);
        assert!(steps[3].opts.expect_error);
        assert!(steps[1].opts.skip_saving_output);
        for (i, step) in steps.iter().enumerate() {
            if i != 1 && i != 3 {
                assert!(!step.opts.expect_error, "step {} must not expect an error", i + 1);
            }
            if i != 5 {
                assert!(step.opts.background_id.is_none());
            }
        }

        let id = background_id(&scenario);
        assert!(id.starts_with("basic-dns-port-forward-"));
        assert!(steps[8].step.describe().ends_with(&id));
    }

    #[test]
    fn test_ids_are_fresh_per_build() {
        let builder = ScenarioBuilder::default();
        let a = builder.advanced("a", &request("nslookup x.", false), &response(), "/k");
        let b = builder.advanced("b", &request("nslookup x.", false), &response(), "/k");
        assert!(background_id(&a).starts_with("adv-dns-port-forward-"));
        // u32 collisions are possible but vanishingly rare
        assert_ne!(background_id(&a), background_id(&b));
    }

    #[test]
    fn test_workload_names_follow_id() {
        let builder = ScenarioBuilder::default();
        let scenario = builder.basic("names", &request("nslookup x.", false), &response());
        let id = background_id(&scenario);
        let create = scenario.steps()[0].step.describe();
        assert!(create.contains(&format!("agnhost-{}", id)));
        let exec = scenario.steps()[1].step.describe();
        assert!(exec.contains(&format!("agnhost-{}-0", id)));
    }

    #[test]
    fn test_settings_flow_into_steps() {
        let builder = ScenarioBuilder::new(ScenarioSettings {
            namespace: "monitoring".to_string(),
            agent_selector: "app=agent".to_string(),
            metrics_port: 9965,
            metrics_path: "/metrics".to_string(),
            sleep_delay: Duration::from_millis(1500),
        });
        let scenario = builder.basic("s", &request("nslookup x.", false), &response());
        assert_eq!(scenario.steps()[2].step.describe(), "sleep 1.5s");
        let forward = scenario.steps()[5].step.describe();
        assert!(forward.starts_with("port-forward 9965 -> app=agent:9965/metrics"));
        assert!(scenario.steps()[0].step.describe().contains("monitoring/"));
    }
}
