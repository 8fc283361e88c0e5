//! Configuration file handling

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Cluster access settings
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Where the network agent runs and exposes metrics
    #[serde(default)]
    pub agent: AgentConfig,

    /// DNS client workload settings
    #[serde(default)]
    pub workload: WorkloadConfig,

    /// Sleep and deadline settings
    #[serde(default)]
    pub timing: Timing,
}

/// Cluster access settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// kubectl executable, either a path or a name looked up in PATH
    #[serde(default = "default_kubectl")]
    pub kubectl: PathBuf,

    /// Kubeconfig passed to kubectl; kubectl's own default applies when unset
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace hosting both the agent and the test workloads
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            kubeconfig: None,
            namespace: default_namespace(),
        }
    }
}

fn default_kubectl() -> PathBuf {
    PathBuf::from("kubectl")
}

fn default_namespace() -> String {
    "kube-system".to_string()
}

/// Agent settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Label selector matching the agent pods
    #[serde(default = "default_label_selector")]
    pub label_selector: String,

    /// Port serving the metrics endpoint, forwarded to the same local port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// HTTP path of the metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            label_selector: default_label_selector(),
            metrics_port: default_metrics_port(),
            metrics_path: default_metrics_path(),
        }
    }
}

fn default_label_selector() -> String {
    "k8s-app=retina".to_string()
}
fn default_metrics_port() -> u16 {
    10093
}
fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// DNS client workload settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkloadConfig {
    /// Container image for the StatefulSet issuing DNS queries
    #[serde(default = "default_image")]
    pub image: String,

    /// How long to wait for the StatefulSet rollout
    #[serde(default = "default_rollout_timeout")]
    pub rollout_timeout_secs: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            rollout_timeout_secs: default_rollout_timeout(),
        }
    }
}

fn default_image() -> String {
    "registry.k8s.io/e2e-test-images/agnhost:2.40".to_string()
}
fn default_rollout_timeout() -> u64 {
    120
}

/// Timing settings in seconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Timing {
    /// Pause inserted between scenario steps for traffic to propagate
    #[serde(default = "default_sleep_delay")]
    pub sleep_delay_secs: u64,

    /// Upper bound for a whole scenario; unbounded when unset
    #[serde(default)]
    pub scenario_timeout_secs: Option<u64>,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            sleep_delay_secs: default_sleep_delay(),
            scenario_timeout_secs: None,
        }
    }
}

fn default_sleep_delay() -> u64 {
    5
}

impl Timing {
    pub fn sleep_delay(&self) -> Duration {
        Duration::from_secs(self.sleep_delay_secs)
    }

    pub fn scenario_timeout(&self) -> Option<Duration> {
        self.scenario_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Resolve the kubectl executable
    ///
    /// Bare names are searched in PATH; explicit paths are used as given
    pub fn kubectl_path(&self) -> Result<PathBuf> {
        let kubectl = &self.cluster.kubectl;
        if kubectl.components().count() > 1 {
            return Ok(kubectl.clone());
        }
        which::which(kubectl).map_err(|e| {
            super::Error::Config(format!("kubectl '{}' not found in PATH: {}", kubectl.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cluster.namespace, "kube-system");
        assert_eq!(config.agent.label_selector, "k8s-app=retina");
        assert_eq!(config.agent.metrics_port, 10093);
        assert_eq!(config.timing.sleep_delay(), Duration::from_secs(5));
        assert!(config.timing.scenario_timeout().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[timing]\nscenario_timeout_secs = 600\n\n[agent]\nmetrics_port = 9965"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.timing.scenario_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.timing.sleep_delay_secs, 5);
        assert_eq!(config.agent.metrics_port, 9965);
        assert_eq!(config.agent.metrics_path, "/metrics");
    }

    #[test]
    fn test_invalid_file_is_config_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timing]\nsleep_delay_secs = \"soon\"").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, crate::Error::ConfigParse(_)));
    }
}
