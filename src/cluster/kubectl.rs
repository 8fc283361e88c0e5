//! [`Cluster`] implementation that shells out to kubectl

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::types::{List, Object, Pod};
use super::{Cluster, PortForwardSpec, ResourceType, Tunnel, WorkloadIdentity};
use crate::common::config::Config;
use crate::common::{Error, Result};

/// How long kubectl port-forward gets to report a listening socket
const FORWARD_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Line kubectl prints once a forwarded port accepts connections
const FORWARDING_MARKER: &str = "Forwarding from";

/// Drives a cluster through the kubectl binary
#[derive(Debug, Clone)]
pub struct Kubectl {
    command: PathBuf,
    kubeconfig: Option<PathBuf>,
    image: String,
    rollout_timeout: Duration,
}

impl Kubectl {
    pub fn new(command: impl Into<PathBuf>, image: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            kubeconfig: None,
            image: image.into(),
            rollout_timeout: Duration::from_secs(120),
        }
    }

    /// Build from the loaded configuration, resolving kubectl in PATH
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut kubectl = Self::new(config.kubectl_path()?, config.workload.image.clone())
            .with_rollout_timeout(Duration::from_secs(config.workload.rollout_timeout_secs));
        if let Some(kubeconfig) = &config.cluster.kubeconfig {
            kubectl = kubectl.with_kubeconfig(kubeconfig);
        }
        Ok(kubectl)
    }

    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    pub fn with_rollout_timeout(mut self, timeout: Duration) -> Self {
        self.rollout_timeout = timeout;
        self
    }

    /// Prepare a kubectl invocation, preferring `kubeconfig` over the configured one
    fn command(&self, kubeconfig: Option<&Path>) -> Command {
        let mut command = Command::new(&self.command);
        if let Some(path) = kubeconfig.or(self.kubeconfig.as_deref()) {
            command.arg("--kubeconfig").arg(path);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        args: &[&str],
        kubeconfig: Option<&Path>,
    ) -> Result<T> {
        let mut command = self.command(kubeconfig);
        command.arg("get").args(args).args(["-o", "json"]);
        let output = run_output(command).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Find the agent pod to forward to, honoring the node affinity label
    async fn forward_target(&self, spec: &PortForwardSpec) -> Result<String> {
        let candidates: List<Pod> = self
            .get_json(&["pods", "-n", &spec.namespace, "-l", &spec.label_selector], None)
            .await?;

        let affinity_nodes = match &spec.label_affinity {
            Some(affinity) => {
                let pods: List<Pod> = self
                    .get_json(&["pods", "-n", &spec.namespace, "-l", affinity], None)
                    .await?;
                let nodes: Vec<String> = pods
                    .items
                    .iter()
                    .filter_map(|pod| pod.node_name().map(str::to_string))
                    .collect();
                Some(nodes)
            }
            None => None,
        };

        choose_forward_target(&candidates.items, affinity_nodes.as_deref())
            .map(|pod| pod.metadata.name.clone())
            .ok_or_else(|| {
                Error::Execution(format!(
                    "no running pod matches '{}' in namespace {}{}",
                    spec.label_selector,
                    spec.namespace,
                    spec.label_affinity
                        .as_ref()
                        .map(|a| format!(" on a node hosting '{}'", a))
                        .unwrap_or_default()
                ))
            })
    }
}

/// Pick a running candidate, restricted to `affinity_nodes` when given
fn choose_forward_target<'a>(candidates: &'a [Pod], affinity_nodes: Option<&[String]>) -> Option<&'a Pod> {
    candidates.iter().filter(|pod| pod.is_running()).find(|pod| match affinity_nodes {
        Some(nodes) => pod
            .node_name()
            .map(|node| nodes.iter().any(|n| n == node))
            .unwrap_or(false),
        None => true,
    })
}

/// StatefulSet running a single agnhost replica labelled `app=<name>`
fn statefulset_manifest(name: &str, namespace: &str, image: &str) -> serde_json::Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": {
            "name": name,
            "namespace": namespace,
        },
        "spec": {
            "serviceName": name,
            "replicas": 1,
            "selector": { "matchLabels": { "app": name } },
            "template": {
                "metadata": { "labels": { "app": name } },
                "spec": {
                    "nodeSelector": { "kubernetes.io/os": "linux" },
                    "containers": [{
                        "name": name,
                        "image": image,
                        "args": ["serve-hostname"],
                        "resources": {
                            "requests": { "cpu": "10m", "memory": "20Mi" },
                            "limits": { "cpu": "100m", "memory": "100Mi" }
                        }
                    }]
                }
            }
        }
    })
}

/// Run a prepared command to completion, returning stdout on success
async fn run_output(command: Command) -> Result<String> {
    let rendered = format!("{:?}", command.as_std());
    let mut command = command;
    let output = command.output().await?;
    if !output.status.success() {
        return Err(Error::Execution(format!(
            "{} exited with {}: {}",
            rendered,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl Cluster for Kubectl {
    async fn create_workload(&self, name: &str, namespace: &str) -> Result<()> {
        let manifest = statefulset_manifest(name, namespace, &self.image);
        tracing::debug!(name, namespace, "Applying StatefulSet");

        let mut command = self.command(None);
        command.args(["apply", "-f", "-"]).stdin(Stdio::piped());
        let mut child = command.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(manifest.to_string().as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::Execution(format!(
                "kubectl apply of statefulset/{} failed: {}",
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut rollout = self.command(None);
        rollout
            .args(["rollout", "status", "-n", namespace])
            .arg(format!("statefulset/{}", name))
            .arg(format!("--timeout={}s", self.rollout_timeout.as_secs()));
        run_output(rollout).await?;
        Ok(())
    }

    async fn exec_in_pod(&self, pod: &str, namespace: &str, command_line: &str) -> Result<String> {
        let argv: Vec<&str> = command_line.split_whitespace().collect();
        if argv.is_empty() {
            return Err(Error::Execution("empty command".to_string()));
        }

        let mut command = self.command(None);
        command
            .args(["exec", "-n", namespace, pod, "--"])
            .args(&argv);
        run_output(command).await
    }

    async fn port_forward(&self, spec: &PortForwardSpec) -> Result<Tunnel> {
        let target = self.forward_target(spec).await?;
        tracing::debug!(pod = %target, local_port = spec.local_port, "Starting port-forward");

        let mut command = self.command(None);
        command
            .args(["port-forward", "-n", &spec.namespace])
            .arg(format!("pod/{}", target))
            .arg(format!("{}:{}", spec.local_port, spec.remote_port));
        let mut child = command.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Execution("port-forward stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Execution("port-forward stderr unavailable".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut errors = BufReader::new(stderr).lines();

        let ready = tokio::time::timeout(FORWARD_READY_TIMEOUT, async {
            while let Some(line) = lines.next_line().await? {
                if line.starts_with(FORWARDING_MARKER) {
                    return Ok(true);
                }
            }
            Ok::<bool, std::io::Error>(false)
        })
        .await;

        match ready {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                let mut reason = Vec::new();
                while let Ok(Some(line)) = errors.next_line().await {
                    reason.push(line);
                }
                let status = child.wait().await?;
                return Err(Error::Execution(format!(
                    "port-forward to pod/{} exited with {}: {}",
                    target,
                    status,
                    reason.join("; ")
                )));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(Error::Execution(format!(
                    "port-forward to pod/{} not ready after {}s",
                    target,
                    FORWARD_READY_TIMEOUT.as_secs()
                )))
            }
        }

        // Owns the child: dropping this future kills kubectl.
        let closed = async move {
            let drain_out = async {
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!("port-forward: {}", line);
                }
            };
            let drain_err = async {
                while let Ok(Some(line)) = errors.next_line().await {
                    tracing::debug!("port-forward stderr: {}", line);
                }
            };
            tokio::join!(drain_out, drain_err);
            let status = child.wait().await?;
            Err::<(), Error>(Error::Execution(format!(
                "port-forward to pod/{} exited with {}",
                target, status
            )))
        }
        .boxed();

        Ok(Tunnel::new(spec.local_port, closed))
    }

    async fn delete_resource(
        &self,
        resource_type: ResourceType,
        name: &str,
        namespace: &str,
    ) -> Result<()> {
        let mut command = self.command(None);
        command
            .args(["delete", resource_type.as_str(), name, "-n", namespace])
            .args(["--ignore-not-found", "--wait=true"]);
        run_output(command).await?;
        Ok(())
    }

    async fn resolve_workload_for_pod(
        &self,
        pod: &str,
        namespace: &str,
        kubeconfig: &Path,
    ) -> Result<WorkloadIdentity> {
        let object: Pod = self
            .get_json(&["pod", pod, "-n", namespace], Some(kubeconfig))
            .await
            .map_err(|e| Error::resolution(pod, e))?;

        let owner = object
            .metadata
            .controller()
            .ok_or_else(|| Error::resolution(pod, "pod has no controlling owner"))?;

        if owner.kind != "ReplicaSet" {
            return Ok(WorkloadIdentity::new(&owner.kind, &owner.name));
        }

        // Deployments own pods through a ReplicaSet
        let replica_set: Object = self
            .get_json(&["replicaset", &owner.name, "-n", namespace], Some(kubeconfig))
            .await
            .map_err(|e| Error::resolution(pod, e))?;
        Ok(match replica_set.metadata.controller() {
            Some(deployment) => WorkloadIdentity::new(&deployment.kind, &deployment.name),
            None => WorkloadIdentity::new(&owner.kind, &owner.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(name: &str, node: &str, phase: &str) -> Pod {
        serde_json::from_value(json!({
            "metadata": { "name": name },
            "spec": { "nodeName": node },
            "status": { "phase": phase }
        }))
        .unwrap()
    }

    #[test]
    fn test_choose_forward_target_without_affinity() {
        let pods = vec![pod("retina-a", "n1", "Pending"), pod("retina-b", "n2", "Running")];
        let chosen = choose_forward_target(&pods, None).unwrap();
        assert_eq!(chosen.metadata.name, "retina-b");
    }

    #[test]
    fn test_choose_forward_target_with_affinity() {
        let pods = vec![
            pod("retina-a", "n1", "Running"),
            pod("retina-b", "n2", "Running"),
        ];
        let nodes = vec!["n2".to_string()];
        let chosen = choose_forward_target(&pods, Some(&nodes)).unwrap();
        assert_eq!(chosen.metadata.name, "retina-b");

        let elsewhere = vec!["n3".to_string()];
        assert!(choose_forward_target(&pods, Some(&elsewhere)).is_none());
    }

    #[test]
    fn test_statefulset_manifest_labels() {
        let manifest = statefulset_manifest("agnhost-x", "kube-system", "agnhost:2.40");
        assert_eq!(manifest["kind"], "StatefulSet");
        assert_eq!(manifest["metadata"]["namespace"], "kube-system");
        assert_eq!(manifest["spec"]["selector"]["matchLabels"]["app"], "agnhost-x");
        assert_eq!(
            manifest["spec"]["template"]["metadata"]["labels"]["app"],
            "agnhost-x"
        );
        assert_eq!(
            manifest["spec"]["template"]["spec"]["containers"][0]["image"],
            "agnhost:2.40"
        );
    }
}
