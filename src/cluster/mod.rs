//! Cluster operations consumed by scenario steps
//!
//! The engine only talks to the cluster through the [`Cluster`] trait. The
//! [`Kubectl`] implementation drives a real cluster; tests provide their own.

mod kubectl;
mod types;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::common::Result;

pub use kubectl::Kubectl;

/// Kubernetes resource kinds the harness creates and deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    StatefulSet,
    Deployment,
    DaemonSet,
    Pod,
}

impl ResourceType {
    /// Resource name as understood by kubectl
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::StatefulSet => "statefulset",
            ResourceType::Deployment => "deployment",
            ResourceType::DaemonSet => "daemonset",
            ResourceType::Pod => "pod",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller resource owning a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadIdentity {
    pub kind: String,
    pub name: String,
}

impl WorkloadIdentity {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// What to forward and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortForwardSpec {
    pub namespace: String,
    /// Selects the candidate pods to forward to
    pub label_selector: String,
    pub local_port: u16,
    pub remote_port: u16,
    /// Endpoint served behind the tunnel, informational
    pub endpoint: String,
    /// Prefer a candidate on the same node as a pod carrying this label
    pub label_affinity: Option<String>,
}

/// An established port-forward tunnel
///
/// Dropping the tunnel tears it down.
pub struct Tunnel {
    local_port: u16,
    closed: BoxFuture<'static, Result<()>>,
}

impl Tunnel {
    /// `closed` must only resolve when the tunnel goes away on its own
    pub fn new(local_port: u16, closed: BoxFuture<'static, Result<()>>) -> Self {
        Self { local_port, closed }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Wait until the tunnel closes by itself
    pub async fn closed(self) -> Result<()> {
        self.closed.await
    }
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tunnel")
            .field("local_port", &self.local_port)
            .finish_non_exhaustive()
    }
}

/// Cluster operations used by the scenario steps
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Create the DNS client StatefulSet and wait for it to roll out
    async fn create_workload(&self, name: &str, namespace: &str) -> Result<()>;

    /// Run `command` inside `pod`, returning its stdout
    async fn exec_in_pod(&self, pod: &str, namespace: &str, command: &str) -> Result<String>;

    /// Open a tunnel; returns once the tunnel accepts connections
    async fn port_forward(&self, spec: &PortForwardSpec) -> Result<Tunnel>;

    async fn delete_resource(
        &self,
        resource_type: ResourceType,
        name: &str,
        namespace: &str,
    ) -> Result<()>;

    /// Look up the controller owning `pod`, using the credentials at `kubeconfig`
    async fn resolve_workload_for_pod(
        &self,
        pod: &str,
        namespace: &str,
        kubeconfig: &Path,
    ) -> Result<WorkloadIdentity>;
}
