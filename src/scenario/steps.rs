//! Cluster action steps, sleeps and background stops

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::{Step, StepContext, StepKind, StepOutput};
use crate::cluster::{PortForwardSpec, ResourceType};
use crate::common::Result;

/// Create the DNS client StatefulSet
#[derive(Debug, Clone)]
pub struct CreateWorkload {
    pub name: String,
    pub namespace: String,
}

#[async_trait]
impl Step for CreateWorkload {
    fn kind(&self) -> StepKind {
        StepKind::CreateWorkload
    }

    fn describe(&self) -> String {
        format!("create statefulset {}/{}", self.namespace, self.name)
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutput> {
        ctx.cluster.create_workload(&self.name, &self.namespace).await?;
        Ok(StepOutput::none())
    }
}

/// Run a command inside a pod
#[derive(Debug, Clone)]
pub struct ExecInPod {
    pub pod_name: String,
    pub namespace: String,
    pub command: String,
}

#[async_trait]
impl Step for ExecInPod {
    fn kind(&self) -> StepKind {
        StepKind::ExecInPod
    }

    fn describe(&self) -> String {
        format!("exec '{}' in {}/{}", self.command, self.namespace, self.pod_name)
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutput> {
        let output = ctx
            .cluster
            .exec_in_pod(&self.pod_name, &self.namespace, &self.command)
            .await?;
        Ok(StepOutput::text(output))
    }
}

/// Wait a fixed duration
#[derive(Debug, Clone)]
pub struct Sleep {
    pub duration: Duration,
}

#[async_trait]
impl Step for Sleep {
    fn kind(&self) -> StepKind {
        StepKind::Sleep
    }

    fn describe(&self) -> String {
        format!("sleep {}s", self.duration.as_secs_f64())
    }

    async fn run(&self, _ctx: &StepContext) -> Result<StepOutput> {
        tokio::time::sleep(self.duration).await;
        Ok(StepOutput::none())
    }
}

/// Forward a local port to the agent metrics endpoint
#[derive(Debug, Clone)]
pub struct PortForward {
    pub spec: PortForwardSpec,
}

#[async_trait]
impl Step for PortForward {
    fn kind(&self) -> StepKind {
        StepKind::PortForward
    }

    fn describe(&self) -> String {
        let mut description = format!(
            "port-forward {} -> {}:{}/{}",
            self.spec.local_port, self.spec.label_selector, self.spec.remote_port, self.spec.endpoint
        );
        if let Some(affinity) = &self.spec.label_affinity {
            description.push_str(&format!(" (near {})", affinity));
        }
        description
    }

    /// In the foreground the tunnel is only checked: opened, then closed again
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput> {
        let tunnel = ctx.cluster.port_forward(&self.spec).await?;
        let port = tunnel.local_port();
        drop(tunnel);
        Ok(StepOutput::text(format!("tunnel on port {} established", port)))
    }

    async fn launch(&self, ctx: &StepContext) -> Result<BoxFuture<'static, Result<()>>> {
        let tunnel = ctx.cluster.port_forward(&self.spec).await?;
        tracing::debug!(port = tunnel.local_port(), "Tunnel established");
        Ok(tunnel.closed().boxed())
    }
}

/// Stop a background step and wait for it to terminate
#[derive(Debug, Clone)]
pub struct Stop {
    pub background_id: String,
}

#[async_trait]
impl Step for Stop {
    fn kind(&self) -> StepKind {
        StepKind::Stop
    }

    fn describe(&self) -> String {
        format!("stop background task {}", self.background_id)
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutput> {
        ctx.tasks.stop(&self.background_id).await?;
        Ok(StepOutput::none())
    }
}

/// Delete a cluster resource
#[derive(Debug, Clone)]
pub struct DeleteResource {
    pub resource_type: ResourceType,
    pub name: String,
    pub namespace: String,
}

#[async_trait]
impl Step for DeleteResource {
    fn kind(&self) -> StepKind {
        StepKind::DeleteResource
    }

    fn describe(&self) -> String {
        format!("delete {} {}/{}", self.resource_type, self.namespace, self.name)
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutput> {
        ctx.cluster
            .delete_resource(self.resource_type, &self.name, &self.namespace)
            .await?;
        Ok(StepOutput::none())
    }
}
