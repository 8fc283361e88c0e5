//! DNS metric validation steps
//!
//! Request and response validation come in a basic form (coarse labels) and
//! an advanced form that is scoped to one pod and cross-checks the workload
//! the agent attributed the traffic to.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{Step, StepContext, StepKind, StepOutput};
use crate::cluster::WorkloadIdentity;
use crate::common::{Error, Result};
use crate::metrics::{self, LabelPredicate, MetricSample};

const BASIC_REQUEST_METRIC: &str = "networkobservability_dns_request_count";
const BASIC_RESPONSE_METRIC: &str = "networkobservability_dns_response_count";
const ADVANCED_REQUEST_METRIC: &str = "networkobservability_adv_dns_request_count";
const ADVANCED_RESPONSE_METRIC: &str = "networkobservability_adv_dns_response_count";

const LABEL_QUERY: &str = "query";
const LABEL_QUERY_TYPE: &str = "query_type";
const LABEL_NUM_RESPONSE: &str = "num_response";
const LABEL_RETURN_CODE: &str = "return_code";
const LABEL_RESPONSE: &str = "response";
const LABEL_NAMESPACE: &str = "namespace";
const LABEL_POD: &str = "podname";
const LABEL_WORKLOAD_KIND: &str = "workload_kind";
const LABEL_WORKLOAD_NAME: &str = "workload_name";

/// Pod and workload the advanced validations are scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadScope {
    pub namespace: String,
    pub pod_name: String,
    pub workload_kind: String,
    pub workload_name: String,
    /// Credentials used to look up the pod's owner
    pub kubeconfig: PathBuf,
}

impl WorkloadScope {
    fn narrow(&self, predicate: LabelPredicate) -> LabelPredicate {
        predicate
            .equals(LABEL_NAMESPACE, &self.namespace)
            .equals(LABEL_POD, &self.pod_name)
    }

    /// Check the sample's workload labels against the pod's actual owner
    async fn cross_check(
        &self,
        ctx: &StepContext,
        metric: &str,
        sample: &MetricSample,
    ) -> Result<()> {
        let resolved = ctx
            .cluster
            .resolve_workload_for_pod(&self.pod_name, &self.namespace, &self.kubeconfig)
            .await
            .map_err(|e| match e {
                Error::Resolution { .. } => e,
                other => Error::resolution(&self.pod_name, other),
            })?;

        let attributed = WorkloadIdentity::new(
            sample.label(LABEL_WORKLOAD_KIND).unwrap_or_default(),
            sample.label(LABEL_WORKLOAD_NAME).unwrap_or_default(),
        );
        if attributed != resolved {
            return Err(Error::WorkloadMismatch {
                metric: metric.to_string(),
                expected: resolved.to_string(),
                actual: attributed.to_string(),
            });
        }

        let declared = WorkloadIdentity::new(&self.workload_kind, &self.workload_name);
        if declared != resolved {
            return Err(Error::WorkloadMismatch {
                metric: metric.to_string(),
                expected: declared.to_string(),
                actual: resolved.to_string(),
            });
        }
        Ok(())
    }
}

/// Where the forwarded metrics endpoint listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsEndpoint {
    pub port: u16,
    pub path: String,
}

/// Validate the DNS request counter
#[derive(Debug, Clone)]
pub struct ValidateRequestMetrics {
    pub num_response: String,
    pub query: String,
    pub query_type: String,
    pub expected_count: Option<String>,
    pub endpoint: MetricsEndpoint,
    /// Present for the advanced form
    pub scope: Option<WorkloadScope>,
}

impl ValidateRequestMetrics {
    fn metric(&self) -> &'static str {
        if self.scope.is_some() {
            ADVANCED_REQUEST_METRIC
        } else {
            BASIC_REQUEST_METRIC
        }
    }

    fn predicate(&self) -> LabelPredicate {
        let predicate = LabelPredicate::new()
            .param(LABEL_QUERY, &self.query)
            .param(LABEL_QUERY_TYPE, &self.query_type)
            .param(LABEL_NUM_RESPONSE, &self.num_response);
        match &self.scope {
            Some(scope) => scope.narrow(predicate),
            None => predicate,
        }
    }
}

#[async_trait]
impl Step for ValidateRequestMetrics {
    fn kind(&self) -> StepKind {
        StepKind::ValidateRequestMetrics
    }

    fn describe(&self) -> String {
        format!("validate {}{}", self.metric(), self.predicate())
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutput> {
        validate(
            ctx,
            self.metric(),
            &self.predicate(),
            self.expected_count.as_deref(),
            &self.endpoint,
            self.scope.as_ref(),
        )
        .await
    }
}

/// Validate the DNS response counter
#[derive(Debug, Clone)]
pub struct ValidateResponseMetrics {
    pub num_response: String,
    pub query: String,
    pub query_type: String,
    pub return_code: String,
    pub response: String,
    pub expected_count: Option<String>,
    pub endpoint: MetricsEndpoint,
    /// Present for the advanced form
    pub scope: Option<WorkloadScope>,
}

impl ValidateResponseMetrics {
    fn metric(&self) -> &'static str {
        if self.scope.is_some() {
            ADVANCED_RESPONSE_METRIC
        } else {
            BASIC_RESPONSE_METRIC
        }
    }

    fn predicate(&self) -> LabelPredicate {
        let predicate = LabelPredicate::new()
            .param(LABEL_QUERY, &self.query)
            .param(LABEL_QUERY_TYPE, &self.query_type)
            .param(LABEL_NUM_RESPONSE, &self.num_response)
            .param(LABEL_RETURN_CODE, &self.return_code)
            .param(LABEL_RESPONSE, &self.response);
        match &self.scope {
            Some(scope) => scope.narrow(predicate),
            None => predicate,
        }
    }
}

#[async_trait]
impl Step for ValidateResponseMetrics {
    fn kind(&self) -> StepKind {
        StepKind::ValidateResponseMetrics
    }

    fn describe(&self) -> String {
        format!("validate {}{}", self.metric(), self.predicate())
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutput> {
        validate(
            ctx,
            self.metric(),
            &self.predicate(),
            self.expected_count.as_deref(),
            &self.endpoint,
            self.scope.as_ref(),
        )
        .await
    }
}

async fn validate(
    ctx: &StepContext,
    metric: &str,
    predicate: &LabelPredicate,
    expected: Option<&str>,
    endpoint: &MetricsEndpoint,
    scope: Option<&WorkloadScope>,
) -> Result<StepOutput> {
    let samples = metrics::fetch_samples(ctx.metrics.as_ref(), endpoint.port, &endpoint.path).await?;
    let count = match scope {
        None => metrics::validate_single(&samples, metric, predicate, expected)?.1,
        Some(scope) => {
            // Attribution is checked before the value
            let sample = metrics::find_single(&samples, metric, predicate)?;
            scope.cross_check(ctx, metric, sample).await?;
            metrics::check_count(sample, expected)?
        }
    };
    tracing::debug!(metric, %predicate, count, "Metric validated");
    Ok(StepOutput::text(format!("{}{} = {}", metric, predicate, count)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> MetricsEndpoint {
        MetricsEndpoint {
            port: 10093,
            path: "/metrics".to_string(),
        }
    }

    fn scope() -> WorkloadScope {
        WorkloadScope {
            namespace: "kube-system".to_string(),
            pod_name: "agnhost-adv-1-0".to_string(),
            workload_kind: "StatefulSet".to_string(),
            workload_name: "agnhost-adv-1".to_string(),
            kubeconfig: PathBuf::from("/tmp/kubeconfig"),
        }
    }

    #[test]
    fn test_basic_request_metric_and_labels() {
        let step = ValidateRequestMetrics {
            num_response: "0".to_string(),
            query: "kubernetes.default.svc.cluster.local.".to_string(),
            query_type: "A".to_string(),
            expected_count: None,
            endpoint: endpoint(),
            scope: None,
        };
        assert_eq!(step.metric(), BASIC_REQUEST_METRIC);
        assert_eq!(
            step.predicate().to_string(),
            r#"{query="kubernetes.default.svc.cluster.local.", query_type="A", num_response="0"}"#
        );
    }

    #[test]
    fn test_advanced_response_is_pod_scoped() {
        let step = ValidateResponseMetrics {
            num_response: "0".to_string(),
            query: "some.non.existent.domain.".to_string(),
            query_type: "A".to_string(),
            return_code: "NXDOMAIN".to_string(),
            response: crate::scenario::EMPTY_RESPONSE.to_string(),
            expected_count: None,
            endpoint: endpoint(),
            scope: Some(scope()),
        };
        assert_eq!(step.metric(), ADVANCED_RESPONSE_METRIC);
        let predicate = step.predicate().to_string();
        assert!(predicate.contains(r#"response="emptyResponse""#));
        assert!(predicate.contains(r#"namespace="kube-system""#));
        assert!(predicate.contains(r#"podname="agnhost-adv-1-0""#));
    }
}
