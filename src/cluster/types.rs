//! The slice of the Kubernetes object model read back from `kubectl -o json`

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct List<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Any namespaced object; only metadata is read
#[derive(Debug, Deserialize)]
pub struct Object {
    pub metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// The managing controller, if any
    pub fn controller(&self) -> Option<&OwnerReference> {
        self.owner_references
            .iter()
            .find(|owner| owner.controller.unwrap_or(false))
    }
}

#[derive(Debug, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub controller: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub node_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodStatus {
    pub phase: Option<String>,
}

impl Pod {
    pub fn is_running(&self) -> bool {
        self.status.phase.as_deref() == Some("Running")
    }

    pub fn node_name(&self) -> Option<&str> {
        self.spec.node_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_controller_and_node() {
        let raw = r#"{
            "metadata": {
                "name": "agnhost-abc-0",
                "ownerReferences": [
                    {"kind": "Node", "name": "n1"},
                    {"kind": "StatefulSet", "name": "agnhost-abc", "controller": true}
                ]
            },
            "spec": {"nodeName": "aks-nodepool-1"},
            "status": {"phase": "Running"}
        }"#;
        let pod: Pod = serde_json::from_str(raw).unwrap();
        let owner = pod.metadata.controller().unwrap();
        assert_eq!(owner.kind, "StatefulSet");
        assert_eq!(owner.name, "agnhost-abc");
        assert_eq!(pod.node_name(), Some("aks-nodepool-1"));
        assert!(pod.is_running());
    }

    #[test]
    fn test_pod_without_owners() {
        let pod: Pod = serde_json::from_str(r#"{"metadata": {"name": "bare"}}"#).unwrap();
        assert!(pod.metadata.controller().is_none());
        assert!(!pod.is_running());
    }

    #[test]
    fn test_pod_list_from_kubectl_get() {
        let raw = r#"{
            "apiVersion": "v1",
            "kind": "List",
            "items": [
                {
                    "metadata": {"name": "retina-agent-x1", "namespace": "kube-system"},
                    "spec": {"nodeName": "n1"},
                    "status": {"phase": "Running"}
                },
                {
                    "metadata": {"name": "retina-agent-x2"},
                    "status": {"phase": "Pending"}
                }
            ],
            "metadata": {"resourceVersion": ""}
        }"#;
        let list: List<Pod> = serde_json::from_str(raw).unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].node_name(), Some("n1"));
        assert!(!list.items[1].is_running());

        let empty: List<Pod> = serde_json::from_str(r#"{"kind": "List"}"#).unwrap();
        assert!(empty.items.is_empty());
    }
}
