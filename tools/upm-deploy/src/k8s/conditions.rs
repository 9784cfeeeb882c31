//! Predicates used when polling the cluster for readiness.

use k8s_openapi::api::core::v1::{Node, Pod};

fn condition_true<'a, I>(conditions: I, type_: &str) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    conditions
        .into_iter()
        .any(|(t, status)| t == type_ && status == "True")
}

pub fn is_node_ready(node: &Node) -> bool {
    let Some(conditions) = node.status.as_ref().and_then(|s| s.conditions.as_ref()) else {
        return false;
    };

    condition_true(
        conditions
            .iter()
            .map(|c| (c.type_.as_str(), c.status.as_str())),
        "Ready",
    )
}

/// A pod counts as ready once it reports the `Ready` condition, or has run
/// to completion as jobs and hooks do.
pub fn is_pod_ready(pod: &Pod) -> bool {
    let Some(status) = &pod.status else {
        return false;
    };

    if status.phase.as_deref() == Some("Succeeded") {
        return true;
    }

    if status.phase.as_deref() != Some("Running") {
        return false;
    }

    let Some(conditions) = &status.conditions else {
        return false;
    };

    condition_true(
        conditions
            .iter()
            .map(|c| (c.type_.as_str(), c.status.as_str())),
        "Ready",
    )
}

/// An empty namespace is not ready, something should have been installed there.
pub fn all_pods_ready(pods: &[Pod]) -> bool {
    !pods.is_empty() && pods.iter().all(is_pod_ready)
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus, PodCondition, PodStatus};

    use super::*;

    fn pod(phase: &str, ready: Option<&str>) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                conditions: ready.map(|status| {
                    vec![PodCondition {
                        type_: "Ready".to_string(),
                        status: status.to_string(),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn node(ready: &str) -> Node {
        Node {
            status: Some(NodeStatus {
                conditions: Some(vec![
                    NodeCondition {
                        type_: "MemoryPressure".to_string(),
                        status: "False".to_string(),
                        ..Default::default()
                    },
                    NodeCondition {
                        type_: "Ready".to_string(),
                        status: ready.to_string(),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn pod_readiness() {
        assert!(is_pod_ready(&pod("Running", Some("True"))));
        assert!(is_pod_ready(&pod("Succeeded", None)));
        assert!(!is_pod_ready(&pod("Running", Some("False"))));
        assert!(!is_pod_ready(&pod("Running", None)));
        assert!(!is_pod_ready(&pod("Pending", Some("True"))));
        assert!(!is_pod_ready(&Pod::default()));
    }

    #[test]
    fn namespace_readiness() {
        assert!(!all_pods_ready(&[]));
        assert!(all_pods_ready(&[
            pod("Running", Some("True")),
            pod("Succeeded", None)
        ]));
        assert!(!all_pods_ready(&[
            pod("Running", Some("True")),
            pod("Pending", None)
        ]));
    }

    #[test]
    fn node_readiness() {
        assert!(is_node_ready(&node("True")));
        assert!(!is_node_ready(&node("Unknown")));
        assert!(!is_node_ready(&Node::default()));
    }
}
