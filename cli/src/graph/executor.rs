//! Wave-based graph execution
//!
//! Applies a [`ResourceGraph`] one wave at a time. All nodes in a wave run
//! concurrently on a [`JoinSet`]; the outputs of finished waves are snapshotted
//! into an `Arc` before the next wave starts, so in-flight tasks read a frozen,
//! complete view of everything they may reference. A failed node marks its
//! transitive dependents as skipped instead of aborting the run, which leaves
//! the platform in a state a re-run can pick up from.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::graph::node::ResourceNode;
use crate::graph::outputs::{OutputStore, ResourceOutputs};
use crate::graph::ResourceGraph;

/// Applies and removes individual resources. Implementations must be
/// idempotent: applying an existing resource converges it, it never fails
/// because the resource is already there.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    async fn apply(&self, node: &ResourceNode, outputs: &OutputStore) -> Result<ResourceOutputs>;

    async fn destroy(&self, node: &ResourceNode) -> Result<()>;
}

/// Outcome of one apply run.
#[derive(Debug)]
pub struct ApplyReport {
    /// Roles provisioned this run, in completion order
    pub created: Vec<String>,
    /// Roles that failed, with the rendered error chain
    pub failed: Vec<(String, String)>,
    /// Roles skipped because a dependency failed
    pub skipped: Vec<String>,
    /// Outputs of every successful resource
    pub outputs: OutputStore,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Outcome of one destroy run.
#[derive(Debug)]
pub struct DestroyReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl DestroyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

/// Apply every node of the graph in dependency order.
pub async fn apply(
    graph: &ResourceGraph,
    provisioner: Arc<dyn ResourceProvisioner>,
) -> ApplyReport {
    let pb = progress_bar(graph.len() as u64);

    let mut outputs = OutputStore::new();
    let mut created = Vec::new();
    let mut failed: Vec<(String, String)> = Vec::new();
    let mut skipped = Vec::new();
    // Roles whose dependents must not run
    let mut unusable: HashSet<String> = HashSet::new();

    for wave in graph.waves() {
        let snapshot = Arc::new(outputs.clone());
        let mut tasks = JoinSet::new();

        for node in wave {
            if node.depends_on.iter().any(|d| unusable.contains(d)) {
                info!("- {} skipped (dependency failed)", node.role);
                unusable.insert(node.role.clone());
                skipped.push(node.role.clone());
                pb.inc(1);
                continue;
            }

            pb.set_message(node.role.clone());
            let node = node.clone();
            let snapshot = Arc::clone(&snapshot);
            let provisioner = Arc::clone(&provisioner);
            tasks.spawn(async move {
                let result = provisioner.apply(&node, &snapshot).await;
                (node, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (node, result) =
                joined.expect("resource tasks are never aborted and must not panic");
            match result {
                Ok(node_outputs) => {
                    info!("✓ {} ({})", node.role, node.spec.kind());
                    outputs.insert(node.role.clone(), node_outputs);
                    created.push(node.role);
                }
                Err(e) => {
                    error!("✗ {} ({}): {:#}", node.role, node.spec.kind(), e);
                    failed.push((node.role.clone(), format!("{:#}", e)));
                    unusable.insert(node.role);
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    ApplyReport {
        created,
        failed,
        skipped,
        outputs,
    }
}

/// Remove every node of the graph, dependents before dependencies.
///
/// Teardown is best effort: a failed delete is recorded and the walk
/// continues, so one stuck resource does not leave everything else behind.
pub async fn destroy(
    graph: &ResourceGraph,
    provisioner: Arc<dyn ResourceProvisioner>,
) -> DestroyReport {
    let pb = progress_bar(graph.len() as u64);

    let mut deleted = Vec::new();
    let mut failed: Vec<(String, String)> = Vec::new();

    for wave in graph.waves_reversed() {
        let mut tasks = JoinSet::new();

        for node in wave {
            pb.set_message(node.role.clone());
            let node = node.clone();
            let provisioner = Arc::clone(&provisioner);
            tasks.spawn(async move {
                let result = provisioner.destroy(&node).await;
                (node, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (node, result) =
                joined.expect("resource tasks are never aborted and must not panic");
            match result {
                Ok(()) => {
                    info!("✓ {} removed", node.role);
                    deleted.push(node.role);
                }
                Err(e) => {
                    error!("✗ {} not removed: {:#}", node.role, e);
                    failed.push((node.role, format!("{:#}", e)));
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    DestroyReport { deleted, failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{OutputField, ResourceSpec};
    use anyhow::{anyhow, bail};
    use std::sync::Mutex;

    struct Recording {
        log: Mutex<Vec<String>>,
        fail_roles: Vec<String>,
    }

    impl Recording {
        fn new(fail_roles: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                log: Mutex::new(Vec::new()),
                fail_roles: fail_roles.iter().map(|r| r.to_string()).collect(),
            })
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResourceProvisioner for Recording {
        async fn apply(
            &self,
            node: &ResourceNode,
            outputs: &OutputStore,
        ) -> Result<ResourceOutputs> {
            if self.fail_roles.contains(&node.role) {
                bail!("induced failure");
            }
            // Every dependency must already be visible in the snapshot.
            for dep in &node.depends_on {
                outputs
                    .get(dep, OutputField::Name)
                    .ok_or_else(|| anyhow!("{}: missing output of {}", node.role, dep))?;
            }
            self.log.lock().unwrap().push(node.role.clone());
            let mut out = ResourceOutputs::new();
            out.set(OutputField::Name, node.name.clone());
            Ok(out)
        }

        async fn destroy(&self, node: &ResourceNode) -> Result<()> {
            if self.fail_roles.contains(&node.role) {
                bail!("induced failure");
            }
            self.log.lock().unwrap().push(node.role.clone());
            Ok(())
        }
    }

    fn node(role: &str, deps: &[&str]) -> ResourceNode {
        ResourceNode::new(role, format!("demo-{}", role), ResourceSpec::Secret).needs(deps)
    }

    fn position(log: &[String], role: &str) -> usize {
        log.iter().position(|r| r == role).unwrap()
    }

    #[tokio::test]
    async fn test_apply_respects_dependency_order() {
        let graph = ResourceGraph::new(vec![
            node("sa", &[]),
            node("template", &["sa"]),
            node("group", &["template"]),
            node("health", &[]),
            node("backend", &["health", "group"]),
        ])
        .unwrap();

        let recorder = Recording::new(&[]);
        let report = apply(&graph, recorder.clone()).await;

        assert!(report.is_success());
        assert_eq!(report.created.len(), 5);
        let log = recorder.log();
        assert!(position(&log, "sa") < position(&log, "template"));
        assert!(position(&log, "template") < position(&log, "group"));
        assert!(position(&log, "group") < position(&log, "backend"));
        assert_eq!(
            report.outputs.get("backend", OutputField::Name),
            Some("demo-backend")
        );
    }

    #[tokio::test]
    async fn test_apply_failure_skips_transitive_dependents() {
        let graph = ResourceGraph::new(vec![
            node("sa", &[]),
            node("template", &["sa"]),
            node("group", &["template"]),
            node("bucket", &[]),
        ])
        .unwrap();

        let recorder = Recording::new(&["sa"]);
        let report = apply(&graph, recorder).await;

        assert!(!report.is_success());
        assert_eq!(report.created, vec!["bucket"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "sa");
        assert_eq!(report.skipped, vec!["template", "group"]);
    }

    #[tokio::test]
    async fn test_destroy_walks_reverse_order_and_keeps_going() {
        let graph = ResourceGraph::new(vec![
            node("sa", &[]),
            node("template", &["sa"]),
            node("group", &["template"]),
        ])
        .unwrap();

        let recorder = Recording::new(&["template"]);
        let report = destroy(&graph, recorder.clone()).await;

        assert_eq!(report.deleted, vec!["group", "sa"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "template");
        // Dependents are removed before their dependencies.
        let log = recorder.log();
        assert!(position(&log, "group") < position(&log, "sa"));
    }
}
