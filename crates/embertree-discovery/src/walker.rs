//! Worklist discovery over the provider tree
//!
//! Walks the tree in sibling order from a starting container and registers
//! every parameter leaf that passes the scope and filter rules:
//! - scopes bound which containers are entered
//! - node filters match substrings of the accumulated label
//! - parameter filters match leaf identifiers exactly
//!
//! The walk stops as soon as the monitored set is full, and abandons
//! itself if the registry is rebuilt underneath it.

use embertree_core::{
    Generation, MonitorConfig, NodeHandle, ParseScope, RegistryError, TreeNode,
    MAX_MONITORED,
};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::monitor::{Monitor, RegisterError};

/// Summary of one discovery walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// Nodes read from the provider
    pub visited: usize,
    /// Leaves added to the monitored set
    pub registered: usize,
    /// Leaves whose registration failed
    pub failed: usize,
    /// Offline containers not entered
    pub skipped_offline: usize,
    /// Stopped because the monitored set was full
    pub halted_at_capacity: bool,
    /// Stopped because the registry was rebuilt
    pub abandoned: bool,
}

/// Scope and filter rules applied during a walk
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryRules<'a> {
    pub scopes: &'a [ParseScope],
    pub node_filters: &'a [String],
    pub parameter_filters: &'a [String],
}

impl<'a> DiscoveryRules<'a> {
    pub fn from_config(config: &'a MonitorConfig) -> Self {
        Self {
            scopes: &config.scopes,
            node_filters: &config.node_filters,
            parameter_filters: &config.parameter_filters,
        }
    }

    /// Whether a child reached from a node at `depth` may be entered
    pub fn admits(&self, depth: usize, child_path: &str) -> bool {
        if self.scopes.is_empty() {
            return true;
        }
        self.scopes.iter().any(|scope| {
            (depth >= scope.depth() && child_path.starts_with(scope.path.as_str()))
                || (depth < scope.depth() && scope.path.starts_with(child_path))
        })
    }

    /// Whether a leaf with this label and identifier should be registered
    pub fn accepts(&self, label: &str, identifier: &str) -> bool {
        let identifier_matches = || self.parameter_filters.iter().any(|f| f == identifier);

        if !self.node_filters.is_empty() {
            self.node_filters.iter().any(|f| label.contains(f.as_str()))
                && (self.parameter_filters.is_empty() || identifier_matches())
        } else if !self.parameter_filters.is_empty() {
            identifier_matches()
        } else {
            true
        }
    }
}

#[derive(Debug)]
struct WorkItem {
    handle: NodeHandle,
    label: String,
    depth: usize,
    needs_fetch: bool,
}

enum Capacity {
    Open,
    Full,
    Stale,
}

/// One discovery pass bound to a registry generation
pub struct TreeWalker<'a> {
    monitor: &'a Monitor,
    rules: DiscoveryRules<'a>,
    generation: Generation,
}

impl<'a> TreeWalker<'a> {
    pub fn new(monitor: &'a Monitor, rules: DiscoveryRules<'a>, generation: Generation) -> Self {
        Self {
            monitor,
            rules,
            generation,
        }
    }

    /// Walk from `start`, which is read as-is (its directory is not fetched)
    pub async fn discover(&self, start: NodeHandle) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let mut work = vec![WorkItem {
            handle: start,
            label: String::new(),
            depth: 0,
            needs_fetch: false,
        }];

        while let Some(item) = work.pop() {
            match self.capacity().await {
                Capacity::Open => {}
                Capacity::Full => {
                    warn!(limit = MAX_MONITORED, "Monitored set is full, stopping discovery");
                    report.halted_at_capacity = true;
                    break;
                }
                Capacity::Stale => {
                    debug!("Discovery superseded by a newer configuration");
                    report.abandoned = true;
                    break;
                }
            }

            let provider = self.monitor.provider();
            if item.needs_fetch {
                if let Err(e) = provider.fetch_directory(item.handle).await {
                    error!(label = %item.label, error = %e, "Failed to fetch directory");
                    continue;
                }
            }
            let node = match provider.node(item.handle).await {
                Ok(node) => node,
                Err(e) => {
                    warn!(handle = %item.handle, error = %e, "Node vanished during discovery");
                    continue;
                }
            };
            report.visited += 1;
            trace!(path = %node.path, depth = item.depth, "Visiting node");

            if node.is_parameter() {
                if !self.rules.accepts(&item.label, &node.identifier) {
                    continue;
                }
                match self
                    .monitor
                    .register_leaf(self.generation, &node, &item.label)
                    .await
                {
                    Ok(()) => report.registered += 1,
                    Err(RegisterError::Registry(RegistryError::Full(limit))) => {
                        warn!(label = %item.label, limit = limit, "Monitored set is full, stopping discovery");
                        report.halted_at_capacity = true;
                        break;
                    }
                    Err(RegisterError::Registry(RegistryError::Stale { .. })) => {
                        report.abandoned = true;
                        break;
                    }
                    Err(e) => {
                        error!(label = %item.label, path = %node.path, error = %e, "Failed to register parameter");
                        report.failed += 1;
                    }
                }
                continue;
            }

            let children = self.admitted_children(&node, &item, &mut report).await;
            // stack order: first child on top
            work.extend(children.into_iter().rev());
        }

        info!(
            visited = report.visited,
            registered = report.registered,
            failed = report.failed,
            "Discovery finished"
        );
        report
    }

    async fn admitted_children(
        &self,
        node: &TreeNode,
        item: &WorkItem,
        report: &mut DiscoveryReport,
    ) -> Vec<WorkItem> {
        let mut next = Vec::with_capacity(node.children.len());
        for handle in &node.children {
            let child = match self.monitor.provider().node(*handle).await {
                Ok(child) => child,
                Err(e) => {
                    warn!(handle = %handle, error = %e, "Failed to read child");
                    continue;
                }
            };
            if child.is_node() && !child.is_online() {
                debug!(path = %child.path, "Skipping offline node");
                report.skipped_offline += 1;
                continue;
            }
            if !self.rules.admits(item.depth, &child.path) {
                continue;
            }

            let label = if item.label.is_empty() {
                child.label_segment()
            } else {
                format!("{}.{}", item.label, child.label_segment())
            };
            next.push(WorkItem {
                handle: child.handle,
                label,
                depth: item.depth + 1,
                needs_fetch: child.is_node(),
            });
        }
        next
    }

    async fn capacity(&self) -> Capacity {
        let registry = self.monitor.registry().read().await;
        if registry.generation() != self.generation {
            Capacity::Stale
        } else if registry.is_full() {
            Capacity::Full
        } else {
            Capacity::Open
        }
    }
}

impl Monitor {
    /// Walk the tree from `root` and register every admitted leaf
    pub async fn register_from_discovery(
        &self,
        generation: Generation,
        root: NodeHandle,
        config: &MonitorConfig,
    ) -> DiscoveryReport {
        info!(
            scopes = config.scopes.len(),
            node_filters = config.node_filters.len(),
            parameter_filters = config.parameter_filters.len(),
            "Start tree discovery"
        );
        TreeWalker::new(self, DiscoveryRules::from_config(config), generation)
            .discover(root)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embertree_core::MonitorRegistry;
    use embertree_provider::{MemoryProvider, SnapshotNode, TreeProvider, TreeSnapshot};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn console() -> TreeSnapshot {
        serde_json::from_str(
            r#"{"children": [
                {"identifier": "Console", "children": [
                    {"identifier": "Channel#1", "children": [
                        {"identifier": "Gain", "parameter": {"value": 3}},
                        {"identifier": "Mute", "parameter": {"value": false}}
                    ]},
                    {"identifier": "Channel#2", "children": [
                        {"identifier": "Gain", "parameter": {"value": 4}},
                        {"identifier": "Mute", "parameter": {"value": true}}
                    ]},
                    {"identifier": "Spare", "online": false, "children": [
                        {"identifier": "Gain", "parameter": {"value": 0}}
                    ]}
                ]},
                {"identifier": "Master", "parameter": {"value": 10}}
            ]}"#,
        )
        .unwrap()
    }

    fn monitor_for(provider: MemoryProvider) -> (Arc<MemoryProvider>, Monitor) {
        let provider = Arc::new(provider);
        let monitor = Monitor::new(
            provider.clone(),
            Arc::new(RwLock::new(MonitorRegistry::new())),
        );
        (provider, monitor)
    }

    async fn discover(monitor: &Monitor, config: &MonitorConfig) -> DiscoveryReport {
        let generation = monitor.registry().read().await.generation();
        let root = monitor.provider().root();
        monitor.register_from_discovery(generation, root, config).await
    }

    async fn labels(monitor: &Monitor) -> Vec<String> {
        monitor
            .registry()
            .read()
            .await
            .labels()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_scope_admission() {
        let scopes = vec![ParseScope::new("1.2")];
        let rules = DiscoveryRules {
            scopes: &scopes,
            node_filters: &[],
            parameter_filters: &[],
        };
        assert!(rules.admits(0, "1"));
        assert!(rules.admits(1, "1.2"));
        assert!(!rules.admits(1, "1.1"));
        assert!(rules.admits(2, "1.2.3"));
        assert!(!rules.admits(2, "1.3.1"));

        let other = vec![ParseScope::new("1.5")];
        let rules = DiscoveryRules {
            scopes: &other,
            ..rules
        };
        assert!(!rules.admits(1, "1.2"));
        assert!(!rules.admits(2, "1.2.3"));

        let several = ParseScope::parse_list("1.5,1.1,2");
        let rules = DiscoveryRules {
            scopes: &several,
            ..rules
        };
        assert!(rules.admits(0, "1"));
        assert!(rules.admits(0, "2"));
        assert!(rules.admits(2, "1.1.2"));
        assert!(!rules.admits(1, "1.2"));
        assert!(!rules.admits(0, "3"));
    }

    #[test]
    fn test_filter_rules() {
        let node_filters = vec!["Channel".to_string()];
        let parameter_filters = vec!["Gain".to_string()];
        let both = DiscoveryRules {
            scopes: &[],
            node_filters: &node_filters,
            parameter_filters: &parameter_filters,
        };
        assert!(both.accepts("Console.Channel1.Gain", "Gain"));
        assert!(!both.accepts("Console.Channel1.Mute", "Mute"));
        assert!(!both.accepts("Master", "Gain"));

        let nodes_only = DiscoveryRules {
            parameter_filters: &[],
            ..both
        };
        assert!(nodes_only.accepts("Console.Channel1.Mute", "Mute"));

        let params_only = DiscoveryRules {
            node_filters: &[],
            ..both
        };
        assert!(params_only.accepts("Master.Gain", "Gain"));
        assert!(!params_only.accepts("Master", "Master"));
    }

    #[tokio::test]
    async fn test_discover_whole_tree() {
        let (provider, monitor) = monitor_for(MemoryProvider::new(&console()).0);
        let report = discover(&monitor, &MonitorConfig::default()).await;

        assert_eq!(report.registered, 5);
        assert_eq!(report.skipped_offline, 1);
        assert_eq!(
            labels(&monitor).await,
            vec![
                "Console.Channel1.Gain",
                "Console.Channel1.Mute",
                "Console.Channel2.Gain",
                "Console.Channel2.Mute",
                "Master",
            ]
        );

        let registry = monitor.registry().read().await;
        assert_eq!(registry.path_for("Console.Channel2.Gain"), Some("1.2.1"));
        assert_eq!(registry.value("Console.Channel1.Mute"), Some("false"));
        assert!(provider.is_subscribed("1.2.2").await);
        assert!(!provider.is_subscribed("1.3.1").await);
    }

    #[tokio::test]
    async fn test_discover_with_scope() {
        let (_provider, monitor) = monitor_for(MemoryProvider::new(&console()).0);
        let config = MonitorConfig {
            scopes: vec![ParseScope::new("1.2")],
            ..Default::default()
        };
        discover(&monitor, &config).await;
        assert_eq!(
            labels(&monitor).await,
            vec!["Console.Channel2.Gain", "Console.Channel2.Mute"]
        );

        let (_provider, monitor) = monitor_for(MemoryProvider::new(&console()).0);
        let config = MonitorConfig {
            scopes: vec![ParseScope::new("1.5")],
            ..Default::default()
        };
        let report = discover(&monitor, &config).await;
        assert_eq!(report.registered, 0);
    }

    #[tokio::test]
    async fn test_discover_with_several_scopes() {
        let (_provider, monitor) = monitor_for(MemoryProvider::new(&console()).0);
        let config = MonitorConfig {
            scopes: ParseScope::parse_list("1.5, 1.1, 2"),
            ..Default::default()
        };
        let report = discover(&monitor, &config).await;
        assert_eq!(report.registered, 3);
        assert_eq!(
            labels(&monitor).await,
            vec!["Console.Channel1.Gain", "Console.Channel1.Mute", "Master"]
        );
    }

    #[tokio::test]
    async fn test_discover_with_filters() {
        let (_provider, monitor) = monitor_for(MemoryProvider::new(&console()).0);
        let config = MonitorConfig {
            node_filters: vec!["Channel2".to_string()],
            parameter_filters: vec!["Mute".to_string()],
            ..Default::default()
        };
        discover(&monitor, &config).await;
        assert_eq!(labels(&monitor).await, vec!["Console.Channel2.Mute"]);
    }

    #[tokio::test]
    async fn test_lazy_tree_fetches_before_descending() {
        let (provider, _rx) = MemoryProvider::new(&console());
        let (provider, monitor) = monitor_for(provider.lazy());
        provider.fetch_directory(provider.root()).await.unwrap();

        let report = discover(&monitor, &MonitorConfig::default()).await;
        assert_eq!(report.registered, 5);

        let requested: Vec<NodeHandle> = provider.directory_requests().await;
        // root, Console, Channel#1, Channel#2; the offline node is never fetched
        assert_eq!(requested.len(), 4);
    }

    #[tokio::test]
    async fn test_subscribe_failure_does_not_abort_siblings() {
        let (provider, monitor) = monitor_for(MemoryProvider::new(&console()).0);
        provider.reject_subscribe("1.1.1").await.unwrap();

        let report = discover(&monitor, &MonitorConfig::default()).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.registered, 4);
        assert_eq!(
            monitor.registry().read().await.value("Console.Channel1.Mute"),
            Some("false")
        );
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        let leaves = (0..MAX_MONITORED + 100)
            .map(|i| SnapshotNode {
                identifier: format!("P{}", i),
                number: None,
                online: true,
                parameter: Some(embertree_core::Parameter::new((i as i64).into())),
                children: Vec::new(),
            })
            .collect();
        let snapshot = TreeSnapshot {
            children: vec![SnapshotNode {
                identifier: "Bank".to_string(),
                number: None,
                online: true,
                parameter: None,
                children: leaves,
            }],
        };
        let (_provider, monitor) = monitor_for(MemoryProvider::new(&snapshot).0);

        let report = discover(&monitor, &MonitorConfig::default()).await;
        assert!(report.halted_at_capacity);
        assert_eq!(report.registered, MAX_MONITORED);
        assert_eq!(monitor.registry().read().await.len(), MAX_MONITORED);
    }

    #[tokio::test]
    async fn test_rebuild_abandons_walk() {
        let (_provider, monitor) = monitor_for(MemoryProvider::new(&console()).0);
        let stale = monitor.registry().read().await.generation();
        monitor.rebuild().await;

        let report = monitor
            .register_from_discovery(stale, NodeHandle::ROOT, &MonitorConfig::default())
            .await;
        assert!(report.abandoned);
        assert_eq!(report.visited, 0);
        assert!(monitor.registry().read().await.is_empty());
    }
}
