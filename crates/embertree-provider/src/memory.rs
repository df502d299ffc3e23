//! In-memory provider backed by a tree snapshot
//!
//! Stands in for a connected device: it serves lookups and directory
//! requests from a snapshot, applies writes, and pushes value changes for
//! subscribed leaves onto its notification channel. In lazy mode a
//! container's children stay hidden until its directory is fetched, which
//! is how a real provider behaves before `GetDirectory`.

use async_trait::async_trait;
use embertree_core::{NodeContents, NodeHandle, Parameter, ParameterType, RawValue, TreeNode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};

use crate::provider::{ProviderError, TreeProvider, ValueChange};

/// A node in a tree snapshot file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub identifier: String,
    /// Sibling number; defaults to the 1-based position among siblings
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default = "default_true")]
    pub online: bool,
    /// Present for parameters
    #[serde(default)]
    pub parameter: Option<Parameter>,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

fn default_true() -> bool {
    true
}

/// Root of a tree snapshot file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeSnapshot {
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

impl TreeSnapshot {
    /// Load a snapshot from a JSON file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// A write accepted by the memory provider
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub path: String,
    pub value: RawValue,
    pub value_type: ParameterType,
}

#[derive(Debug, Default)]
struct MemoryTree {
    nodes: HashMap<NodeHandle, TreeNode>,
    by_path: HashMap<String, NodeHandle>,
    expanded: HashSet<NodeHandle>,
    subscribed: HashSet<NodeHandle>,
    reject_subscribe: HashSet<NodeHandle>,
    reject_writes: bool,
    directory_requests: Vec<NodeHandle>,
    writes: Vec<WriteRecord>,
}

impl MemoryTree {
    fn get(&self, handle: NodeHandle) -> Result<&TreeNode, ProviderError> {
        self.nodes
            .get(&handle)
            .ok_or(ProviderError::UnknownHandle(handle))
    }

    fn handle_for(&self, path: &str) -> Result<NodeHandle, ProviderError> {
        self.by_path
            .get(path)
            .copied()
            .ok_or_else(|| ProviderError::NotFound(path.to_string()))
    }

    fn insert(
        &mut self,
        snapshot: &SnapshotNode,
        position: usize,
        parent: NodeHandle,
        parent_path: &str,
    ) {
        let handle = NodeHandle(self.nodes.len() as u64);
        let number = snapshot.number.unwrap_or(position as u32 + 1);
        let path = if parent_path.is_empty() {
            number.to_string()
        } else {
            format!("{}.{}", parent_path, number)
        };
        let contents = match &snapshot.parameter {
            Some(p) => NodeContents::Parameter(p.clone()),
            None => NodeContents::Node {
                online: snapshot.online,
            },
        };

        self.nodes.insert(
            handle,
            TreeNode {
                handle,
                number,
                identifier: snapshot.identifier.clone(),
                path: path.clone(),
                contents,
                children: Vec::new(),
            },
        );
        self.by_path.insert(path.clone(), handle);

        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(handle);
        }

        for (i, child) in snapshot.children.iter().enumerate() {
            self.insert(child, i, handle, &path);
        }
    }
}

/// Snapshot-backed [`TreeProvider`]
pub struct MemoryProvider {
    tree: RwLock<MemoryTree>,
    lazy: bool,
    notify: mpsc::UnboundedSender<ValueChange>,
}

impl MemoryProvider {
    /// Build a provider from a snapshot; returns the notification receiver
    pub fn new(snapshot: &TreeSnapshot) -> (Self, mpsc::UnboundedReceiver<ValueChange>) {
        let mut tree = MemoryTree::default();
        tree.nodes.insert(
            NodeHandle::ROOT,
            TreeNode {
                handle: NodeHandle::ROOT,
                number: 0,
                identifier: String::new(),
                path: String::new(),
                contents: NodeContents::Root,
                children: Vec::new(),
            },
        );
        for (i, child) in snapshot.children.iter().enumerate() {
            tree.insert(child, i, NodeHandle::ROOT, "");
        }
        debug!(nodes = tree.nodes.len(), "Loaded tree snapshot");

        let (notify, rx) = mpsc::unbounded_channel();
        (
            Self {
                tree: RwLock::new(tree),
                lazy: false,
                notify,
            },
            rx,
        )
    }

    /// Hide children until their directory is fetched
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Simulate a device-side value change
    pub async fn update_value(&self, path: &str, value: RawValue) -> Result<(), ProviderError> {
        let mut tree = self.tree.write().await;
        let handle = tree.handle_for(path)?;
        self.apply_value(&mut tree, handle, value)
    }

    /// Make subscriptions to `path` fail
    pub async fn reject_subscribe(&self, path: &str) -> Result<(), ProviderError> {
        let mut tree = self.tree.write().await;
        let handle = tree.handle_for(path)?;
        tree.reject_subscribe.insert(handle);
        Ok(())
    }

    /// Make every write fail
    pub async fn reject_writes(&self) {
        self.tree.write().await.reject_writes = true;
    }

    /// Writes accepted so far, in order
    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.tree.read().await.writes.clone()
    }

    /// Nodes whose directory was requested, in order
    pub async fn directory_requests(&self) -> Vec<NodeHandle> {
        self.tree.read().await.directory_requests.clone()
    }

    pub async fn is_subscribed(&self, path: &str) -> bool {
        let tree = self.tree.read().await;
        tree.handle_for(path)
            .map(|h| tree.subscribed.contains(&h))
            .unwrap_or(false)
    }

    fn apply_value(
        &self,
        tree: &mut MemoryTree,
        handle: NodeHandle,
        value: RawValue,
    ) -> Result<(), ProviderError> {
        let subscribed = tree.subscribed.contains(&handle);
        let node = tree
            .nodes
            .get_mut(&handle)
            .ok_or(ProviderError::UnknownHandle(handle))?;
        let NodeContents::Parameter(parameter) = &mut node.contents else {
            return Err(ProviderError::Rejected(format!(
                "{} is not a parameter",
                node.path
            )));
        };
        parameter.value = Some(value);

        if subscribed {
            let change = ValueChange {
                handle,
                path: node.path.clone(),
                parameter: parameter.clone(),
            };
            trace!(path = %change.path, "Queueing value change");
            // Receiver gone means nobody is monitoring any more
            let _ = self.notify.send(change);
        }
        Ok(())
    }
}

#[async_trait]
impl TreeProvider for MemoryProvider {
    fn root(&self) -> NodeHandle {
        NodeHandle::ROOT
    }

    async fn node(&self, handle: NodeHandle) -> Result<TreeNode, ProviderError> {
        let tree = self.tree.read().await;
        let mut node = tree.get(handle)?.clone();
        if self.lazy && !tree.expanded.contains(&handle) {
            node.children.clear();
        }
        Ok(node)
    }

    async fn lookup_by_address(&self, address: &str) -> Result<NodeHandle, ProviderError> {
        let address = address.trim();
        let mut tree = self.tree.write().await;
        let handle = if address.is_empty() {
            NodeHandle::ROOT
        } else {
            tree.handle_for(address)?
        };
        // Resolving a path loads its directory, as GetElementByPath does
        tree.expanded.insert(handle);
        Ok(handle)
    }

    async fn lookup_child_by_index(
        &self,
        container: NodeHandle,
        index: u32,
    ) -> Result<NodeHandle, ProviderError> {
        let tree = self.tree.read().await;
        let parent = tree.get(container)?;
        parent
            .children
            .iter()
            .copied()
            .find(|child| tree.nodes.get(child).is_some_and(|c| c.number == index))
            .ok_or(ProviderError::NoSuchChild { container, index })
    }

    async fn fetch_directory(&self, node: NodeHandle) -> Result<(), ProviderError> {
        let mut tree = self.tree.write().await;
        tree.get(node)?;
        tree.expanded.insert(node);
        tree.directory_requests.push(node);
        Ok(())
    }

    async fn subscribe(&self, leaf: NodeHandle) -> Result<(), ProviderError> {
        let mut tree = self.tree.write().await;
        let path = tree.get(leaf)?.path.clone();
        if tree.reject_subscribe.contains(&leaf) {
            return Err(ProviderError::Rejected(format!("subscribe to {}", path)));
        }
        tree.subscribed.insert(leaf);
        Ok(())
    }

    async fn write_value(
        &self,
        leaf: NodeHandle,
        value: RawValue,
        value_type: ParameterType,
    ) -> Result<(), ProviderError> {
        let mut tree = self.tree.write().await;
        let path = tree.get(leaf)?.path.clone();
        if tree.reject_writes {
            return Err(ProviderError::Rejected(format!("write to {}", path)));
        }
        tree.writes.push(WriteRecord {
            path,
            value: value.clone(),
            value_type,
        });
        self.apply_value(&mut tree, leaf, value)
    }
}
