//! The capability set consumed from a tree/transport client

use async_trait::async_trait;
use embertree_core::{EmberError, NodeHandle, Parameter, ParameterType, RawValue, TreeNode};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("No element at address '{0}'")]
    NotFound(String),
    #[error("No child with number {index} under {container}")]
    NoSuchChild { container: NodeHandle, index: u32 },
    #[error("Unknown node handle {0}")]
    UnknownHandle(NodeHandle),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
}

impl From<ProviderError> for EmberError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotFound(_)
            | ProviderError::NoSuchChild { .. }
            | ProviderError::UnknownHandle(_) => EmberError::NotFound(e.to_string()),
            ProviderError::Rejected(_) | ProviderError::Timeout(_) => {
                EmberError::TransportFailure(e.to_string())
            }
        }
    }
}

/// Value-change notification for a subscribed parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub handle: NodeHandle,
    /// Protocol path of the parameter
    pub path: String,
    /// Parameter contents after the change
    pub parameter: Parameter,
}

/// Tree and transport operations provided by an external client.
///
/// Nodes stay owned by the provider; callers hold handles and read
/// snapshots. Value changes for subscribed leaves are delivered on the
/// notification channel the provider hands out at construction.
#[async_trait]
pub trait TreeProvider: Send + Sync {
    /// Handle of the tree root
    fn root(&self) -> NodeHandle;

    /// Current snapshot of a node
    async fn node(&self, handle: NodeHandle) -> Result<TreeNode, ProviderError>;

    /// Look up a node by dotted address; the empty address is the root
    async fn lookup_by_address(&self, address: &str) -> Result<NodeHandle, ProviderError>;

    /// Select the child of a container by its sibling number
    async fn lookup_child_by_index(
        &self,
        container: NodeHandle,
        index: u32,
    ) -> Result<NodeHandle, ProviderError>;

    /// Refresh a node's children and value
    async fn fetch_directory(&self, node: NodeHandle) -> Result<(), ProviderError>;

    /// Request value-change notifications for a leaf
    async fn subscribe(&self, leaf: NodeHandle) -> Result<(), ProviderError>;

    /// Write a value to a leaf
    async fn write_value(
        &self,
        leaf: NodeHandle,
        value: RawValue,
        value_type: ParameterType,
    ) -> Result<(), ProviderError>;
}

/// Host-side text substitution used by expression writes
#[async_trait]
pub trait VariableSubstitution: Send + Sync {
    async fn substitute_variables(&self, text: &str) -> String;
}
