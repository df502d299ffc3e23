//! Dotted path resolution
//!
//! Element lookup by path only works for containers, so a parameter path is
//! split into its container address and the trailing sibling number, and the
//! parameter is then selected from the container by number.

use embertree_core::{EmberError, Parameter, TreeNode};
use tracing::trace;

use crate::provider::TreeProvider;

/// Split "1.2.3" into ("1.2", 3); a bare "3" has the root as container.
/// Addresses with an empty segment ("1..2", ".3", "1.") are rejected.
pub fn split_address(path: &str) -> Option<(&str, u32)> {
    let path = path.trim();
    if path.split('.').any(|segment| segment.trim().is_empty()) {
        return None;
    }
    let (container, index) = match path.rsplit_once('.') {
        Some((container, index)) => (container, index),
        None => ("", path),
    };
    index.trim().parse().ok().map(|index| (container, index))
}

/// Resolve a dotted path to a node snapshot
pub async fn resolve<P>(provider: &P, path: &str) -> Result<TreeNode, EmberError>
where
    P: TreeProvider + ?Sized,
{
    let (container, index) =
        split_address(path).ok_or_else(|| EmberError::NotFound(path.to_string()))?;

    let parent = provider
        .lookup_by_address(container)
        .await
        .map_err(|_| EmberError::NotFound(path.to_string()))?;
    let handle = provider
        .lookup_child_by_index(parent, index)
        .await
        .map_err(|_| EmberError::NotFound(path.to_string()))?;
    let node = provider.node(handle).await?;

    trace!(path = %path, handle = %node.handle, "Resolved path");
    Ok(node)
}

/// Resolve a dotted path that must name a parameter
pub async fn resolve_parameter<P>(
    provider: &P,
    path: &str,
) -> Result<(TreeNode, Parameter), EmberError>
where
    P: TreeProvider + ?Sized,
{
    let node = resolve(provider, path).await?;
    match node.parameter().cloned() {
        Some(parameter) => Ok((node, parameter)),
        None => Err(EmberError::not_applicable(path, "not a parameter")),
    }
}
