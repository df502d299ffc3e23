//! Immutable monitor configuration
//!
//! Rebuilt wholesale from the daemon configuration on every change; never
//! mutated in place.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A subtree boundary restricting automatic discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseScope {
    /// Dotted numeric path, e.g. "1.2"
    pub path: String,
    /// Path segments, e.g. ["1", "2"]
    pub elements: Vec<String>,
}

impl ParseScope {
    pub fn new(path: &str) -> Self {
        let path = path.trim();
        Self {
            path: path.to_string(),
            elements: path.split('.').map(str::to_string).collect(),
        }
    }

    /// Parse a comma separated list of scopes ("1.2,3")
    pub fn parse_list(s: &str) -> Vec<Self> {
        split_list(s).iter().map(|p| Self::new(p)).collect()
    }

    pub fn depth(&self) -> usize {
        self.elements.len()
    }
}

impl FromStr for ParseScope {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Split a comma separated setting, trimming items and dropping blanks
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// What to monitor and how discovery is bounded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Walk the tree after connecting
    pub auto_parse: bool,
    /// Subtree boundaries for the walk (empty = whole tree)
    pub scopes: Vec<ParseScope>,
    /// Substrings matched against accumulated labels
    pub node_filters: Vec<String>,
    /// Exact parameter identifiers
    pub parameter_filters: Vec<String>,
    /// Addresses registered explicitly, labelled by their address
    pub parameters: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope() {
        let scope: ParseScope = " 1.2 ".parse().unwrap();
        assert_eq!(scope.path, "1.2");
        assert_eq!(scope.elements, vec!["1", "2"]);
        assert_eq!(scope.depth(), 2);
    }

    #[test]
    fn test_parse_list() {
        let scopes = ParseScope::parse_list("1.2, 3,,4.5.6");
        assert_eq!(scopes.len(), 3);
        assert_eq!(scopes[1].path, "3");
        assert_eq!(scopes[2].depth(), 3);
        assert!(split_list("").is_empty());
    }
}
