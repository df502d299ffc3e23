//! Tree node types for a mirrored Ember+ provider tree
//!
//! The provider owns the tree. The core only ever holds a [`NodeHandle`]
//! and reads point-in-time [`TreeNode`] snapshots through the provider.

use serde::{Deserialize, Serialize};

use crate::value::{ParameterType, RawValue};

/// Opaque reference to a node owned by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

impl NodeHandle {
    /// Handle of the tree root
    pub const ROOT: NodeHandle = NodeHandle(0);
}

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parameter contents as reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Current raw value
    #[serde(default)]
    pub value: Option<RawValue>,
    /// Declared type tag
    #[serde(default, rename = "type")]
    pub value_type: Option<ParameterType>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    /// Newline separated display strings, indexed by the integer value
    #[serde(default)]
    pub enumeration: Option<String>,
    /// Divisor applied to the raw value for display
    #[serde(default)]
    pub factor: Option<f64>,
}

impl Parameter {
    /// Create a parameter whose declared type follows the value
    pub fn new(value: RawValue) -> Self {
        Self {
            value_type: Some(value.kind()),
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn with_enumeration(mut self, enumeration: &str) -> Self {
        self.enumeration = Some(enumeration.to_string());
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = Some(factor);
        self
    }

    pub fn is_enumerated(&self) -> bool {
        self.enumeration.is_some()
    }

    /// Declared type, falling back to the shape of the current value
    pub fn declared_type(&self) -> ParameterType {
        self.value_type
            .or_else(|| self.value.as_ref().map(RawValue::kind))
            .unwrap_or(ParameterType::Null)
    }

    /// Whether numeric writes (set, expression, increment) apply
    pub fn is_numeric(&self) -> bool {
        self.declared_type().is_numeric()
    }

    /// Clamp a requested value into the declared range.
    ///
    /// Only applies when a maximum is declared and there is no enumeration.
    /// A missing minimum leaves the lower side open.
    pub fn clamp(&self, requested: f64) -> f64 {
        if self.is_enumerated() {
            return requested;
        }
        let Some(maximum) = self.maximum else {
            return requested;
        };
        if requested > maximum {
            return maximum;
        }
        match self.minimum {
            Some(minimum) if requested < minimum => minimum,
            _ => requested,
        }
    }
}

/// What kind of element a node is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeContents {
    Root,
    Node {
        #[serde(default = "default_true")]
        online: bool,
    },
    Parameter(Parameter),
}

fn default_true() -> bool {
    true
}

/// Point-in-time snapshot of a provider node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub handle: NodeHandle,
    /// Index among siblings
    pub number: u32,
    pub identifier: String,
    /// Protocol path, dotted sibling indices (empty for the root)
    pub path: String,
    pub contents: NodeContents,
    /// Children in sibling order
    pub children: Vec<NodeHandle>,
}

impl TreeNode {
    /// A non-root container
    pub fn is_node(&self) -> bool {
        matches!(self.contents, NodeContents::Node { .. })
    }

    /// Root or node
    pub fn is_container(&self) -> bool {
        !self.is_parameter()
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.contents, NodeContents::Parameter(_))
    }

    /// Online flag; only nodes can be offline
    pub fn is_online(&self) -> bool {
        match self.contents {
            NodeContents::Node { online } => online,
            _ => true,
        }
    }

    pub fn parameter(&self) -> Option<&Parameter> {
        match &self.contents {
            NodeContents::Parameter(p) => Some(p),
            _ => None,
        }
    }

    /// Identifier as used in accumulated labels (first `#` dropped)
    pub fn label_segment(&self) -> String {
        self.identifier.replacen('#', "", 1)
    }
}
