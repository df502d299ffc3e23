//! embertree Core - Tree model, value normalization, and monitor registry
//!
//! This crate provides the foundational types for mirroring an Ember+
//! provider tree:
//! - Tree node and parameter types, addressed through opaque handles
//! - Raw values and their display normalization (enumeration, factor)
//! - The monitor registry mapping display labels to cached values
//! - Feedback predicates over the registry
//! - Immutable monitor configuration (scopes, filters, explicit paths)

pub mod config;
pub mod error;
pub mod feedback;
pub mod registry;
pub mod tree;
pub mod value;

pub use config::{split_list, MonitorConfig, ParseScope};
pub use error::{EmberError, RegistryError};
pub use feedback::Feedback;
pub use registry::{Generation, MonitorRegistry, MonitoredEntry, MAX_MONITORED};
pub use tree::{NodeContents, NodeHandle, Parameter, TreeNode};
pub use value::{format_number, normalize, ParameterType, RawValue};
