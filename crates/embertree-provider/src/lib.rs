//! embertree Provider - The external tree/transport seam
//!
//! This crate defines what the core consumes from a tree client, and
//! provides the pieces built directly on top of it:
//! - `TreeProvider` / `VariableSubstitution` traits
//! - Dotted path resolution (container lookup + child by number)
//! - A snapshot-backed in-memory provider
//! - Registry-backed variable substitution

pub mod memory;
pub mod provider;
pub mod resolve;
pub mod variables;

pub use memory::{MemoryProvider, SnapshotNode, TreeSnapshot, WriteRecord};
pub use provider::{ProviderError, TreeProvider, ValueChange, VariableSubstitution};
pub use resolve::{resolve, resolve_parameter, split_address};
pub use variables::RegistryVariables;
