//! Embertree Discovery - populating the monitored set
//!
//! This crate provides two ways of registering parameters:
//! - Worklist discovery of the provider tree, bounded by scopes and filters
//! - Explicit registration of dotted addresses
//!
//! and keeps registered values current from provider notifications.

pub mod monitor;
pub mod walker;

pub use monitor::{Monitor, RegisterError, RegistrationReport, RegistryEvent};
pub use walker::{DiscoveryReport, DiscoveryRules, TreeWalker};
