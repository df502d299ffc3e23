//! Variable substitution backed by the monitor registry

use async_trait::async_trait;
use embertree_core::MonitorRegistry;
use regex::{Captures, Regex};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

use crate::provider::VariableSubstitution;

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // $(instance:label); the label may itself contain dots
    PATTERN.get_or_init(|| Regex::new(r"\$\(([^:()]+):([^()]+)\)").unwrap())
}

/// Replaces `$(instance:label)` with the cached value of `label`.
///
/// Unknown labels are replaced by the empty string.
#[derive(Clone)]
pub struct RegistryVariables {
    registry: Arc<RwLock<MonitorRegistry>>,
}

impl RegistryVariables {
    pub fn new(registry: Arc<RwLock<MonitorRegistry>>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl VariableSubstitution for RegistryVariables {
    async fn substitute_variables(&self, text: &str) -> String {
        let registry = self.registry.read().await;
        variable_pattern()
            .replace_all(text, |caps: &Captures| {
                registry.value(&caps[2]).unwrap_or("").to_string()
            })
            .into_owned()
    }
}
