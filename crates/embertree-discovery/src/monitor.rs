//! Parameter registration and value-change handling
//!
//! The [`Monitor`] ties a provider to a registry: it registers leaves
//! (from discovery or from an explicit address list), keeps their cached
//! values current from value-change notifications, and broadcasts
//! [`RegistryEvent`]s so variables and feedbacks can be refreshed.

use embertree_core::{
    normalize, EmberError, Generation, MonitorRegistry, RegistryError, TreeNode,
};
use embertree_provider::{resolve_parameter, TreeProvider, ValueChange};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, trace, warn};

/// Registry change events for the surrounding glue
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// A label was added to the monitored set
    EntryRegistered { label: String, path: String },
    /// A cached value changed
    ValueChanged { label: String, value: String },
    /// The registry was cleared for a new configuration
    Rebuilt(Generation),
}

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Ember(#[from] EmberError),
}

/// Outcome of an explicit registration pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    pub registered: usize,
    pub failed: usize,
    pub halted_at_capacity: bool,
    pub abandoned: bool,
}

/// Registers parameters and keeps their cached values current
#[derive(Clone)]
pub struct Monitor {
    provider: Arc<dyn TreeProvider>,
    registry: Arc<RwLock<MonitorRegistry>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Monitor {
    pub fn new(provider: Arc<dyn TreeProvider>, registry: Arc<RwLock<MonitorRegistry>>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            provider,
            registry,
            events,
        }
    }

    pub fn provider(&self) -> &Arc<dyn TreeProvider> {
        &self.provider
    }

    pub fn registry(&self) -> &Arc<RwLock<MonitorRegistry>> {
        &self.registry
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Clear the registry for a new configuration
    pub async fn rebuild(&self) -> Generation {
        let generation = self.registry.write().await.rebuild();
        info!(generation = generation.0, "Monitor registry rebuilt");
        let _ = self.events.send(RegistryEvent::Rebuilt(generation));
        generation
    }

    /// Register a parameter leaf under `label`: add the entry, subscribe to
    /// its value changes, and cache its current value.
    ///
    /// The value is read after the subscription is in place. A notification
    /// applied in between is newer than that read and wins.
    pub async fn register_leaf(
        &self,
        generation: Generation,
        node: &TreeNode,
        label: &str,
    ) -> Result<(), RegisterError> {
        if !node.is_parameter() {
            return Err(EmberError::not_applicable(&node.path, "not a parameter").into());
        }

        let (added, revision) = {
            let mut registry = self.registry.write().await;
            let added = registry.register(generation, &node.path, label)?;
            (added, registry.revision(label).unwrap_or_default())
        };
        if added {
            let _ = self.events.send(RegistryEvent::EntryRegistered {
                label: label.to_string(),
                path: node.path.clone(),
            });
        }

        self.provider
            .subscribe(node.handle)
            .await
            .map_err(EmberError::from)?;

        let current = self
            .provider
            .node(node.handle)
            .await
            .map_err(EmberError::from)?;
        let parameter = current
            .parameter()
            .ok_or_else(|| EmberError::not_applicable(&node.path, "not a parameter"))?;
        let value = normalize(parameter);

        let stored = {
            let mut registry = self.registry.write().await;
            registry.generation() == generation
                && registry.set_value_if(label, revision, value.clone())
        };
        if stored {
            let _ = self.events.send(RegistryEvent::ValueChanged {
                label: label.to_string(),
                value,
            });
        } else {
            trace!(label = %label, "Keeping value delivered during registration");
        }
        debug!(label = %label, path = %node.path, "Registered parameter");
        Ok(())
    }

    /// Register each address, labelled by the address itself
    pub async fn register_explicit(
        &self,
        generation: Generation,
        addresses: &[String],
    ) -> RegistrationReport {
        info!(count = addresses.len(), "Start parameter path registration");
        let mut report = RegistrationReport::default();

        for address in addresses {
            let result = match resolve_parameter(self.provider.as_ref(), address).await {
                Ok((node, _)) => self.register_leaf(generation, &node, address).await,
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(()) => report.registered += 1,
                Err(RegisterError::Registry(RegistryError::Full(limit))) => {
                    warn!(path = %address, limit = limit, "Monitored set is full, stopping registration");
                    report.halted_at_capacity = true;
                    break;
                }
                Err(RegisterError::Registry(RegistryError::Stale { .. })) => {
                    debug!(path = %address, "Registration superseded by a newer configuration");
                    report.abandoned = true;
                    break;
                }
                Err(e) => {
                    error!(path = %address, error = %e, "Failed to subscribe to path");
                    report.failed += 1;
                }
            }
        }

        info!(
            registered = report.registered,
            failed = report.failed,
            "Finished parameter path registration"
        );
        report
    }

    /// Apply one value-change notification to every entry on its path
    pub async fn apply_change(&self, change: &ValueChange) -> Vec<String> {
        let value = normalize(&change.parameter);
        let labels = self.registry.write().await.update_path(&change.path, &value);
        if labels.is_empty() {
            trace!(path = %change.path, "Value change for unmonitored path");
        }
        for label in &labels {
            let _ = self.events.send(RegistryEvent::ValueChanged {
                label: label.clone(),
                value: value.clone(),
            });
        }
        labels
    }

    /// Re-read a monitored parameter from the provider and recache it
    pub async fn refresh(&self, label: &str) -> Result<String, EmberError> {
        let (path, generation) = {
            let registry = self.registry.read().await;
            let path = registry
                .path_for(label)
                .ok_or_else(|| EmberError::NotFound(label.to_string()))?
                .to_string();
            (path, registry.generation())
        };
        let (_, parameter) = resolve_parameter(self.provider.as_ref(), &path).await?;
        let value = normalize(&parameter);
        self.store(generation, label, value.clone()).await;
        Ok(value)
    }

    /// Drain value-change notifications until the provider goes away
    pub async fn run_notifications(&self, mut rx: mpsc::UnboundedReceiver<ValueChange>) {
        while let Some(change) = rx.recv().await {
            self.apply_change(&change).await;
        }
        debug!("Notification channel closed");
    }

    async fn store(&self, generation: Generation, label: &str, value: String) {
        let stored = {
            let mut registry = self.registry.write().await;
            registry.generation() == generation && registry.set_value(label, value.clone())
        };
        if stored {
            let _ = self.events.send(RegistryEvent::ValueChanged {
                label: label.to_string(),
                value,
            });
        }
    }
}
