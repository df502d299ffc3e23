//! Session lifecycle: connect, populate, keep current, reconfigure

use embertree_control::MutationEngine;
use embertree_core::{EmberError, Feedback, MonitorConfig, MonitorRegistry, MonitoredEntry};
use embertree_discovery::{DiscoveryReport, Monitor, RegistrationReport};
use embertree_provider::{RegistryVariables, TreeProvider, ValueChange};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// What a connect pass registered
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectReport {
    /// Present when automatic discovery ran
    pub discovery: Option<DiscoveryReport>,
    pub explicit: RegistrationReport,
    pub monitored: usize,
}

/// Shared session state
pub struct Session {
    pub provider: Arc<dyn TreeProvider>,
    pub registry: Arc<RwLock<MonitorRegistry>>,
    pub monitor: Monitor,
    pub engine: MutationEngine,
    pump: JoinHandle<()>,
}

impl Session {
    /// Create the session and start draining value-change notifications
    pub fn start(
        provider: Arc<dyn TreeProvider>,
        notifications: mpsc::UnboundedReceiver<ValueChange>,
    ) -> Self {
        let registry = Arc::new(RwLock::new(MonitorRegistry::new()));
        let monitor = Monitor::new(provider.clone(), registry.clone());
        let engine = MutationEngine::new(
            provider.clone(),
            Arc::new(RegistryVariables::new(registry.clone())),
            registry.clone(),
        );

        let pump_monitor = monitor.clone();
        let pump = tokio::spawn(async move {
            pump_monitor.run_notifications(notifications).await;
        });

        Self {
            provider,
            registry,
            monitor,
            engine,
            pump,
        }
    }

    /// Rebuild the monitored set from the provider tree.
    ///
    /// Fetches the root directory, walks the tree when automatic parsing is
    /// enabled, then registers the explicit addresses.
    pub async fn connect(&self, config: &MonitorConfig) -> Result<ConnectReport, EmberError> {
        let generation = self.monitor.rebuild().await;

        let root = self.provider.root();
        self.provider.fetch_directory(root).await?;
        debug!("Root directory fetched");

        let discovery = if config.auto_parse {
            Some(
                self.monitor
                    .register_from_discovery(generation, root, config)
                    .await,
            )
        } else {
            None
        };
        let explicit = self
            .monitor
            .register_explicit(generation, &config.parameters)
            .await;

        let monitored = self.registry.read().await.len();
        info!(monitored = monitored, "Monitored set ready");
        Ok(ConnectReport {
            discovery,
            explicit,
            monitored,
        })
    }

    /// Apply a changed configuration
    pub async fn reconfigure(&self, config: &MonitorConfig) -> Result<ConnectReport, EmberError> {
        info!("Configuration changed, rebuilding monitored set");
        self.connect(config).await
    }

    /// Current value of a monitored label, read from the provider
    pub async fn read(&self, label: &str) -> Result<String, EmberError> {
        self.monitor.refresh(label).await
    }

    pub async fn entries(&self) -> Vec<MonitoredEntry> {
        self.registry.read().await.snapshot()
    }

    pub async fn evaluate(&self, feedback: &Feedback) -> bool {
        feedback.evaluate(&*self.registry.read().await)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
