pub mod admin;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod routes;
pub mod templates;

use std::sync::Arc;

use db::channels::ChannelRegistry;
use db::requests::RequestStore;
use error::GateError;
use lifecycle::{Intent, IntentOutbox, LifecycleController, LifecycleEvent};
use templates::DefaultTemplates;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub requests: Arc<dyn RequestStore>,
    pub registry: Arc<dyn ChannelRegistry>,
    pub controller: Arc<LifecycleController>,
    pub outbox: IntentOutbox,
}

impl AppState {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        registry: Arc<dyn ChannelRegistry>,
        defaults: DefaultTemplates,
    ) -> Self {
        let controller = Arc::new(LifecycleController::new(
            requests.clone(),
            registry.clone(),
            Arc::new(defaults),
        ));
        Self {
            requests,
            registry,
            controller,
            outbox: IntentOutbox::new(),
        }
    }

    /// Run an event through the controller and publish what it emits.
    /// Nothing is published for a failed event.
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<Vec<Intent>, GateError> {
        let intents = self.controller.handle(event).await?;
        self.outbox.publish(&intents);
        Ok(intents)
    }
}
