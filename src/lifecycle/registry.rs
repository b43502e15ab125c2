//! Registry of services to run.

use std::sync::Arc;

use crate::lifecycle::service::{Service, ServiceRef};

/// Ordered collection of services, filled while the configuration is
/// evaluated and handed to [`Orchestrator::run`](crate::lifecycle::Orchestrator::run) once.
///
/// Order only decides dispatch order and how services are listed in logs.
#[derive(Default, Clone)]
pub struct Registry {
    services: Vec<ServiceRef>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service.
    pub fn add<S: Service>(&mut self, service: S) {
        self.services.push(Arc::new(service));
    }

    /// Register an already shared service.
    pub fn add_shared(&mut self, service: ServiceRef) {
        self.services.push(service);
    }

    /// Whether nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    pub(crate) fn into_services(self) -> Vec<ServiceRef> {
        self.services
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("services", &self.names())
            .finish()
    }
}
