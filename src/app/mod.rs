//! The application engine.
//!
//! [`Application`] owns the component registry, the running instance records
//! and the global configuration for one document. It is a cheap handle over
//! shared state: every clone drives the same engine, and components reach it
//! through their [`Context`](crate::Context) without keeping it alive.
//!
//! All operations are synchronous and single-threaded. Component code may
//! call back into the engine (start, stop, broadcast, resolve services) from
//! any lifecycle method or handler; the engine never holds a borrow of its
//! own state while component code runs.

mod core;
mod declaration;
mod dispatch;
mod lifecycle;
mod messaging;
#[cfg(test)]
mod testing;

pub use declaration::ModuleDeclaration;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::{Map, Value};

use crate::dom::DomAdapter;
use crate::error::{AppError, Result};
use crate::events::EventTarget;
use crate::logging::Logger;
use crate::metrics::AppMetrics;
use crate::registry::{ComponentRegistry, ServiceInstance};

use lifecycle::InstanceRecord;

/// Replaces the default debug/production routing of reported errors.
pub type ErrorHandler = Rc<dyn Fn(AppError) -> Result<()>>;

/// Host-side knobs for an [`Application`].
#[derive(Clone)]
pub struct ApplicationConfig {
    /// Optional structured logger used by the engine.
    pub logger: Option<Logger>,
    /// Metrics accumulator, snapshotted when the application is destroyed.
    pub metrics: Option<Arc<Mutex<AppMetrics>>>,
    /// Target field used when emitting metrics snapshots.
    pub metrics_target: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            logger: None,
            metrics: None,
            metrics_target: "mosaic::app.metrics".to_string(),
        }
    }
}

impl ApplicationConfig {
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(AppMetrics::new())));
        }
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<AppMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

pub(crate) struct AppInner {
    dom: Rc<dyn DomAdapter>,
    config: ApplicationConfig,
    bus: EventTarget,
    registry: RefCell<ComponentRegistry>,
    /// Stand-ins that shadow registered services of the same name.
    service_stubs: RefCell<HashMap<String, ServiceInstance>>,
    instances: RefCell<HashMap<String, InstanceRecord>>,
    global_config: RefCell<Map<String, Value>>,
    globals: RefCell<Map<String, Value>>,
    error_handler: RefCell<Option<ErrorHandler>>,
    initialized: Cell<bool>,
    next_seq: Cell<u64>,
    created_at: Instant,
}

/// Handle to the engine. Clones share state.
#[derive(Clone)]
pub struct Application {
    inner: Rc<AppInner>,
}

impl Application {
    pub(crate) fn from_inner(inner: Rc<AppInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<AppInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn registry(&self) -> &RefCell<ComponentRegistry> {
        &self.inner.registry
    }

    pub fn dom(&self) -> Rc<dyn DomAdapter> {
        Rc::clone(&self.inner.dom)
    }
}
