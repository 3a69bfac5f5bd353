use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value, json};

use crate::component::{Component, Module};
use crate::context::Context;
use crate::delegate::DEFAULT_EVENT_TYPES;
use crate::dom::DomAdapter;
use crate::error::{AppError, ComponentResult, Result};
use crate::events::{EventData, EventHandler, EventTarget};
use crate::logging::{LogLevel, event_with_fields, json_kv};
use crate::metrics::{AppMetrics, MetricSnapshot};
use crate::registry::{
    ComponentRegistry, ServiceInstance, behavior_factory, module_factory, service_factory,
};
use crate::services::ServiceScope;

use super::{AppInner, Application, ApplicationConfig, ErrorHandler};

const LOG_TARGET: &str = "mosaic::app";

/// Merge the keys of `source` into `target`. Non-object values are ignored.
pub(super) fn merge_object(target: &mut Map<String, Value>, source: Value) {
    if let Value::Object(map) = source {
        for (key, value) in map {
            target.insert(key, value);
        }
    }
}

impl Application {
    pub fn new(dom: Rc<dyn DomAdapter>) -> Self {
        Self::with_config(dom, ApplicationConfig::default())
    }

    pub fn with_config(dom: Rc<dyn DomAdapter>, config: ApplicationConfig) -> Self {
        Self::from_inner(Rc::new(AppInner {
            dom,
            config,
            bus: EventTarget::new(),
            registry: RefCell::new(ComponentRegistry::new()),
            service_stubs: Default::default(),
            instances: Default::default(),
            global_config: Default::default(),
            globals: Default::default(),
            error_handler: Default::default(),
            initialized: Default::default(),
            next_seq: Default::default(),
            created_at: std::time::Instant::now(),
        }))
    }

    /// Merge `config` into the global configuration, start every module in
    /// the document and fire `init`. Configuration is locked afterwards.
    pub fn init(&self, config: Value) -> Result<()> {
        merge_object(&mut self.inner.global_config.borrow_mut(), config);

        self.start_all(self.inner.dom.document_root())?;

        self.inner.bus.fire("init", EventData::None);
        self.inner.initialized.set(true);
        self.log_app_event(
            LogLevel::Info,
            "app_initialized",
            [
                json_kv("modules", json!(self.inner.instances.borrow().len())),
                json_kv("debug", json!(self.is_debug())),
            ],
        );
        Ok(())
    }

    /// Stop every module and reset the engine to its freshly constructed
    /// state. Host globals and event handlers survive.
    pub fn destroy(&self) -> Result<()> {
        let outcome = self.stop_all(self.inner.dom.document_root());

        // Records for elements that left the document are not reachable from
        // the root; release their listeners without running component code.
        let leftovers: Vec<_> = self
            .inner
            .instances
            .borrow_mut()
            .drain()
            .map(|(_, record)| record)
            .collect();
        let leftover_count = leftovers.len();
        for mut record in leftovers {
            record.detach();
        }

        self.emit_metrics_snapshot();

        self.inner.registry.borrow_mut().clear();
        self.inner.global_config.borrow_mut().clear();
        self.inner.error_handler.replace(None);
        self.inner.initialized.set(false);

        self.log_app_event(
            LogLevel::Info,
            "app_destroyed",
            [json_kv("leftover_instances", json!(leftover_count))],
        );
        outcome
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.get()
    }

    pub fn is_debug(&self) -> bool {
        self.inner
            .global_config
            .borrow()
            .get("debug")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    //------------------------------------------------------------------
    // Registration
    //------------------------------------------------------------------

    pub fn add_module<M, F>(&self, name: &str, factory: F) -> Result<()>
    where
        M: Module,
        F: Fn(Context) -> ComponentResult<M> + 'static,
    {
        let outcome = self
            .inner
            .registry
            .borrow_mut()
            .add_module(name, module_factory(name, factory));
        outcome.or_else(|err| self.report_error(err))
    }

    pub fn add_behavior<B, F>(&self, name: &str, factory: F) -> Result<()>
    where
        B: Component,
        F: Fn(Context) -> ComponentResult<B> + 'static,
    {
        let outcome = self
            .inner
            .registry
            .borrow_mut()
            .add_behavior(name, behavior_factory(name, factory));
        outcome.or_else(|err| self.report_error(err))
    }

    /// Register a lazily constructed singleton. The factory receives a
    /// [`ServiceScope`] through which it may resolve its own dependencies.
    pub fn add_service<S, F>(&self, name: &str, factory: F) -> Result<()>
    where
        S: 'static,
        F: Fn(&ServiceScope) -> ComponentResult<S> + 'static,
    {
        let outcome = self
            .inner
            .registry
            .borrow_mut()
            .add_service(name, service_factory(factory));
        outcome.or_else(|err| self.report_error(err))
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.inner.registry.borrow().has_module(name)
    }

    pub fn has_behavior(&self, name: &str) -> bool {
        self.inner.registry.borrow().has_behavior(name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.inner.service_stubs.borrow().contains_key(name)
            || self.inner.registry.borrow().has_service(name)
    }

    pub(crate) fn service_stub(&self, name: &str) -> Option<ServiceInstance> {
        self.inner.service_stubs.borrow().get(name).cloned()
    }

    /// Shadow the service `name` with a ready-made instance.
    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn stub_service(&self, name: &str, instance: ServiceInstance) {
        self.inner
            .service_stubs
            .borrow_mut()
            .insert(name.to_string(), instance);
    }

    /// Resolve the singleton registered as `name`, constructing it on first use.
    ///
    /// Returns `Ok(None)` when resolution failed and the failure was routed to
    /// the `error` event.
    pub fn get_service<S: 'static>(&self, name: &str) -> Result<Option<Rc<S>>> {
        ServiceScope::new(self.clone()).get_service(name)
    }

    //------------------------------------------------------------------
    // Error routing
    //------------------------------------------------------------------

    /// Route `err` through the error channel.
    ///
    /// A custom handler takes precedence. Otherwise debug mode returns the
    /// error to the caller, and production mode fires `error` with it as
    /// payload and returns `Ok`.
    pub fn report_error(&self, err: AppError) -> Result<()> {
        self.with_metrics(AppMetrics::record_error);

        let handler = self.inner.error_handler.borrow().clone();
        if let Some(handler) = handler {
            self.log_error(LogLevel::Warn, &err, "handler");
            return handler(err);
        }

        if self.is_debug() {
            self.log_error(LogLevel::Error, &err, "raised");
            return Err(err);
        }

        self.log_error(LogLevel::Warn, &err, "event");
        self.inner.bus.fire("error", EventData::Error(Rc::new(err)));
        Ok(())
    }

    /// Route the outcome of a guarded component call.
    ///
    /// Failures raised by the component itself are reported here. Engine
    /// errors the component propagated with `?` were reported by the API
    /// that produced them and are passed on unchanged.
    pub(crate) fn settle(&self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Err(err @ (AppError::ComponentRuntime { .. } | AppError::Reentrant { .. })) => {
                self.report_error(err)
            }
            other => other,
        }
    }

    /// Install a handler that replaces error routing. Must happen before `init`.
    pub fn set_error_handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(AppError) -> Result<()> + 'static,
    {
        if self.is_initialized() {
            return self.report_error(AppError::ErrorHandlerAfterInit);
        }
        let handler: ErrorHandler = Rc::new(handler);
        self.inner.error_handler.replace(Some(handler));
        Ok(())
    }

    //------------------------------------------------------------------
    // Event bus
    //------------------------------------------------------------------

    pub fn on(&self, event_type: &str, handler: EventHandler) {
        self.inner.bus.on(event_type, handler);
    }

    pub fn off(&self, event_type: &str, handler: &EventHandler) {
        self.inner.bus.off(event_type, handler);
    }

    pub fn fire(&self, event_type: &str, data: EventData) {
        self.inner.bus.fire(event_type, data);
    }

    //------------------------------------------------------------------
    // Observability
    //------------------------------------------------------------------

    /// Delegated event types, taken from `eventTypes` when configured.
    pub(crate) fn event_types(&self) -> Vec<String> {
        let configured = self
            .inner
            .global_config
            .borrow()
            .get("eventTypes")
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            });
        configured.unwrap_or_else(|| DEFAULT_EVENT_TYPES.iter().map(|t| t.to_string()).collect())
    }

    pub fn metrics_snapshot(&self) -> Option<MetricSnapshot> {
        let metrics = self.inner.config.metrics.as_ref()?;
        let guard = metrics.lock().ok()?;
        Some(guard.snapshot(self.inner.created_at.elapsed()))
    }

    pub(crate) fn with_metrics(&self, record: impl FnOnce(&mut AppMetrics)) {
        if let Some(metrics) = self.inner.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                record(&mut guard);
            }
        }
    }

    fn emit_metrics_snapshot(&self) {
        if let (Some(logger), Some(snapshot)) =
            (self.inner.config.logger.as_ref(), self.metrics_snapshot())
        {
            let target = self.inner.config.metrics_target.as_str();
            let _ = logger.log_event(snapshot.to_log_event(target));
        }
    }

    pub(crate) fn log_app_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(logger) = self.inner.config.logger.as_ref() {
            let event = event_with_fields(level, LOG_TARGET, message, fields);
            let _ = logger.log_event(event);
        }
    }

    fn log_error(&self, level: LogLevel, err: &AppError, routed: &str) {
        self.log_app_event(
            level,
            "error_reported",
            [
                json_kv("error", json!(err.to_string())),
                json_kv("routed", json!(routed)),
                json_kv("component", json!(err.component_name())),
                json_kv("method", json!(err.method_name())),
            ],
        );
    }
}
