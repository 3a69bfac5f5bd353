//! Building single components in isolation.
//!
//! A [`TestServiceProvider`] owns a debug-mode [`Application`] over a
//! [`MemoryDom`]. Register components on it as usual, shadow their
//! dependencies with stubs, then build one module, behavior or service
//! without running `init` or `start_all`. Stubs win over registered services
//! of the same name; anything not stubbed resolves to the real registration.
//!
//! ```ignore
//! let provider = TestServiceProvider::new().with_stub("store", FakeStore::default());
//! provider.application().add_module("todo", |ctx| Todo::new(ctx))?;
//! let root = provider.mount("todo");
//! let todo = provider.module_for_test("todo", root)?;
//! todo.init()?;
//! todo.receive("todoadded", json!({ "id": 1 }))?;
//! assert_eq!(provider.broadcasts(), vec![("statuschange".into(), json!(1))]);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Value, json};

use crate::app::Application;
use crate::component::{ComponentSlot, DelegatedEvent, Instance};
use crate::context::Context;
use crate::delegate::nearest_type_element;
use crate::dom::{DomAdapter, DomEvent, MODULE_ATTR, MemoryDom, NodeId, TYPE_ATTR};
use crate::error::{AppError, Result};
use crate::events::{EventData, handler};
use crate::services::ServiceScope;

type Broadcasts = Rc<RefCell<Vec<(String, Value)>>>;

/// Application stand-in for exercising one component at a time.
pub struct TestServiceProvider {
    dom: Rc<MemoryDom>,
    app: Application,
    broadcasts: Broadcasts,
}

impl TestServiceProvider {
    pub fn new() -> Self {
        let dom = MemoryDom::new();
        let app = Application::new(dom.clone());
        // Fresh application, so the global config is still writable.
        let _ = app.set_global_config(json!({ "debug": true }));

        let broadcasts = Broadcasts::default();
        let seen = Rc::clone(&broadcasts);
        app.on(
            "message",
            handler(move |event| {
                if let EventData::Message { message, data } = &event.data {
                    seen.borrow_mut().push((message.clone(), data.clone()));
                }
            }),
        );

        Self {
            dom,
            app,
            broadcasts,
        }
    }

    pub fn application(&self) -> &Application {
        &self.app
    }

    pub fn dom(&self) -> &Rc<MemoryDom> {
        &self.dom
    }

    /// Shadow the service `name` with `service`.
    pub fn with_stub<S: 'static>(self, name: &str, service: S) -> Self {
        self.stub_service(name, service);
        self
    }

    pub fn stub_service<S: 'static>(&self, name: &str, service: S) {
        self.app.stub_service(name, Rc::new(service));
    }

    /// Merge extra global configuration. `debug` stays on unless overridden.
    pub fn with_global_config(self, config: Value) -> Self {
        let _ = self.app.set_global_config(config);
        self
    }

    /// Build a fresh instance of the registered service `name`. Its own
    /// dependencies resolve through the stubs. `Ok(None)` when nothing is
    /// registered under that name.
    pub fn service_for_test<S: 'static>(&self, name: &str) -> Result<Option<Rc<S>>> {
        let factory = self.app.registry().borrow().service_factory(name);
        let Some(factory) = factory else {
            return Ok(None);
        };
        let scope = ServiceScope::new(self.app.clone());
        let service = factory(&scope).map_err(|source| AppError::component(name, "create", source))?;
        service
            .downcast::<S>()
            .map(Some)
            .map_err(|_| AppError::ServiceTypeMismatch(name.to_string()))
    }

    /// Context a component built for `element` would receive.
    pub fn context_for(&self, element: NodeId, module: &str) -> Context {
        Context::new(&self.app, element, module)
    }

    /// Append a `data-module` root for `declaration` under the body.
    pub fn mount(&self, declaration: &str) -> NodeId {
        self.dom
            .append_element(self.dom.body(), "div", &[(MODULE_ATTR, declaration)])
    }

    /// Build the module `name` against `element` without initializing it or
    /// any of its behaviors.
    pub fn module_for_test(&self, name: &str, element: NodeId) -> Result<TestComponent> {
        let factory = self.app.registry().borrow().module_factory(name);
        let Some(factory) = factory else {
            return Err(AppError::ModuleNotDefined(name.to_string()));
        };
        let slot = factory(self.context_for(element, name))
            .map_err(|source| AppError::component(name, "create", source))?;
        Ok(self.wrap(slot))
    }

    /// Build the behavior `name` as if attached to the module on `element`.
    pub fn behavior_for_test(&self, name: &str, element: NodeId) -> Result<TestComponent> {
        let factory = self.app.registry().borrow().behavior_factory(name);
        let Some(factory) = factory else {
            return Err(AppError::BehaviorNotFound(name.to_string()));
        };
        let module = self
            .app
            .declaration(element)
            .map(|declaration| declaration.name)
            .unwrap_or_default();
        let slot = factory(self.context_for(element, &module))
            .map_err(|source| AppError::component(name, "create", source))?;
        Ok(self.wrap(slot))
    }

    /// Every broadcast sent so far, in order.
    pub fn broadcasts(&self) -> Vec<(String, Value)> {
        self.broadcasts.borrow().clone()
    }

    fn wrap(&self, slot: ComponentSlot) -> TestComponent {
        TestComponent {
            slot,
            app: self.app.clone(),
        }
    }
}

impl Default for TestServiceProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// One component built by a [`TestServiceProvider`], driven by hand.
///
/// Calls go through the same error channel as a started instance, so
/// failures come back annotated as `<name>.<method>() - ...`.
pub struct TestComponent {
    slot: ComponentSlot,
    app: Application,
}

impl TestComponent {
    pub fn name(&self) -> &str {
        self.slot.name()
    }

    /// Behaviors the module declares. Empty for behaviors.
    pub fn behaviors(&self) -> &[String] {
        self.slot.behaviors()
    }

    pub fn listens_to(&self, message: &str) -> bool {
        self.slot.accepts(message)
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.slot.event_types().iter().any(|t| t == event_type)
    }

    pub fn init(&self) -> Result<()> {
        self.app.invoke(&self.slot, "init", |instance| instance.init())
    }

    pub fn destroy(&self) -> Result<()> {
        self.app.teardown(&self.slot)
    }

    /// Deliver a broadcast message as `broadcast` would.
    pub fn receive(&self, name: &str, data: Value) -> Result<()> {
        self.app.deliver(&self.slot, name, &data)
    }

    /// Deliver a delegated DOM event of `event_type` raised on `target`.
    pub fn dispatch(&self, target: NodeId, event_type: &str) -> Result<()> {
        let dom = self.app.dom();
        let event = DomEvent::new(event_type, target);
        let element = nearest_type_element(dom.as_ref(), target);
        let element_type = element
            .and_then(|e| dom.attribute(e, TYPE_ATTR))
            .unwrap_or_default();
        let delegated = DelegatedEvent {
            event: &event,
            element,
            element_type: &element_type,
        };
        let method = format!("on_{event_type}");
        self.app
            .invoke(&self.slot, &method, |instance| instance.deliver_event(&delegated))
    }
}
