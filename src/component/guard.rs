//! Error channel around component instances.
//!
//! Every call the engine makes into a component goes through [`Guarded`],
//! which annotates failures with `<component>.<method>()`. Routing the
//! annotated error (fail fast or `error` event) is left to
//! [`Application::report_error`](crate::Application::report_error).
//!
//! A message or teardown aimed at a component that is currently executing
//! is parked on its [`ComponentSlot`] and run once the outer call returns.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use serde_json::Value;

use crate::error::{AppError, ComponentResult, Result};

use super::handlers::{DelegatedEvent, EventHandlers, MessageHandler};
use super::{Component, Module};

/// Object-safe surface the engine drives.
pub(crate) trait Instance {
    fn init(&mut self) -> Result<()>;
    fn destroy(&mut self) -> Result<()>;
    fn deliver_message(&mut self, name: &str, data: &Value) -> Result<()>;
    fn deliver_event(&mut self, event: &DelegatedEvent<'_>) -> Result<()>;
}

pub(crate) struct Guarded<C> {
    name: String,
    inner: C,
    messages: MessageHandler<C>,
    events: EventHandlers<C>,
}

impl<C: Component> Guarded<C> {
    pub(crate) fn new(name: &str, inner: C) -> Self {
        let messages = inner.messages();
        let events = inner.events();
        Self {
            name: name.to_string(),
            inner,
            messages,
            events,
        }
    }

    fn guard(&mut self, method: &str, call: impl FnOnce(&mut C) -> ComponentResult) -> Result<()> {
        call(&mut self.inner).map_err(|source| AppError::component(&self.name, method, source))
    }
}

impl<C: Component> Instance for Guarded<C> {
    fn init(&mut self) -> Result<()> {
        self.guard("init", |c| c.init())
    }

    fn destroy(&mut self) -> Result<()> {
        self.guard("destroy", |c| c.destroy())
    }

    fn deliver_message(&mut self, name: &str, data: &Value) -> Result<()> {
        if !self.messages.accepts(name) {
            return Ok(());
        }
        match self.messages.route(name) {
            Some(handler) => self.guard("on_message", |c| handler(c, data)),
            None => self.guard("on_message", |c| c.on_message(name, data)),
        }
    }

    fn deliver_event(&mut self, event: &DelegatedEvent<'_>) -> Result<()> {
        let Some(handler) = self.events.get(event.event_type()) else {
            return Ok(());
        };
        let method = format!("on_{}", event.event_type());
        self.guard(&method, |c| handler(c, event))
    }
}

/// Work postponed until a busy component is idle again.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Deferred {
    Message { name: String, data: Value },
    Destroy,
}

/// Shared handle to a guarded instance plus the routing facts the engine
/// needs without borrowing it.
#[derive(Clone)]
pub(crate) struct ComponentSlot {
    name: Rc<str>,
    behaviors: Rc<[String]>,
    messages: Rc<HashSet<String>>,
    event_types: Rc<[String]>,
    instance: Rc<RefCell<dyn Instance>>,
    deferred: Rc<RefCell<VecDeque<Deferred>>>,
}

impl ComponentSlot {
    pub(crate) fn module<M: Module>(name: &str, module: M) -> Self {
        let behaviors: Vec<String> = module.behaviors().iter().map(|b| b.to_string()).collect();
        Self::build(name, behaviors, Guarded::new(name, module))
    }

    pub(crate) fn behavior<B: Component>(name: &str, behavior: B) -> Self {
        Self::build(name, Vec::new(), Guarded::new(name, behavior))
    }

    fn build<C: Component>(name: &str, behaviors: Vec<String>, guarded: Guarded<C>) -> Self {
        let messages = guarded.messages.names().into_iter().collect();
        let event_types = guarded.events.event_types();
        Self {
            name: Rc::from(name),
            behaviors: behaviors.into(),
            messages: Rc::new(messages),
            event_types: event_types.into(),
            instance: Rc::new(RefCell::new(guarded)),
            deferred: Rc::default(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn behaviors(&self) -> &[String] {
        &self.behaviors
    }

    pub(crate) fn accepts(&self, message: &str) -> bool {
        self.messages.contains(message)
    }

    pub(crate) fn event_types(&self) -> &[String] {
        &self.event_types
    }

    /// Whether one of the component's own methods is on the stack.
    pub(crate) fn is_busy(&self) -> bool {
        self.instance.try_borrow_mut().is_err()
    }

    /// Park `work` until the running call returns.
    ///
    /// A pending teardown drops queued messages and refuses new ones, since
    /// a stopped component must not hear anything further.
    pub(crate) fn defer(&self, work: Deferred) {
        let mut queue = self.deferred.borrow_mut();
        if work == Deferred::Destroy {
            queue.clear();
        } else if queue.contains(&Deferred::Destroy) {
            return;
        }
        queue.push_back(work);
    }

    /// Next parked item, or `None` while the component is still executing.
    pub(crate) fn take_deferred(&self) -> Option<Deferred> {
        if self.is_busy() {
            return None;
        }
        self.deferred.borrow_mut().pop_front()
    }

    /// Run `call` against the instance, refusing re-entrant calls.
    pub(crate) fn call(
        &self,
        method: &str,
        call: impl FnOnce(&mut dyn Instance) -> Result<()>,
    ) -> Result<()> {
        match self.instance.try_borrow_mut() {
            Ok(mut instance) => call(&mut *instance),
            Err(_) => Err(AppError::Reentrant {
                component: self.name.to_string(),
                method: method.to_string(),
            }),
        }
    }
}
