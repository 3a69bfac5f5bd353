//! Shared fixtures for the engine tests.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::component::{Component, DelegatedEvent, EventHandlers, MessageHandler, Module};
use crate::dom::{MemoryDom, NodeId};
use crate::error::ComponentResult;

use super::Application;

/// Ordered record of component callbacks, shared by every probe in a test.
#[derive(Clone, Default)]
pub(crate) struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub(crate) fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Module or behavior that journals every callback it receives.
pub(crate) struct Probe {
    name: String,
    journal: Journal,
    behaviors: Vec<&'static str>,
    messages: Vec<String>,
    fail_init: bool,
}

impl Probe {
    pub(crate) fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            behaviors: Vec::new(),
            messages: Vec::new(),
            fail_init: false,
        }
    }

    pub(crate) fn with_behaviors(mut self, behaviors: &[&'static str]) -> Self {
        self.behaviors = behaviors.to_vec();
        self
    }

    pub(crate) fn listening(mut self, messages: &[&str]) -> Self {
        self.messages = messages.iter().map(|m| m.to_string()).collect();
        self
    }

    pub(crate) fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    fn on_click(&mut self, event: &DelegatedEvent<'_>) -> ComponentResult {
        self.journal
            .push(format!("{}.click:{}", self.name, event.element_type));
        Ok(())
    }
}

impl Component for Probe {
    fn init(&mut self) -> ComponentResult {
        self.journal.push(format!("{}.init", self.name));
        if self.fail_init {
            return Err("boom".into());
        }
        Ok(())
    }

    fn destroy(&mut self) -> ComponentResult {
        self.journal.push(format!("{}.destroy", self.name));
        Ok(())
    }

    fn on_message(&mut self, name: &str, data: &Value) -> ComponentResult {
        self.journal
            .push(format!("{}.message:{}:{}", self.name, name, data));
        Ok(())
    }

    fn messages(&self) -> MessageHandler<Self> {
        MessageHandler::listed(self.messages.clone())
    }

    fn events(&self) -> EventHandlers<Self> {
        EventHandlers::new().on("click", Self::on_click)
    }
}

impl Module for Probe {
    fn behaviors(&self) -> &[&str] {
        &self.behaviors
    }
}

pub(crate) fn fixture() -> (Rc<MemoryDom>, Application) {
    let dom = MemoryDom::new();
    let app = Application::new(dom.clone());
    (dom, app)
}

/// Append a `data-module` element for `declaration` under the body.
pub(crate) fn module_root(dom: &MemoryDom, declaration: &str) -> NodeId {
    dom.append_element(dom.body(), "div", &[("data-module", declaration)])
}

/// Register a journaling module named `name`.
pub(crate) fn add_probe(app: &Application, name: &str, journal: &Journal) {
    let journal = journal.clone();
    let module = name.to_string();
    app.add_module(name, move |_ctx| Ok(Probe::new(&module, &journal)))
        .unwrap();
}
