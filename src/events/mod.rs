//! Minimal publish/subscribe bus.
//!
//! The application owns one [`EventTarget`] and exposes it as its `on`, `off`
//! and `fire` surface. Handlers are compared by `Rc` identity, so the same
//! handler is only registered once per event type.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::error::AppError;

/// Payload carried by an [`AppEvent`].
#[derive(Debug, Clone)]
pub enum EventData {
    None,
    /// Fired after every broadcast.
    Message { message: String, data: Value },
    /// Fired for errors routed through `report_error` in production mode.
    Error(Rc<AppError>),
    Custom(Value),
}

#[derive(Debug, Clone)]
pub struct AppEvent {
    pub event_type: String,
    pub data: EventData,
}

impl AppEvent {
    pub fn error(&self) -> Option<&AppError> {
        match &self.data {
            EventData::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<(&str, &Value)> {
        match &self.data {
            EventData::Message { message, data } => Some((message, data)),
            _ => None,
        }
    }
}

pub type EventHandler = Rc<dyn Fn(&AppEvent)>;

/// Wrap a closure as an [`EventHandler`].
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&AppEvent) + 'static,
{
    Rc::new(f)
}

fn same_handler(a: &EventHandler, b: &EventHandler) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

#[derive(Default)]
pub struct EventTarget {
    handlers: RefCell<HashMap<String, Vec<EventHandler>>>,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type`. Registering the same handler twice is a no-op.
    pub fn on(&self, event_type: &str, handler: EventHandler) {
        let mut handlers = self.handlers.borrow_mut();
        let entry = handlers.entry(event_type.to_string()).or_default();
        if !entry.iter().any(|h| same_handler(h, &handler)) {
            entry.push(handler);
        }
    }

    pub fn off(&self, event_type: &str, handler: &EventHandler) {
        let mut handlers = self.handlers.borrow_mut();
        if let Some(entry) = handlers.get_mut(event_type) {
            entry.retain(|h| !same_handler(h, handler));
            if entry.is_empty() {
                handlers.remove(event_type);
            }
        }
    }

    /// Call every handler of `event_type` in registration order.
    ///
    /// Iterates a snapshot, so handlers may register or remove handlers
    /// (including themselves) without affecting the current dispatch.
    pub fn fire(&self, event_type: &str, data: EventData) {
        let snapshot: Vec<EventHandler> = match self.handlers.borrow().get(event_type) {
            Some(entry) => entry.clone(),
            None => return,
        };
        let event = AppEvent {
            event_type: event_type.to_string(),
            data,
        };
        for handler in snapshot {
            handler(&event);
        }
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers
            .borrow()
            .get(event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;

    #[test]
    fn handlers_run_in_order_with_payload() {
        let bus = EventTarget::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&seen);
        bus.on("custom", handler(move |e| first.borrow_mut().push(format!("1:{}", e.event_type))));
        let second = Rc::clone(&seen);
        bus.on(
            "custom",
            handler(move |e| {
                if let EventData::Custom(value) = &e.data {
                    second.borrow_mut().push(format!("2:{value}"));
                }
            }),
        );

        bus.fire("custom", EventData::Custom(json!(7)));
        assert_eq!(*seen.borrow(), vec!["1:custom", "2:7"]);
    }

    #[test]
    fn duplicate_handlers_are_suppressed() {
        let bus = EventTarget::new();
        let h = handler(|_| {});
        bus.on("init", Rc::clone(&h));
        bus.on("init", Rc::clone(&h));
        assert_eq!(bus.handler_count("init"), 1);
        bus.off("init", &h);
        assert_eq!(bus.handler_count("init"), 0);
    }

    #[test]
    fn off_only_removes_the_given_handler() {
        let bus = EventTarget::new();
        let a = handler(|_| {});
        let b = handler(|_| {});
        bus.on("x", Rc::clone(&a));
        bus.on("x", Rc::clone(&b));
        bus.off("x", &a);
        assert_eq!(bus.handler_count("x"), 1);
    }

    #[test]
    fn removal_during_dispatch_does_not_skip_handlers() {
        let bus = Rc::new(EventTarget::new());
        let calls = Rc::new(RefCell::new(Vec::new()));
        let slot: Rc<RefCell<Option<EventHandler>>> = Rc::new(RefCell::new(None));

        let bus_ref = Rc::clone(&bus);
        let slot_ref = Rc::clone(&slot);
        let log = Rc::clone(&calls);
        let remover = handler(move |_| {
            log.borrow_mut().push("remover");
            if let Some(me) = slot_ref.borrow().as_ref() {
                bus_ref.off("tick", me);
            }
        });
        *slot.borrow_mut() = Some(Rc::clone(&remover));
        bus.on("tick", remover);

        let log = Rc::clone(&calls);
        bus.on("tick", handler(move |_| log.borrow_mut().push("after")));

        bus.fire("tick", EventData::None);
        bus.fire("tick", EventData::None);
        assert_eq!(*calls.borrow(), vec!["remover", "after", "after"]);
    }
}
