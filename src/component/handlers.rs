use serde_json::Value;

use crate::dom::{DomEvent, NodeId};
use crate::error::ComponentResult;

/// Handler for one named message.
pub type MessageFn<C> = fn(&mut C, &Value) -> ComponentResult;

/// Handler for one delegated event type.
pub type EventFn<C> = fn(&mut C, &DelegatedEvent<'_>) -> ComponentResult;

/// How a component declares interest in broadcasts.
pub enum MessageHandler<C> {
    /// Listed names are delivered to [`Component::on_message`](super::Component::on_message).
    Listed(Vec<String>),
    /// Each name has its own handler, which receives only the data.
    Named(Vec<(String, MessageFn<C>)>),
}

impl<C> MessageHandler<C> {
    pub fn none() -> Self {
        MessageHandler::Listed(Vec::new())
    }

    pub fn listed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MessageHandler::Listed(names.into_iter().map(Into::into).collect())
    }

    pub fn named() -> Self {
        MessageHandler::Named(Vec::new())
    }

    /// Add a named handler. An empty `Listed` handler is promoted to `Named`;
    /// a non-empty one keeps its listed routing and ignores `handler`.
    pub fn on(self, name: impl Into<String>, handler: MessageFn<C>) -> Self {
        let mut routes = match self {
            MessageHandler::Named(routes) => routes,
            MessageHandler::Listed(names) if names.is_empty() => Vec::new(),
            listed @ MessageHandler::Listed(_) => return listed,
        };
        routes.push((name.into(), handler));
        MessageHandler::Named(routes)
    }

    pub fn accepts(&self, name: &str) -> bool {
        match self {
            MessageHandler::Listed(names) => names.iter().any(|n| n == name),
            MessageHandler::Named(routes) => routes.iter().any(|(n, _)| n == name),
        }
    }

    pub fn names(&self) -> Vec<String> {
        match self {
            MessageHandler::Listed(names) => names.clone(),
            MessageHandler::Named(routes) => routes.iter().map(|(n, _)| n.clone()).collect(),
        }
    }

    pub(crate) fn route(&self, name: &str) -> Option<MessageFn<C>> {
        match self {
            MessageHandler::Named(routes) => {
                routes.iter().find(|(n, _)| n == name).map(|(_, f)| *f)
            }
            MessageHandler::Listed(_) => None,
        }
    }
}

/// Event handlers declared by a component.
pub struct EventHandlers<C> {
    handlers: Vec<(String, EventFn<C>)>,
}

impl<C> Default for EventHandlers<C> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<C> EventHandlers<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type`, replacing an earlier one.
    pub fn on(mut self, event_type: impl Into<String>, handler: EventFn<C>) -> Self {
        let event_type = event_type.into();
        self.handlers.retain(|(t, _)| *t != event_type);
        self.handlers.push((event_type, handler));
        self
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.handlers.iter().any(|(t, _)| t == event_type)
    }

    pub fn event_types(&self) -> Vec<String> {
        self.handlers.iter().map(|(t, _)| t.clone()).collect()
    }

    pub(crate) fn get(&self, event_type: &str) -> Option<EventFn<C>> {
        self.handlers
            .iter()
            .find(|(t, _)| t == event_type)
            .map(|(_, f)| *f)
    }
}

/// A native event after delegation resolved its typed element.
#[derive(Debug, Clone, Copy)]
pub struct DelegatedEvent<'a> {
    pub event: &'a DomEvent,
    /// Nearest ancestor of the target carrying `data-type`, within the module.
    pub element: Option<NodeId>,
    /// Value of the typed element's `data-type`, empty when there is none.
    pub element_type: &'a str,
}

impl DelegatedEvent<'_> {
    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    fn bump(c: &mut Counter, _data: &Value) -> ComponentResult {
        c.0 += 1;
        Ok(())
    }

    fn click(c: &mut Counter, _event: &DelegatedEvent<'_>) -> ComponentResult {
        c.0 += 10;
        Ok(())
    }

    #[test]
    fn listed_routing_accepts_only_listed_names() {
        let handler: MessageHandler<Counter> = MessageHandler::listed(["a", "b"]);
        assert!(handler.accepts("a"));
        assert!(!handler.accepts("c"));
        assert!(handler.route("a").is_none());
    }

    #[test]
    fn named_routing_resolves_handlers() {
        let handler = MessageHandler::named().on("bump", bump);
        let mut counter = Counter(0);
        let f = handler.route("bump").unwrap();
        f(&mut counter, &Value::Null).unwrap();
        assert_eq!(counter.0, 1);
        assert_eq!(handler.names(), vec!["bump"]);
    }

    #[test]
    fn none_promotes_to_named() {
        let handler = MessageHandler::<Counter>::none().on("bump", bump);
        assert!(matches!(handler, MessageHandler::Named(_)));
    }

    #[test]
    fn later_event_handler_replaces_earlier() {
        let handlers = EventHandlers::new().on("click", click).on("click", click);
        assert_eq!(handlers.event_types(), vec!["click"]);
        assert!(handlers.handles("click"));
        assert!(handlers.get("keyup").is_none());
    }
}
