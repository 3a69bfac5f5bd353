//! Event delegation for module roots.
//!
//! One physical listener per supported event type is attached to the module
//! root. When it fires, the delegate resolves the nearest typed element
//! between the event target and the module boundary and hands both to the
//! handler.

use std::rc::{Rc, Weak};

use crate::component::DelegatedEvent;
use crate::dom::{DomAdapter, DomEvent, Listener, MODULE_ATTR, NodeId, TYPE_ATTR, listener};
use crate::error::ComponentResult;

/// Event types bound when the global configuration does not override them.
/// Only types that bubble through the module root are useful here.
pub const DEFAULT_EVENT_TYPES: &[&str] = &[
    "click",
    "mouseover",
    "mouseout",
    "mousedown",
    "mouseup",
    "mouseenter",
    "mouseleave",
    "mousemove",
    "keydown",
    "keyup",
    "submit",
    "change",
    "contextmenu",
    "dblclick",
    "input",
    "focusin",
    "focusout",
];

/// Receiver of delegated events.
pub trait DelegateHandler {
    /// Whether the handler implements `event_type`. Only those types get a listener.
    fn handles(&self, event_type: &str) -> bool;

    fn handle(&self, event: &DelegatedEvent<'_>) -> ComponentResult;
}

/// Nearest ancestor-or-self of `start` carrying `data-type`, not crossing a
/// module root.
///
/// Returns `None` when the walk reaches a node without a parent, which covers
/// targets detached from the document by an earlier handler in the same
/// dispatch.
pub fn nearest_type_element(dom: &dyn DomAdapter, start: NodeId) -> Option<NodeId> {
    let mut current = start;
    loop {
        let parent = dom.parent(current)?;
        if dom.has_attribute(current, TYPE_ATTR) {
            return Some(current);
        }
        if dom.has_attribute(current, MODULE_ATTR) {
            return None;
        }
        current = parent;
    }
}

pub struct EventDelegate {
    element: NodeId,
    dom: Rc<dyn DomAdapter>,
    handler: Rc<dyn DelegateHandler>,
    event_types: Vec<String>,
    bound: Vec<(String, Listener)>,
    attached: bool,
}

impl EventDelegate {
    pub fn new(element: NodeId, dom: Rc<dyn DomAdapter>, handler: Rc<dyn DelegateHandler>) -> Self {
        Self::with_event_types(
            element,
            dom,
            handler,
            DEFAULT_EVENT_TYPES.iter().map(|t| t.to_string()).collect(),
        )
    }

    pub fn with_event_types(
        element: NodeId,
        dom: Rc<dyn DomAdapter>,
        handler: Rc<dyn DelegateHandler>,
        event_types: Vec<String>,
    ) -> Self {
        Self {
            element,
            dom,
            handler,
            event_types,
            bound: Vec::new(),
            attached: false,
        }
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Event types that currently have a listener attached.
    pub fn bound_types(&self) -> Vec<&str> {
        self.bound.iter().map(|(t, _)| t.as_str()).collect()
    }

    /// Attach listeners for every supported type the handler implements.
    /// Calling again while attached does nothing.
    pub fn attach_events(&mut self) {
        if self.attached {
            return;
        }

        for event_type in &self.event_types {
            if !self.handler.handles(event_type) {
                continue;
            }
            let bound = self.make_listener();
            self.dom.on(self.element, event_type, Rc::clone(&bound));
            self.bound.push((event_type.clone(), bound));
        }

        self.attached = true;
    }

    /// Remove exactly the listeners this delegate attached.
    pub fn detach_events(&mut self) {
        for (event_type, bound) in self.bound.drain(..) {
            self.dom.off(self.element, &event_type, &bound);
        }
        self.attached = false;
    }

    fn make_listener(&self) -> Listener {
        // The adapter owns the listener, so holding it strongly would leak.
        let dom: Weak<dyn DomAdapter> = Rc::downgrade(&self.dom);
        let handler = Rc::clone(&self.handler);
        listener(move |event: &DomEvent| {
            let Some(dom) = dom.upgrade() else {
                return Ok(());
            };
            let element = nearest_type_element(dom.as_ref(), event.target);
            let element_type = element
                .and_then(|e| dom.attribute(e, TYPE_ATTR))
                .unwrap_or_default();
            handler.handle(&DelegatedEvent {
                event,
                element,
                element_type: &element_type,
            })
        })
    }
}
