//! Arena-backed DOM used by tests and headless hosts.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::ComponentError;

use super::core::{DomAdapter, DomEvent, Listener, NodeId, same_listener};
use super::selector::Selector;

#[derive(Debug)]
struct MemoryNode {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attrs: Vec<(String, String)>,
    text: String,
}

impl MemoryNode {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            parent: None,
            children: Vec::new(),
            attrs: Vec::new(),
            text: String::new(),
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory document. Node 0 is `<html>` and node 1 is its `<body>`.
///
/// Nodes are never freed; removing a node only detaches its subtree, which
/// keeps every [`NodeId`] valid for the lifetime of the document.
pub struct MemoryDom {
    nodes: RefCell<Vec<MemoryNode>>,
    listeners: RefCell<HashMap<(NodeId, String), Vec<Listener>>>,
}

impl MemoryDom {
    pub fn new() -> Rc<Self> {
        let dom = Self {
            nodes: RefCell::new(vec![MemoryNode::new("html")]),
            listeners: RefCell::new(HashMap::new()),
        };
        let body = dom.create_element("body");
        dom.append_child(NodeId(0), body);
        Rc::new(dom)
    }

    /// The `<body>` element.
    pub fn body(&self) -> NodeId {
        NodeId(1)
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len() as u32);
        nodes.push(MemoryNode::new(tag));
        id
    }

    /// Create an element with attributes and append it to `parent`.
    pub fn append_element(&self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let id = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attribute(id, name, value);
        }
        self.append_child(parent, id);
        id
    }

    /// Append `child` as last child of `parent`, detaching it from any previous parent.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.remove(child);
        let mut nodes = self.nodes.borrow_mut();
        if parent.index() >= nodes.len() || child.index() >= nodes.len() {
            return;
        }
        nodes[child.index()].parent = Some(parent);
        nodes[parent.index()].children.push(child);
    }

    /// Detach `node` (and its subtree) from its parent.
    pub fn remove(&self, node: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        let Some(parent) = nodes.get(node.index()).and_then(|n| n.parent) else {
            return;
        };
        nodes[parent.index()].children.retain(|c| *c != node);
        nodes[node.index()].parent = None;
    }

    pub fn set_text(&self, node: NodeId, text: &str) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(node.index()) {
            n.text = text.to_string();
        }
    }

    pub fn remove_attribute(&self, element: NodeId, name: &str) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(element.index()) {
            n.attrs.retain(|(k, _)| k != name);
        }
    }

    pub fn tag_name(&self, element: NodeId) -> Option<String> {
        self.nodes.borrow().get(element.index()).map(|n| n.tag.clone())
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .borrow()
            .get(node.index())
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// True when the node is reachable from the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let nodes = self.nodes.borrow();
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.document_root() {
                return true;
            }
            current = nodes.get(id.index()).and_then(|n| n.parent);
        }
        false
    }

    /// Number of listeners of `event_type` attached to `element`.
    pub fn listener_count(&self, element: NodeId, event_type: &str) -> usize {
        self.listeners
            .borrow()
            .get(&(element, event_type.to_string()))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Total number of listeners attached anywhere in the document.
    pub fn total_listeners(&self) -> usize {
        self.listeners.borrow().values().map(Vec::len).sum()
    }

    /// Dispatch a synthetic event at `target`.
    ///
    /// Bubbling events walk from the target up to the root. Listeners on each
    /// node run in registration order over a snapshot, so listeners may add or
    /// remove listeners and nodes. The first listener error aborts dispatch.
    pub fn dispatch(&self, target: NodeId, event_type: &str) -> Result<DomEvent, ComponentError> {
        let event = DomEvent::new(event_type, target);
        self.dispatch_event(&event)?;
        Ok(event)
    }

    pub fn dispatch_event(&self, event: &DomEvent) -> Result<(), ComponentError> {
        let path = self.propagation_path(event.target, event.bubbles);
        for node in path {
            event.set_current_target(Some(node));
            let snapshot: Vec<Listener> = self
                .listeners
                .borrow()
                .get(&(node, event.event_type.clone()))
                .cloned()
                .unwrap_or_default();
            for listener in snapshot {
                listener(event)?;
            }
            if event.is_propagation_stopped() {
                break;
            }
        }
        event.set_current_target(None);
        Ok(())
    }

    fn propagation_path(&self, target: NodeId, bubbles: bool) -> Vec<NodeId> {
        let nodes = self.nodes.borrow();
        if target.index() >= nodes.len() {
            return Vec::new();
        }
        let mut path = vec![target];
        if bubbles {
            let mut current = nodes[target.index()].parent;
            while let Some(id) = current {
                path.push(id);
                current = nodes[id.index()].parent;
            }
        }
        path
    }

    fn collect_matches(&self, root: NodeId, selector: &Selector, first_only: bool) -> Vec<NodeId> {
        let nodes = self.nodes.borrow();
        let mut found = Vec::new();
        let Some(root_node) = nodes.get(root.index()) else {
            return found;
        };

        // Pre-order walk so results come back in document order.
        let mut stack: Vec<NodeId> = root_node.children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &nodes[id.index()];
            if selector.matches(&node.tag, |name| node.attr(name).map(str::to_string)) {
                found.push(id);
                if first_only {
                    break;
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
        found
    }

    fn collect_text(nodes: &[MemoryNode], node: NodeId, out: &mut String) {
        let Some(n) = nodes.get(node.index()) else {
            return;
        };
        out.push_str(&n.text);
        for child in &n.children {
            Self::collect_text(nodes, *child, out);
        }
    }
}

impl DomAdapter for MemoryDom {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn document_root(&self) -> NodeId {
        NodeId(0)
    }

    fn query(&self, root: NodeId, selector: &str) -> Option<NodeId> {
        let selector = Selector::parse(selector)?;
        self.collect_matches(root, &selector, true).into_iter().next()
    }

    fn query_all(&self, root: NodeId, selector: &str) -> Vec<NodeId> {
        match Selector::parse(selector) {
            Some(selector) => self.collect_matches(root, &selector, false),
            None => Vec::new(),
        }
    }

    fn on(&self, element: NodeId, event_type: &str, listener: Listener) {
        let mut listeners = self.listeners.borrow_mut();
        let entry = listeners
            .entry((element, event_type.to_string()))
            .or_default();
        if !entry.iter().any(|l| same_listener(l, &listener)) {
            entry.push(listener);
        }
    }

    fn off(&self, element: NodeId, event_type: &str, listener: &Listener) {
        let mut listeners = self.listeners.borrow_mut();
        let key = (element, event_type.to_string());
        if let Some(entry) = listeners.get_mut(&key) {
            entry.retain(|l| !same_listener(l, listener));
            if entry.is_empty() {
                listeners.remove(&key);
            }
        }
    }

    fn attribute(&self, element: NodeId, name: &str) -> Option<String> {
        self.nodes
            .borrow()
            .get(element.index())
            .and_then(|n| n.attr(name).map(str::to_string))
    }

    fn set_attribute(&self, element: NodeId, name: &str, value: &str) {
        let mut nodes = self.nodes.borrow_mut();
        let Some(node) = nodes.get_mut(element.index()) else {
            return;
        };
        match node.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => node.attrs.push((name.to_string(), value.to_string())),
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(node.index()).and_then(|n| n.parent)
    }

    fn text_content(&self, node: NodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        Self::collect_text(&nodes, node, &mut out);
        out
    }
}
