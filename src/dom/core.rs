use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::ComponentResult;

/// Handle to a node owned by a [`DomAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A native UI event as seen by listeners.
///
/// Flags use interior mutability so every listener along the propagation path
/// can share one `&DomEvent`.
#[derive(Debug, Clone)]
pub struct DomEvent {
    pub event_type: String,
    pub target: NodeId,
    pub bubbles: bool,
    pub cancelable: bool,
    current_target: Cell<Option<NodeId>>,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

impl DomEvent {
    pub fn new(event_type: impl Into<String>, target: NodeId) -> Self {
        let event_type = event_type.into();
        Self {
            bubbles: Self::type_bubbles(&event_type),
            event_type,
            target,
            cancelable: true,
            current_target: Cell::new(None),
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
        }
    }

    /// Whether native events of this type bubble.
    pub fn type_bubbles(event_type: &str) -> bool {
        !matches!(
            event_type,
            "mouseenter" | "mouseleave" | "focus" | "blur" | "load" | "unload"
        )
    }

    /// Node whose listeners are currently running.
    pub fn current_target(&self) -> Option<NodeId> {
        self.current_target.get()
    }

    pub fn set_current_target(&self, node: Option<NodeId>) {
        self.current_target.set(node);
    }

    pub fn prevent_default(&self) {
        if self.cancelable {
            self.default_prevented.set(true);
        }
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }
}

/// Physical listener attached to an element. Identity is the `Rc` allocation.
pub type Listener = Rc<dyn Fn(&DomEvent) -> ComponentResult>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&DomEvent) -> ComponentResult + 'static,
{
    Rc::new(f)
}

/// Compare two listeners by allocation, ignoring vtable identity.
pub fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// Element query and event subscription capability.
///
/// Implementations use interior mutability: the engine calls back into the
/// adapter from inside listeners, so no method may hold a borrow while a
/// listener runs.
pub trait DomAdapter {
    /// Short identifier of the implementation, e.g. `"memory"`.
    fn kind(&self) -> &'static str;

    /// Root used by `init`/`destroy` to discover modules.
    fn document_root(&self) -> NodeId;

    /// First descendant of `root` matching `selector`.
    fn query(&self, root: NodeId, selector: &str) -> Option<NodeId>;

    /// All descendants of `root` matching `selector`, in document order.
    fn query_all(&self, root: NodeId, selector: &str) -> Vec<NodeId>;

    fn on(&self, element: NodeId, event_type: &str, listener: Listener);

    fn off(&self, element: NodeId, event_type: &str, listener: &Listener);

    fn attribute(&self, element: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, element: NodeId, name: &str, value: &str);

    /// Parent node, `None` for the root or a detached node.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Concatenated text of the node and its descendants.
    fn text_content(&self, node: NodeId) -> String;

    fn has_attribute(&self, element: NodeId, name: &str) -> bool {
        self.attribute(element, name).is_some()
    }

    /// Non-empty `id` attribute of the element.
    fn element_id(&self, element: NodeId) -> Option<String> {
        self.attribute(element, "id").filter(|id| !id.is_empty())
    }
}
