//! DOM capability consumed by the engine.
//!
//! The engine never touches markup directly. It sees elements as [`NodeId`]
//! handles and asks a [`DomAdapter`] to query them, read attributes and
//! subscribe listeners. [`MemoryDom`] is the arena-backed implementation used
//! by tests and non-browser hosts.

mod core;
mod memory;
mod selector;

pub use self::core::{DomAdapter, DomEvent, Listener, NodeId, listener, same_listener};
pub use memory::MemoryDom;
pub use selector::{AttrMatcher, Selector};

/// Attribute declaring a module root. The first whitespace-delimited token is
/// the module name.
pub const MODULE_ATTR: &str = "data-module";

/// Attribute marking a typed element for delegated event targeting.
pub const TYPE_ATTR: &str = "data-type";

/// Selector used to discover module roots.
pub const MODULE_SELECTOR: &str = "[data-module]";

/// Selector locating the JSON configuration payload under a module root.
pub const CONFIG_SELECTOR: &str = "script[type=\"text/x-config\"]";
