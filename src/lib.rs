//! Client-side composition engine for DOM-declared modules.
//!
//! Pages declare module roots with `data-module` attributes. An
//! [`Application`] discovers those roots, builds each module through its
//! registered factory, attaches reusable behaviors, delegates DOM events to
//! them and routes broadcast messages between running instances. Shared
//! infrastructure is exposed as lazily constructed services.
//!
//! The engine talks to the document through the [`DomAdapter`] capability;
//! [`MemoryDom`] provides an in-process implementation for tests and
//! non-browser hosts.

pub mod app;
pub mod component;
pub mod context;
pub mod delegate;
pub mod dom;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
mod registry;
pub mod services;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use app::{Application, ApplicationConfig, ErrorHandler, ModuleDeclaration};
pub use component::{
    Component, DelegatedEvent, EventFn, EventHandlers, MessageFn, MessageHandler, Module,
};
pub use context::Context;
pub use delegate::{DEFAULT_EVENT_TYPES, DelegateHandler, EventDelegate, nearest_type_element};
pub use dom::{DomAdapter, DomEvent, Listener, MemoryDom, NodeId, listener};
pub use error::{AppError, ComponentError, ComponentKind, ComponentResult, Result};
pub use events::{AppEvent, EventData, EventHandler, EventTarget, handler};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink,
};
pub use metrics::{AppMetrics, MetricSnapshot};
pub use services::ServiceScope;
#[cfg(any(test, feature = "testing"))]
pub use testing::{TestComponent, TestServiceProvider};
