//! Component contracts for modules and behaviors.
//!
//! A module is created per DOM element by its factory, receives a
//! [`Context`](crate::Context), and may list behaviors that augment it.
//! Message and event routing are declared once, when the instance is created,
//! through [`MessageHandler`] and [`EventHandlers`].

mod guard;
mod handlers;

pub(crate) use guard::{ComponentSlot, Deferred, Instance};
pub use handlers::{DelegatedEvent, EventFn, EventHandlers, MessageFn, MessageHandler};

use serde_json::Value;

use crate::error::ComponentResult;

/// Lifecycle and routing surface shared by modules and behaviors.
pub trait Component: 'static {
    fn init(&mut self) -> ComponentResult {
        Ok(())
    }

    fn destroy(&mut self) -> ComponentResult {
        Ok(())
    }

    /// Receives messages routed by [`MessageHandler::Listed`].
    fn on_message(&mut self, _name: &str, _data: &Value) -> ComponentResult {
        Ok(())
    }

    /// Messages this component listens to.
    fn messages(&self) -> MessageHandler<Self>
    where
        Self: Sized,
    {
        MessageHandler::none()
    }

    /// Delegated DOM event handlers, keyed by event type.
    fn events(&self) -> EventHandlers<Self>
    where
        Self: Sized,
    {
        EventHandlers::new()
    }
}

/// A component bound to a DOM element.
pub trait Module: Component {
    /// Behavior names to attach, in initialization order.
    fn behaviors(&self) -> &[&str] {
        &[]
    }
}
