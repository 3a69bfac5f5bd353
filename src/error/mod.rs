//! Error types shared across the engine.

mod types;

pub use types::{AppError, ComponentError, ComponentKind, ComponentResult, Result};
