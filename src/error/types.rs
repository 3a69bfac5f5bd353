use std::fmt;

use thiserror::Error;

/// Unified result type for the engine's public API.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error produced by component code (modules, behaviors, services).
pub type ComponentError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned from component methods.
pub type ComponentResult<T = ()> = std::result::Result<T, ComponentError>;

/// The three component directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Module,
    Behavior,
    Service,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComponentKind::Module => "Module",
            ComponentKind::Behavior => "Behavior",
            ComponentKind::Service => "Service",
        };
        f.write_str(label)
    }
}

/// Errors surfaced by the application engine.
///
/// In debug mode these are returned to the caller of the triggering API; in
/// production mode they are delivered as the payload of the `error` event.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{kind} {name} has already been added.")]
    DuplicateRegistration { kind: ComponentKind, name: String },
    #[error("Module type \"{0}\" is not defined.")]
    ModuleNotDefined(String),
    #[error("Behavior \"{0}\" not found")]
    BehaviorNotFound(String),
    #[error("Behavior \"{0}\" cannot be specified twice in a module.")]
    DuplicateBehavior(String),
    #[error("Service \"{0}\" not found")]
    ServiceNotFound(String),
    #[error("Service \"{0}\" is not of the requested type")]
    ServiceTypeMismatch(String),
    #[error("Circular service dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),
    #[error("Cannot set global configuration after application initialization")]
    ConfigAfterInit,
    #[error("Cannot install an error handler after application initialization")]
    ErrorHandlerAfterInit,
    #[error("Unable to stop module associated with element: {0}")]
    ModuleNotStarted(String),
    #[error("invalid module configuration: {0}")]
    InvalidModuleConfig(#[from] serde_json::Error),
    #[error("{component}.{method}() - {source}")]
    ComponentRuntime {
        component: String,
        method: String,
        #[source]
        source: ComponentError,
    },
    #[error("{component}.{method}() - component is already executing")]
    Reentrant { component: String, method: String },
    #[error("application has been dropped")]
    Detached,
    #[error(transparent)]
    Reported(ComponentError),
}

impl AppError {
    /// Annotate a component failure with the owning component and method.
    ///
    /// Engine errors raised from inside component code (for example a debug
    /// mode `ServiceNotFound` bubbled up with `?`) pass through unchanged so
    /// the original kind stays observable.
    pub fn component(component: &str, method: &str, source: ComponentError) -> Self {
        match source.downcast::<AppError>() {
            Ok(app_error) => *app_error,
            Err(source) => AppError::ComponentRuntime {
                component: component.to_string(),
                method: method.to_string(),
                source,
            },
        }
    }

    /// Component name attached by the error channel, if any.
    pub fn component_name(&self) -> Option<&str> {
        match self {
            AppError::ComponentRuntime { component, .. } | AppError::Reentrant { component, .. } => {
                Some(component)
            }
            _ => None,
        }
    }

    /// Method name attached by the error channel, if any.
    pub fn method_name(&self) -> Option<&str> {
        match self {
            AppError::ComponentRuntime { method, .. } | AppError::Reentrant { method, .. } => {
                Some(method)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_dependency_lists_full_path() {
        let err = AppError::CircularDependency(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Circular service dependency: a -> b -> a");
    }

    #[test]
    fn component_errors_are_prefixed() {
        let err = AppError::component("cart", "init", "boom".into());
        assert_eq!(err.to_string(), "cart.init() - boom");
        assert_eq!(err.component_name(), Some("cart"));
        assert_eq!(err.method_name(), Some("init"));
    }

    #[test]
    fn engine_errors_pass_through_annotation() {
        let inner: ComponentError = Box::new(AppError::ServiceNotFound("auth".into()));
        let err = AppError::component("cart", "init", inner);
        assert!(matches!(err, AppError::ServiceNotFound(name) if name == "auth"));
    }

    #[test]
    fn duplicate_registration_names_kind() {
        let err = AppError::DuplicateRegistration {
            kind: ComponentKind::Service,
            name: "auth".into(),
        };
        assert_eq!(err.to_string(), "Service auth has already been added.");
    }
}
