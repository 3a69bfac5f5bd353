//! The façade handed to module and behavior factories.
//!
//! A [`Context`] binds one module element to the application. It holds no
//! state of its own and only a weak reference to the engine, so components
//! may store it freely without keeping the application alive.

use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::app::{AppInner, Application, ModuleDeclaration};
use crate::dom::NodeId;
use crate::error::{AppError, ComponentError, Result};

#[derive(Clone)]
pub struct Context {
    app: Weak<AppInner>,
    element: NodeId,
    module: Rc<str>,
}

impl Context {
    pub(crate) fn new(app: &Application, element: NodeId, module: &str) -> Self {
        Self {
            app: app.downgrade(),
            element,
            module: Rc::from(module),
        }
    }

    /// The application this context belongs to, or [`AppError::Detached`]
    /// once it has been dropped.
    pub fn application(&self) -> Result<Application> {
        self.app
            .upgrade()
            .map(Application::from_inner)
            .ok_or(AppError::Detached)
    }

    /// The module root element.
    pub fn element(&self) -> NodeId {
        self.element
    }

    pub fn module_name(&self) -> &str {
        &self.module
    }

    pub fn declaration(&self) -> Option<ModuleDeclaration> {
        self.application().ok()?.declaration(self.element)
    }

    pub fn broadcast(&self, name: &str, data: Value) -> Result<()> {
        self.application()?.broadcast(name, data)
    }

    pub fn get_service<S: 'static>(&self, name: &str) -> Result<Option<Rc<S>>> {
        self.application()?.get_service(name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.application()
            .map(|app| app.has_service(name))
            .unwrap_or(false)
    }

    /// The module's embedded configuration.
    pub fn config(&self) -> Result<Option<Value>> {
        self.application()?.module_config(self.element)
    }

    pub fn config_value(&self, name: &str) -> Result<Option<Value>> {
        self.application()?.module_config_value(self.element, name)
    }

    /// The module's embedded configuration, deserialized into `T`.
    ///
    /// A payload that does not fit `T` is reported as an invalid module
    /// configuration.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let app = self.application()?;
        let Some(config) = app.module_config(self.element)? else {
            return Ok(None);
        };
        match serde_json::from_value(config) {
            Ok(typed) => Ok(Some(typed)),
            Err(err) => {
                app.report_error(AppError::InvalidModuleConfig(err))?;
                Ok(None)
            }
        }
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.application().ok()?.global(name)
    }

    pub fn global_config(&self) -> Map<String, Value> {
        self.application()
            .map(|app| app.global_config())
            .unwrap_or_default()
    }

    pub fn global_config_value(&self, name: &str) -> Option<Value> {
        self.application().ok()?.global_config_value(name)
    }

    /// Route a component-level failure through the application's error
    /// channel. Engine errors keep their kind.
    pub fn report_error(&self, err: impl Into<ComponentError>) -> Result<()> {
        let err: ComponentError = err.into();
        let err = match err.downcast::<AppError>() {
            Ok(app_error) => *app_error,
            Err(other) => AppError::Reported(other),
        };
        self.application()?.report_error(err)
    }
}
