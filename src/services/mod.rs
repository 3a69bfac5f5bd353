//! Lazy singleton services.
//!
//! Services are stored type-erased and built on first request. A factory
//! receives a [`ServiceScope`], which derefs to the [`Application`] and
//! threads the resolution stack through nested `get_service` calls so that
//! dependency cycles are reported instead of recursing forever.

use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use serde_json::json;

use crate::app::Application;
use crate::error::{AppError, Result};
use crate::logging::{LogLevel, json_kv};
use crate::metrics::AppMetrics;
use crate::registry::ServiceInstance;

/// One synchronous service resolution chain.
pub struct ServiceScope {
    app: Application,
    stack: Rc<RefCell<Vec<String>>>,
}

impl ServiceScope {
    pub(crate) fn new(app: Application) -> Self {
        Self {
            app,
            stack: Rc::default(),
        }
    }

    pub fn application(&self) -> &Application {
        &self.app
    }

    /// Services under construction in this chain, outermost first.
    pub fn resolving(&self) -> Vec<String> {
        self.stack.borrow().clone()
    }

    /// Resolve `name` within this chain and downcast it to `S`.
    ///
    /// Unknown names, cycles, factory failures and type mismatches are
    /// reported; `Ok(None)` means the report was routed to the `error` event.
    pub fn get_service<S: 'static>(&self, name: &str) -> Result<Option<Rc<S>>> {
        let Some(instance) = self.resolve(name)? else {
            return Ok(None);
        };
        match instance.downcast::<S>() {
            Ok(service) => Ok(Some(service)),
            Err(_) => {
                self.app
                    .report_error(AppError::ServiceTypeMismatch(name.to_string()))?;
                Ok(None)
            }
        }
    }

    fn resolve(&self, name: &str) -> Result<Option<ServiceInstance>> {
        if let Some(stub) = self.app.service_stub(name) {
            return Ok(Some(stub));
        }
        let entry = self.app.registry().borrow().service(name);
        let factory = match entry {
            None => {
                self.app
                    .report_error(AppError::ServiceNotFound(name.to_string()))?;
                return Ok(None);
            }
            Some(Ok(instance)) => return Ok(Some(instance)),
            Some(Err(factory)) => factory,
        };

        // Leave the stack untouched so the outer frames still pop their own names.
        if self.stack.borrow().iter().any(|pending| pending == name) {
            let mut path = self.stack.borrow().clone();
            path.push(name.to_string());
            self.app.report_error(AppError::CircularDependency(path))?;
            return Ok(None);
        }

        self.stack.borrow_mut().push(name.to_string());
        let created = factory(self);
        self.stack.borrow_mut().pop();

        match created {
            Ok(instance) => {
                let instance = self
                    .app
                    .registry()
                    .borrow_mut()
                    .memoize_service(name, instance);
                self.app.with_metrics(AppMetrics::record_service);
                self.app.log_app_event(
                    LogLevel::Debug,
                    "service_created",
                    [
                        json_kv("service", json!(name)),
                        json_kv("depth", json!(self.stack.borrow().len())),
                    ],
                );
                Ok(Some(instance))
            }
            Err(source) => {
                self.app
                    .settle(Err(AppError::component(name, "create", source)))?;
                Ok(None)
            }
        }
    }
}

impl Deref for ServiceScope {
    type Target = Application;

    fn deref(&self) -> &Application {
        &self.app
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::dom::MemoryDom;
    use crate::events::handler;

    struct Database {
        url: String,
    }

    struct Repository {
        db: Rc<Database>,
    }

    fn app() -> Application {
        Application::new(MemoryDom::new())
    }

    fn errors_of(app: &Application) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        app.on(
            "error",
            handler(move |event| {
                if let Some(err) = event.error() {
                    sink.borrow_mut().push(err.to_string());
                }
            }),
        );
        seen
    }

    #[test]
    fn services_are_built_once_and_shared() {
        let app = app();
        let builds = Rc::new(Cell::new(0));
        let counter = Rc::clone(&builds);
        app.add_service("db", move |_scope| {
            counter.set(counter.get() + 1);
            Ok(Database {
                url: "memory://".into(),
            })
        })
        .unwrap();

        let first = app.get_service::<Database>("db").unwrap().unwrap();
        let second = app.get_service::<Database>("db").unwrap().unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(builds.get(), 1);
        assert_eq!(first.url, "memory://");
    }

    #[test]
    fn factories_resolve_dependencies_through_the_scope() {
        let app = app();
        app.add_service("repo", |scope| {
            assert_eq!(scope.resolving(), vec!["repo"]);
            let db = scope
                .get_service::<Database>("db")?
                .ok_or("db unavailable")?;
            Ok(Repository { db })
        })
        .unwrap();
        app.add_service("db", |_scope| Ok(Database { url: "pg".into() }))
            .unwrap();

        let repo = app.get_service::<Repository>("repo").unwrap().unwrap();
        let db = app.get_service::<Database>("db").unwrap().unwrap();
        assert!(Rc::ptr_eq(&repo.db, &db));
    }

    #[test]
    fn cycles_report_the_full_path() {
        let app = app();
        app.set_global_config(json!({ "debug": true })).unwrap();
        app.add_service("a", |scope| {
            scope.get_service::<u8>("b")?;
            Ok(1u8)
        })
        .unwrap();
        app.add_service("b", |scope| {
            scope.get_service::<u8>("a")?;
            Ok(2u8)
        })
        .unwrap();

        let err = app.get_service::<u8>("a").unwrap_err();
        assert_eq!(err.to_string(), "Circular service dependency: a -> b -> a");
        assert!(matches!(err, AppError::CircularDependency(ref path) if path.len() == 3));
    }

    #[test]
    fn cycles_in_production_leave_no_stale_stack_entries() {
        let app = app();
        let errors = errors_of(&app);
        app.add_service("a", |scope| {
            let b = scope.get_service::<u8>("b")?;
            Ok(b.map(|b| *b + 1).unwrap_or(0))
        })
        .unwrap();
        app.add_service("b", |scope| {
            let a = scope.get_service::<u8>("a")?;
            assert!(a.is_none());
            Ok(7u8)
        })
        .unwrap();

        assert_eq!(*app.get_service::<u8>("a").unwrap().unwrap(), 8);
        assert_eq!(
            *errors.borrow(),
            vec!["Circular service dependency: a -> b -> a"]
        );
        // Both services memoized, so a second lookup reports nothing.
        assert_eq!(*app.get_service::<u8>("b").unwrap().unwrap(), 7);
        assert_eq!(errors.borrow().len(), 1);
    }

    #[test]
    fn unknown_and_mistyped_services_are_reported() {
        let app = app();
        let errors = errors_of(&app);
        app.add_service("n", |_scope| Ok(5u32)).unwrap();

        assert!(app.get_service::<u32>("missing").unwrap().is_none());
        assert!(app.get_service::<String>("n").unwrap().is_none());
        assert_eq!(
            *errors.borrow(),
            vec![
                "Service \"missing\" not found",
                "Service \"n\" is not of the requested type",
            ]
        );
    }

    #[test]
    fn failed_factories_are_retried_on_next_request() {
        let app = app();
        let errors = errors_of(&app);
        let attempts = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&attempts);
        app.add_service("flaky", move |_scope| {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                return Err("not yet".into());
            }
            Ok(counter.get())
        })
        .unwrap();

        assert!(app.get_service::<u32>("flaky").unwrap().is_none());
        assert_eq!(*errors.borrow(), vec!["flaky.create() - not yet"]);
        assert_eq!(*app.get_service::<u32>("flaky").unwrap().unwrap(), 2);
    }
}
