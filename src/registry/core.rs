use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use crate::component::{Component, ComponentSlot, Module};
use crate::context::Context;
use crate::error::{AppError, ComponentKind, ComponentResult, Result};
use crate::services::ServiceScope;

pub(crate) type ModuleFactory = Rc<dyn Fn(Context) -> ComponentResult<ComponentSlot>>;
pub(crate) type BehaviorFactory = Rc<dyn Fn(Context) -> ComponentResult<ComponentSlot>>;
pub(crate) type ServiceInstance = Rc<dyn Any>;
pub(crate) type ServiceFactory = Rc<dyn Fn(&ServiceScope) -> ComponentResult<ServiceInstance>>;

pub(crate) fn module_factory<M, F>(name: &str, create: F) -> ModuleFactory
where
    M: Module,
    F: Fn(Context) -> ComponentResult<M> + 'static,
{
    let name: Rc<str> = Rc::from(name);
    Rc::new(move |ctx: Context| -> ComponentResult<ComponentSlot> {
        create(ctx).map(|module| ComponentSlot::module(&name, module))
    })
}

pub(crate) fn behavior_factory<B, F>(name: &str, create: F) -> BehaviorFactory
where
    B: Component,
    F: Fn(Context) -> ComponentResult<B> + 'static,
{
    let name: Rc<str> = Rc::from(name);
    Rc::new(move |ctx: Context| -> ComponentResult<ComponentSlot> {
        create(ctx).map(|behavior| ComponentSlot::behavior(&name, behavior))
    })
}

pub(crate) fn service_factory<S, F>(create: F) -> ServiceFactory
where
    S: 'static,
    F: Fn(&ServiceScope) -> ComponentResult<S> + 'static,
{
    Rc::new(move |scope: &ServiceScope| -> ComponentResult<ServiceInstance> {
        create(scope).map(|service| Rc::new(service) as ServiceInstance)
    })
}

struct ModuleDescriptor {
    factory: ModuleFactory,
    /// Suffix for the next auto-assigned element id.
    counter: u32,
}

struct BehaviorDescriptor {
    factory: BehaviorFactory,
}

struct ServiceDescriptor {
    factory: ServiceFactory,
    instance: Option<ServiceInstance>,
}

/// The three component directories owned by one application.
///
/// Registration is insert-if-absent. Callers clone factories out before
/// invoking them so no borrow of the registry is held across component code.
#[derive(Default)]
pub(crate) struct ComponentRegistry {
    modules: HashMap<String, ModuleDescriptor>,
    behaviors: HashMap<String, BehaviorDescriptor>,
    services: HashMap<String, ServiceDescriptor>,
}

fn duplicate(kind: ComponentKind, name: &str) -> AppError {
    AppError::DuplicateRegistration {
        kind,
        name: name.to_string(),
    }
}

impl ComponentRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_module(&mut self, name: &str, factory: ModuleFactory) -> Result<()> {
        if self.modules.contains_key(name) {
            return Err(duplicate(ComponentKind::Module, name));
        }
        self.modules
            .insert(name.to_string(), ModuleDescriptor { factory, counter: 1 });
        Ok(())
    }

    pub(crate) fn add_behavior(&mut self, name: &str, factory: BehaviorFactory) -> Result<()> {
        if self.behaviors.contains_key(name) {
            return Err(duplicate(ComponentKind::Behavior, name));
        }
        self.behaviors
            .insert(name.to_string(), BehaviorDescriptor { factory });
        Ok(())
    }

    pub(crate) fn add_service(&mut self, name: &str, factory: ServiceFactory) -> Result<()> {
        if self.services.contains_key(name) {
            return Err(duplicate(ComponentKind::Service, name));
        }
        self.services.insert(
            name.to_string(),
            ServiceDescriptor {
                factory,
                instance: None,
            },
        );
        Ok(())
    }

    pub(crate) fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub(crate) fn has_behavior(&self, name: &str) -> bool {
        self.behaviors.contains_key(name)
    }

    pub(crate) fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub(crate) fn module_factory(&self, name: &str) -> Option<ModuleFactory> {
        self.modules.get(name).map(|d| Rc::clone(&d.factory))
    }

    pub(crate) fn behavior_factory(&self, name: &str) -> Option<BehaviorFactory> {
        self.behaviors.get(name).map(|d| Rc::clone(&d.factory))
    }

    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn service_factory(&self, name: &str) -> Option<ServiceFactory> {
        self.services.get(name).map(|d| Rc::clone(&d.factory))
    }

    /// Advance the instance counter of `name`, returning the value it held.
    pub(crate) fn next_instance(&mut self, name: &str) -> Option<u32> {
        let descriptor = self.modules.get_mut(name)?;
        let current = descriptor.counter;
        descriptor.counter = descriptor.counter.saturating_add(1);
        Some(current)
    }

    /// Memoized instance, or the factory when the service was never built.
    /// `None` when the service is not registered.
    pub(crate) fn service(&self, name: &str) -> Option<std::result::Result<ServiceInstance, ServiceFactory>> {
        self.services.get(name).map(|d| match &d.instance {
            Some(instance) => Ok(Rc::clone(instance)),
            None => Err(Rc::clone(&d.factory)),
        })
    }

    /// Store the first instance built for `name`. A later call keeps the
    /// original and returns it.
    pub(crate) fn memoize_service(&mut self, name: &str, instance: ServiceInstance) -> ServiceInstance {
        match self.services.get_mut(name) {
            Some(descriptor) => Rc::clone(descriptor.instance.get_or_insert(instance)),
            None => instance,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.modules.clear();
        self.behaviors.clear();
        self.services.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle;

    impl Component for Idle {}
    impl Module for Idle {}

    fn idle_module() -> ModuleFactory {
        module_factory("idle", |_ctx| Ok(Idle))
    }

    fn constant(value: u32) -> ServiceFactory {
        service_factory(move |_scope| Ok(value))
    }

    #[test]
    fn duplicate_names_are_rejected_per_directory() {
        let mut registry = ComponentRegistry::new();
        registry.add_module("cart", idle_module()).unwrap();
        let err = registry.add_module("cart", idle_module()).unwrap_err();
        assert_eq!(err.to_string(), "Module cart has already been added.");

        // Directories are independent.
        registry.add_service("cart", constant(1)).unwrap();
        assert!(registry.has_module("cart"));
        assert!(registry.has_service("cart"));
        assert!(!registry.has_behavior("cart"));
    }

    #[test]
    fn instance_counter_starts_at_one_per_module() {
        let mut registry = ComponentRegistry::new();
        registry.add_module("a", idle_module()).unwrap();
        registry.add_module("b", idle_module()).unwrap();

        assert_eq!(registry.next_instance("a"), Some(1));
        assert_eq!(registry.next_instance("a"), Some(2));
        assert_eq!(registry.next_instance("b"), Some(1));
        assert_eq!(registry.next_instance("missing"), None);
    }

    #[test]
    fn memoized_service_wins_over_later_instances() {
        let mut registry = ComponentRegistry::new();
        registry.add_service("s", constant(1)).unwrap();
        assert!(matches!(registry.service("s"), Some(Err(_))));

        let first = registry.memoize_service("s", Rc::new(1u32));
        let second = registry.memoize_service("s", Rc::new(2u32));
        assert!(Rc::ptr_eq(&first, &second));
        assert!(matches!(registry.service("s"), Some(Ok(_))));
        assert!(registry.service("other").is_none());
    }

    #[test]
    fn clear_empties_every_directory() {
        let mut registry = ComponentRegistry::new();
        registry.add_module("m", idle_module()).unwrap();
        registry.add_service("s", constant(1)).unwrap();
        registry.clear();
        assert!(!registry.has_module("m"));
        assert!(!registry.has_service("s"));
    }
}
