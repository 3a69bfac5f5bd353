//! Name-keyed directories of module, behavior and service factories.

mod core;

pub(crate) use self::core::{
    ComponentRegistry, ServiceInstance, behavior_factory, module_factory, service_factory,
};
