use std::collections::HashSet;
use std::rc::{Rc, Weak};

use serde_json::{Value, json};

use crate::component::{ComponentSlot, DelegatedEvent};
use crate::context::Context;
use crate::delegate::{DelegateHandler, EventDelegate};
use crate::dom::{MODULE_SELECTOR, NodeId};
use crate::error::{AppError, ComponentError, ComponentResult, Result};
use crate::logging::{LogLevel, json_kv};
use crate::metrics::AppMetrics;

use super::{AppInner, Application, ModuleDeclaration};

/// Bookkeeping for one running module element.
pub(super) struct InstanceRecord {
    pub(super) module_name: String,
    pub(super) element: NodeId,
    /// Start order, used to keep broadcast delivery stable.
    pub(super) seq: u64,
    pub(super) module: ComponentSlot,
    pub(super) behaviors: Vec<ComponentSlot>,
    pub(super) delegates: Vec<EventDelegate>,
    pub(super) config: ConfigState,
}

/// Module configuration, read from the element on first lookup.
pub(super) enum ConfigState {
    Unread,
    /// Result of the one parse attempt. A malformed payload is stored as `None`.
    Loaded(Option<Value>),
}

impl InstanceRecord {
    /// The module first, then its behaviors in declared order.
    pub(super) fn slots(&self) -> Vec<ComponentSlot> {
        std::iter::once(&self.module)
            .chain(self.behaviors.iter())
            .cloned()
            .collect()
    }

    pub(super) fn detach(&mut self) {
        for delegate in &mut self.delegates {
            delegate.detach_events();
        }
        self.delegates.clear();
    }
}

/// Routes delegated DOM events into one guarded component.
struct InstanceHandler {
    slot: ComponentSlot,
    app: Weak<AppInner>,
}

impl DelegateHandler for InstanceHandler {
    fn handles(&self, event_type: &str) -> bool {
        self.slot.event_types().iter().any(|t| t == event_type)
    }

    fn handle(&self, event: &DelegatedEvent<'_>) -> ComponentResult {
        let Some(inner) = self.app.upgrade() else {
            return Ok(());
        };
        let app = Application::from_inner(inner);
        app.with_metrics(AppMetrics::record_delegated_event);

        let method = format!("on_{}", event.event_type());
        app.invoke(&self.slot, &method, |instance| instance.deliver_event(event))
            .map_err(ComponentError::from)
    }
}

impl Application {
    /// Start the module declared on `element`.
    ///
    /// Behaviors initialize in declared order before the module, and DOM
    /// events are bound only once every `init` has returned. Starting a
    /// running element does nothing.
    pub fn start(&self, element: NodeId) -> Result<()> {
        let name = self
            .declaration(element)
            .map(|declaration| declaration.name)
            .unwrap_or_default();

        let factory = self.inner.registry.borrow().module_factory(&name);
        let Some(factory) = factory else {
            return self.report_error(AppError::ModuleNotDefined(name));
        };

        if self.is_started(element) {
            return Ok(());
        }

        let counter = self
            .inner
            .registry
            .borrow_mut()
            .next_instance(&name)
            .unwrap_or(1);
        let id = match self.inner.dom.element_id(element) {
            Some(id) => id,
            None => {
                let id = format!("mod-{name}-{counter}");
                self.inner.dom.set_attribute(element, "id", &id);
                id
            }
        };

        let context = Context::new(self, element, &name);
        let module = match factory(context.clone()) {
            Ok(slot) => slot,
            Err(source) => return self.settle(Err(AppError::component(&name, "create", source))),
        };
        let behaviors = self.create_behaviors(&module, &context)?;

        let seq = self.inner.next_seq.get() + 1;
        self.inner.next_seq.set(seq);
        self.inner.instances.borrow_mut().insert(
            id.clone(),
            InstanceRecord {
                module_name: name.clone(),
                element,
                seq,
                module: module.clone(),
                behaviors: behaviors.clone(),
                delegates: Vec::new(),
                config: ConfigState::Unread,
            },
        );

        if let Err(err) = self.initialize(&module, &behaviors) {
            self.discard(&id, seq);
            return Err(err);
        }
        if !self.bind(&id, seq, element, &module, &behaviors) {
            return Ok(());
        }

        self.with_metrics(AppMetrics::record_start);
        self.log_app_event(
            LogLevel::Debug,
            "module_started",
            [
                json_kv("module", json!(name)),
                json_kv("id", json!(id)),
                json_kv(
                    "behaviors",
                    json!(behaviors.iter().map(ComponentSlot::name).collect::<Vec<_>>()),
                ),
            ],
        );
        Ok(())
    }

    /// Stop the module running on `element`.
    ///
    /// Listeners are detached first, then `destroy` runs on the module and on
    /// its behaviors in reverse declared order. Every component is torn down
    /// even when an earlier one fails; the first failure is returned. A
    /// component stopping its own element is destroyed once its running
    /// method returns.
    pub fn stop(&self, element: NodeId) -> Result<()> {
        let id = self.inner.dom.element_id(element);
        let record = id
            .as_ref()
            .and_then(|id| self.inner.instances.borrow_mut().remove(id));

        let Some(mut record) = record else {
            if self.is_debug() {
                return self.report_error(AppError::ModuleNotStarted(id.unwrap_or_default()));
            }
            return Ok(());
        };

        record.detach();

        let mut outcome = self.teardown(&record.module);
        for behavior in record.behaviors.iter().rev() {
            let result = self.teardown(behavior);
            if outcome.is_ok() {
                outcome = result;
            }
        }

        self.with_metrics(AppMetrics::record_stop);
        self.log_app_event(
            LogLevel::Debug,
            "module_stopped",
            [
                json_kv("module", json!(record.module_name)),
                json_kv("id", json!(id)),
            ],
        );
        outcome
    }

    /// Start every module root below `root`, in document order.
    pub fn start_all(&self, root: NodeId) -> Result<()> {
        for element in self.inner.dom.query_all(root, MODULE_SELECTOR) {
            self.start(element)?;
        }
        Ok(())
    }

    /// Stop every module root below `root`, in document order.
    pub fn stop_all(&self, root: NodeId) -> Result<()> {
        for element in self.inner.dom.query_all(root, MODULE_SELECTOR) {
            self.stop(element)?;
        }
        Ok(())
    }

    pub fn is_started(&self, element: NodeId) -> bool {
        self.inner
            .dom
            .element_id(element)
            .is_some_and(|id| self.inner.instances.borrow().contains_key(&id))
    }

    /// Parsed `data-module` declaration of `element`.
    pub fn declaration(&self, element: NodeId) -> Option<ModuleDeclaration> {
        ModuleDeclaration::from_element(self.inner.dom.as_ref(), element)
    }

    /// Elements with a running module, in start order.
    pub fn running(&self) -> Vec<NodeId> {
        let instances = self.inner.instances.borrow();
        let mut running: Vec<_> = instances.values().map(|r| (r.seq, r.element)).collect();
        running.sort_unstable();
        running.into_iter().map(|(_, element)| element).collect()
    }

    /// Whether the record started as `seq` is still the one stored under `id`.
    pub(super) fn is_current(&self, id: &str, seq: u64) -> bool {
        self.inner
            .instances
            .borrow()
            .get(id)
            .is_some_and(|record| record.seq == seq)
    }

    fn create_behaviors(&self, module: &ComponentSlot, context: &Context) -> Result<Vec<ComponentSlot>> {
        let mut created = Vec::new();
        let mut seen = HashSet::new();

        for name in module.behaviors() {
            if !seen.insert(name.as_str()) {
                self.report_error(AppError::DuplicateBehavior(name.clone()))?;
                continue;
            }

            let factory = self.inner.registry.borrow().behavior_factory(name);
            let Some(factory) = factory else {
                self.report_error(AppError::BehaviorNotFound(name.clone()))?;
                continue;
            };

            match factory(context.clone()) {
                Ok(slot) => created.push(slot),
                Err(source) => self.settle(Err(AppError::component(name, "create", source)))?,
            }
        }

        Ok(created)
    }

    fn initialize(&self, module: &ComponentSlot, behaviors: &[ComponentSlot]) -> Result<()> {
        for behavior in behaviors {
            self.invoke(behavior, "init", |instance| instance.init())?;
        }
        self.invoke(module, "init", |instance| instance.init())
    }

    fn bind(
        &self,
        id: &str,
        seq: u64,
        element: NodeId,
        module: &ComponentSlot,
        behaviors: &[ComponentSlot],
    ) -> bool {
        // An init may have stopped its own element.
        if !self.is_current(id, seq) {
            return false;
        }

        let event_types = self.event_types();
        let delegates: Vec<EventDelegate> = std::iter::once(module)
            .chain(behaviors)
            .map(|slot| {
                let handler = Rc::new(InstanceHandler {
                    slot: slot.clone(),
                    app: self.downgrade(),
                });
                let mut delegate =
                    EventDelegate::with_event_types(element, self.dom(), handler, event_types.clone());
                delegate.attach_events();
                delegate
            })
            .collect();

        if let Some(record) = self.inner.instances.borrow_mut().get_mut(id) {
            record.delegates = delegates;
        }
        true
    }

    fn discard(&self, id: &str, seq: u64) {
        if !self.is_current(id, seq) {
            return;
        }
        let record = self.inner.instances.borrow_mut().remove(id);
        if let Some(mut record) = record {
            record.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::app::testing::{Journal, Probe, add_probe, fixture, module_root};
    use crate::component::{Component, EventHandlers, Module};
    use crate::dom::DomAdapter;
    use crate::events::handler;

    fn error_log(app: &Application) -> Journal {
        let journal = Journal::default();
        let sink = journal.clone();
        app.on(
            "error",
            handler(move |event| {
                if let Some(err) = event.error() {
                    sink.push(err.to_string());
                }
            }),
        );
        journal
    }

    #[test]
    fn ids_are_assigned_per_module_counter() {
        let (dom, app) = fixture();
        let journal = Journal::default();
        add_probe(&app, "a", &journal);
        add_probe(&app, "b", &journal);
        let first = module_root(&dom, "a");
        let other = module_root(&dom, "b");
        let second = module_root(&dom, "a");

        app.init(Value::Null).unwrap();

        assert_eq!(dom.element_id(first).as_deref(), Some("mod-a-1"));
        assert_eq!(dom.element_id(other).as_deref(), Some("mod-b-1"));
        assert_eq!(dom.element_id(second).as_deref(), Some("mod-a-2"));
        assert_eq!(app.running(), vec![first, other, second]);
    }

    #[test]
    fn existing_ids_are_kept() {
        let (dom, app) = fixture();
        add_probe(&app, "a", &Journal::default());
        let root = module_root(&dom, "a");
        dom.set_attribute(root, "id", "checkout");

        app.start(root).unwrap();
        assert!(app.is_started(root));
        assert_eq!(dom.element_id(root).as_deref(), Some("checkout"));
    }

    #[test]
    fn start_is_idempotent() {
        let (dom, app) = fixture();
        let journal = Journal::default();
        add_probe(&app, "a", &journal);
        let root = module_root(&dom, "a flag");

        app.start(root).unwrap();
        app.start(root).unwrap();

        assert_eq!(journal.entries(), vec!["a.init"]);
        assert_eq!(dom.listener_count(root, "click"), 1);
    }

    #[test]
    fn stop_detaches_every_listener() {
        let (dom, app) = fixture();
        let journal = Journal::default();
        add_probe(&app, "a", &journal);
        let root = module_root(&dom, "a");
        let button = dom.append_element(root, "button", &[("data-type", "save")]);

        app.start(root).unwrap();
        dom.dispatch(button, "click").unwrap();
        app.stop(root).unwrap();
        dom.dispatch(button, "click").unwrap();

        assert!(!app.is_started(root));
        assert_eq!(dom.total_listeners(), 0);
        assert_eq!(journal.entries(), vec!["a.init", "a.click:save", "a.destroy"]);
    }

    #[test]
    fn behaviors_init_before_module_and_unwind_after_it() {
        let (dom, app) = fixture();
        let journal = Journal::default();
        for name in ["x", "y"] {
            let j = journal.clone();
            app.add_behavior(name, move |_ctx| Ok(Probe::new(name, &j)))
                .unwrap();
        }
        let j = journal.clone();
        app.add_module("m", move |_ctx| Ok(Probe::new("m", &j).with_behaviors(&["x", "y"])))
            .unwrap();
        let root = module_root(&dom, "m");

        app.start(root).unwrap();
        assert_eq!(journal.entries(), vec!["x.init", "y.init", "m.init"]);

        journal.clear();
        app.stop(root).unwrap();
        assert_eq!(journal.entries(), vec!["m.destroy", "y.destroy", "x.destroy"]);
    }

    #[test]
    fn behaviors_receive_delegated_events_after_the_module() {
        let (dom, app) = fixture();
        let journal = Journal::default();
        let j = journal.clone();
        app.add_behavior("x", move |_ctx| Ok(Probe::new("x", &j)))
            .unwrap();
        let j = journal.clone();
        app.add_module("m", move |_ctx| Ok(Probe::new("m", &j).with_behaviors(&["x"])))
            .unwrap();
        let root = module_root(&dom, "m");
        let plain = dom.append_element(root, "span", &[]);

        app.start(root).unwrap();
        journal.clear();
        dom.dispatch(plain, "click").unwrap();

        assert_eq!(journal.entries(), vec!["m.click:", "x.click:"]);
        assert_eq!(dom.listener_count(root, "click"), 2);
    }

    #[test]
    fn unknown_module_is_reported() {
        let (dom, app) = fixture();
        let errors = error_log(&app);
        let root = module_root(&dom, "ghost");

        app.start(root).unwrap();
        assert_eq!(errors.entries(), vec!["Module type \"ghost\" is not defined."]);
        assert!(!app.is_started(root));

        app.set_global_config(json!({ "debug": true })).unwrap();
        let err = app.start(root).unwrap_err();
        assert!(matches!(err, AppError::ModuleNotDefined(ref name) if name == "ghost"));
    }

    #[test]
    fn missing_and_duplicate_behaviors_are_reported() {
        let (dom, app) = fixture();
        let errors = error_log(&app);
        let journal = Journal::default();
        let j = journal.clone();
        app.add_behavior("x", move |_ctx| Ok(Probe::new("x", &j)))
            .unwrap();
        let j = journal.clone();
        app.add_module("m", move |_ctx| {
            Ok(Probe::new("m", &j).with_behaviors(&["x", "nope", "x"]))
        })
        .unwrap();
        let root = module_root(&dom, "m");

        app.start(root).unwrap();

        assert_eq!(
            errors.entries(),
            vec![
                "Behavior \"nope\" not found",
                "Behavior \"x\" cannot be specified twice in a module.",
            ]
        );
        assert_eq!(journal.entries(), vec!["x.init", "m.init"]);
    }

    #[test]
    fn init_failure_propagates_in_debug_mode() {
        let (dom, app) = fixture();
        app.set_global_config(json!({ "debug": true })).unwrap();
        let journal = Journal::default();
        let j = journal.clone();
        app.add_module("cart", move |_ctx| Ok(Probe::new("cart", &j).failing_init()))
            .unwrap();
        let root = module_root(&dom, "cart");

        let err = app.start(root).unwrap_err();

        assert!(err.to_string().starts_with("cart.init() - "));
        assert!(!app.is_started(root));
        assert_eq!(dom.total_listeners(), 0);
    }

    #[test]
    fn init_failure_fires_error_in_production() {
        let (dom, app) = fixture();
        let errors = error_log(&app);
        let journal = Journal::default();
        let j = journal.clone();
        app.add_module("cart", move |_ctx| Ok(Probe::new("cart", &j).failing_init()))
            .unwrap();
        let root = module_root(&dom, "cart");

        app.start(root).unwrap();

        assert_eq!(errors.entries(), vec!["cart.init() - boom"]);
        assert!(app.is_started(root));
    }

    #[test]
    fn stopping_an_idle_element_is_an_error_only_in_debug() {
        let (dom, app) = fixture();
        let errors = error_log(&app);
        let root = module_root(&dom, "a");
        dom.set_attribute(root, "id", "idle");

        app.stop(root).unwrap();
        assert!(errors.entries().is_empty());

        app.set_global_config(json!({ "debug": true })).unwrap();
        let err = app.stop(root).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to stop module associated with element: idle"
        );
    }

    struct Fragile;

    impl Fragile {
        fn on_click(&mut self, _event: &DelegatedEvent<'_>) -> ComponentResult {
            Err("handler exploded".into())
        }
    }

    impl Component for Fragile {
        fn events(&self) -> EventHandlers<Self> {
            EventHandlers::new().on("click", Self::on_click)
        }
    }

    impl Module for Fragile {}

    #[test]
    fn handler_failures_follow_error_routing() {
        let (dom, app) = fixture();
        let errors = error_log(&app);
        app.add_module("fragile", |_ctx| Ok(Fragile)).unwrap();
        let root = module_root(&dom, "fragile");
        app.start(root).unwrap();

        dom.dispatch(root, "click").unwrap();
        assert_eq!(errors.entries(), vec!["fragile.on_click() - handler exploded"]);

        app.set_global_config(json!({ "debug": true })).unwrap();
        let err = dom.dispatch(root, "click").unwrap_err();
        assert_eq!(err.to_string(), "fragile.on_click() - handler exploded");
    }

    #[test]
    fn only_configured_event_types_are_bound() {
        let (dom, app) = fixture();
        app.add_module("fragile", |_ctx| Ok(Fragile)).unwrap();
        let root = module_root(&dom, "fragile");

        app.init(json!({ "eventTypes": ["keyup"] })).unwrap();

        assert!(app.is_started(root));
        assert_eq!(dom.total_listeners(), 0);
    }

    #[test]
    fn stop_all_covers_nested_roots() {
        let (dom, app) = fixture();
        let journal = Journal::default();
        add_probe(&app, "outer", &journal);
        add_probe(&app, "inner", &journal);
        let outer = module_root(&dom, "outer");
        let inner = dom.append_element(outer, "div", &[("data-module", "inner")]);

        app.start_all(dom.body()).unwrap();
        assert!(app.is_started(outer) && app.is_started(inner));

        app.stop_all(dom.body()).unwrap();
        assert!(app.running().is_empty());
        assert_eq!(
            journal.entries(),
            vec!["outer.init", "inner.init", "outer.destroy", "inner.destroy"]
        );
    }

    /// Gives up on its own element during `init`.
    struct Quitter {
        ctx: Context,
        journal: Journal,
    }

    impl Quitter {
        fn on_click(&mut self, _event: &DelegatedEvent<'_>) -> ComponentResult {
            self.journal.push("quitter.click");
            Ok(())
        }
    }

    impl Component for Quitter {
        fn init(&mut self) -> ComponentResult {
            self.journal.push("quitter.init");
            self.ctx.application()?.stop(self.ctx.element())?;
            self.journal.push("quitter.stopped");
            Ok(())
        }

        fn destroy(&mut self) -> ComponentResult {
            self.journal.push("quitter.destroy");
            Ok(())
        }

        fn events(&self) -> EventHandlers<Self> {
            EventHandlers::new().on("click", Self::on_click)
        }
    }

    impl Module for Quitter {
        fn behaviors(&self) -> &[&str] {
            &["x"]
        }
    }

    #[test]
    fn init_stopping_its_own_element_still_destroys_the_module() {
        let (dom, app) = fixture();
        let journal = Journal::default();
        let j = journal.clone();
        app.add_behavior("x", move |_ctx| Ok(Probe::new("x", &j)))
            .unwrap();
        let j = journal.clone();
        app.add_module("quitter", move |ctx| {
            Ok(Quitter {
                ctx,
                journal: j.clone(),
            })
        })
        .unwrap();
        let root = module_root(&dom, "quitter");

        app.init(json!({ "debug": true })).unwrap();

        assert_eq!(
            journal.entries(),
            vec![
                "x.init",
                "quitter.init",
                "x.destroy",
                "quitter.stopped",
                "quitter.destroy",
            ]
        );
        assert!(!app.is_started(root));
        assert_eq!(dom.total_listeners(), 0);

        dom.dispatch(root, "click").unwrap();
        assert_eq!(journal.entries().len(), 5);
    }

    #[test]
    fn destroy_releases_listeners_of_detached_modules() {
        let (dom, app) = fixture();
        let journal = Journal::default();
        add_probe(&app, "a", &journal);
        let root = module_root(&dom, "a");
        app.init(Value::Null).unwrap();

        dom.remove(root);
        app.destroy().unwrap();

        assert_eq!(dom.total_listeners(), 0);
        assert!(!app.is_started(root));
        assert_eq!(journal.entries(), vec!["a.init"]);
    }
}
