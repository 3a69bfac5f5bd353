use serde_json::{Map, Value, json};

use crate::component::ComponentSlot;
use crate::dom::{CONFIG_SELECTOR, NodeId};
use crate::error::{AppError, Result};
use crate::events::EventData;
use crate::logging::{LogLevel, json_kv};
use crate::metrics::AppMetrics;

use super::Application;
use super::core::merge_object;
use super::lifecycle::ConfigState;

impl Application {
    /// Deliver `name` to every running module and behavior that listens to
    /// it, then fire `message` on the bus.
    ///
    /// Recipients are captured when the call starts, in start order. An
    /// instance stopped by an earlier handler is skipped. A recipient that is
    /// itself executing (it broadcast from one of its own methods) hears the
    /// message as soon as that method returns.
    pub fn broadcast(&self, name: &str, data: Value) -> Result<()> {
        let mut targets: Vec<(String, u64, Vec<ComponentSlot>)> = self
            .inner
            .instances
            .borrow()
            .iter()
            .map(|(id, record)| (id.clone(), record.seq, record.slots()))
            .collect();
        targets.sort_by_key(|(_, seq, _)| *seq);

        let mut delivered = 0usize;
        for (id, seq, slots) in targets {
            for slot in slots {
                if !slot.accepts(name) {
                    continue;
                }
                if !self.is_current(&id, seq) {
                    break;
                }
                self.deliver(&slot, name, &data)?;
                delivered += 1;
            }
        }

        self.with_metrics(AppMetrics::record_broadcast);
        self.log_app_event(
            LogLevel::Debug,
            "broadcast_delivered",
            [
                json_kv("message", json!(name)),
                json_kv("recipients", json!(delivered)),
            ],
        );

        self.inner.bus.fire(
            "message",
            EventData::Message {
                message: name.to_string(),
                data,
            },
        );
        Ok(())
    }

    /// Configuration embedded under a running module's element.
    ///
    /// The payload is parsed on first access and the outcome is kept for the
    /// lifetime of the instance. Malformed JSON is reported once and yields
    /// `None` from then on.
    pub fn module_config(&self, element: NodeId) -> Result<Option<Value>> {
        let Some(id) = self.inner.dom.element_id(element) else {
            return Ok(None);
        };
        match self.inner.instances.borrow().get(&id).map(|record| &record.config) {
            None => return Ok(None),
            Some(ConfigState::Loaded(config)) => return Ok(config.clone()),
            Some(ConfigState::Unread) => {}
        }

        let parsed = match self.inner.dom.query(element, CONFIG_SELECTOR) {
            Some(script) => serde_json::from_str::<Value>(&self.inner.dom.text_content(script)),
            None => Ok(Value::Null),
        };
        let (config, failure) = match parsed {
            Ok(Value::Null) => (None, None),
            Ok(config) => (Some(config), None),
            Err(err) => (None, Some(err)),
        };

        if let Some(record) = self.inner.instances.borrow_mut().get_mut(&id) {
            record.config = ConfigState::Loaded(config.clone());
        }
        if let Some(err) = failure {
            self.report_error(AppError::InvalidModuleConfig(err))?;
        }
        Ok(config)
    }

    /// One key of [`module_config`](Self::module_config).
    pub fn module_config_value(&self, element: NodeId, name: &str) -> Result<Option<Value>> {
        Ok(self
            .module_config(element)?
            .and_then(|config| config.get(name).cloned()))
    }

    pub fn global_config(&self) -> Map<String, Value> {
        self.inner.global_config.borrow().clone()
    }

    pub fn global_config_value(&self, name: &str) -> Option<Value> {
        self.inner.global_config.borrow().get(name).cloned()
    }

    /// Merge `config` into the global configuration. Rejected once the
    /// application is initialized.
    pub fn set_global_config(&self, config: Value) -> Result<()> {
        if self.is_initialized() {
            return self.report_error(AppError::ConfigAfterInit);
        }
        merge_object(&mut self.inner.global_config.borrow_mut(), config);
        Ok(())
    }

    /// Publish a host value readable by every component. Survives `destroy`.
    pub fn set_global(&self, name: &str, value: Value) {
        self.inner
            .globals
            .borrow_mut()
            .insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.inner.globals.borrow().get(name).cloned()
    }
}
