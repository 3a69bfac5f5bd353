use serde_json::Value;

use crate::component::{ComponentSlot, Deferred, Instance};
use crate::error::Result;

use super::Application;

impl Application {
    /// Run one guarded call into `slot`, then drain the work other code
    /// parked on it while the call was executing.
    ///
    /// The first failure wins; parked work still runs after it.
    pub(crate) fn invoke(
        &self,
        slot: &ComponentSlot,
        method: &str,
        call: impl FnOnce(&mut dyn Instance) -> Result<()>,
    ) -> Result<()> {
        let outcome = self.settle(slot.call(method, call));
        let drained = self.drain_deferred(slot);
        outcome.and(drained)
    }

    /// Deliver a message, parking it when the component is mid-call.
    pub(crate) fn deliver(&self, slot: &ComponentSlot, name: &str, data: &Value) -> Result<()> {
        if slot.is_busy() {
            slot.defer(Deferred::Message {
                name: name.to_string(),
                data: data.clone(),
            });
            return Ok(());
        }
        self.invoke(slot, "on_message", |instance| {
            instance.deliver_message(name, data)
        })
    }

    /// Run `destroy`, or park it when the component is stopping itself.
    pub(crate) fn teardown(&self, slot: &ComponentSlot) -> Result<()> {
        if slot.is_busy() {
            slot.defer(Deferred::Destroy);
            return Ok(());
        }
        self.invoke(slot, "destroy", |instance| instance.destroy())
    }

    fn drain_deferred(&self, slot: &ComponentSlot) -> Result<()> {
        let mut outcome = Ok(());
        while let Some(work) = slot.take_deferred() {
            let result = match work {
                Deferred::Message { name, data } => self.settle(
                    slot.call("on_message", |instance| instance.deliver_message(&name, &data)),
                ),
                Deferred::Destroy => self.settle(slot.call("destroy", |instance| instance.destroy())),
            };
            if outcome.is_ok() {
                outcome = result;
            }
        }
        outcome
    }
}
