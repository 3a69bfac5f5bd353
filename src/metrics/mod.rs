use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Counters accumulated by an [`Application`](crate::Application).
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    modules_started: u64,
    modules_stopped: u64,
    broadcasts: u64,
    services_created: u64,
    events_delegated: u64,
    errors_reported: u64,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&mut self) {
        self.modules_started = self.modules_started.saturating_add(1);
    }

    pub fn record_stop(&mut self) {
        self.modules_stopped = self.modules_stopped.saturating_add(1);
    }

    pub fn record_broadcast(&mut self) {
        self.broadcasts = self.broadcasts.saturating_add(1);
    }

    pub fn record_service(&mut self) {
        self.services_created = self.services_created.saturating_add(1);
    }

    pub fn record_delegated_event(&mut self) {
        self.events_delegated = self.events_delegated.saturating_add(1);
    }

    pub fn record_error(&mut self) {
        self.errors_reported = self.errors_reported.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            modules_started: self.modules_started,
            modules_stopped: self.modules_stopped,
            broadcasts: self.broadcasts,
            services_created: self.services_created,
            events_delegated: self.events_delegated,
            errors_reported: self.errors_reported,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub modules_started: u64,
    pub modules_stopped: u64,
    pub broadcasts: u64,
    pub services_created: u64,
    pub events_delegated: u64,
    pub errors_reported: u64,
}

impl MetricSnapshot {
    /// Modules started but not yet stopped.
    pub fn running(&self) -> u64 {
        self.modules_started.saturating_sub(self.modules_stopped)
    }

    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "app_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("modules_started".to_string(), json!(self.modules_started));
        map.insert("modules_stopped".to_string(), json!(self.modules_stopped));
        map.insert("broadcasts".to_string(), json!(self.broadcasts));
        map.insert("services_created".to_string(), json!(self.services_created));
        map.insert("events_delegated".to_string(), json!(self.events_delegated));
        map.insert("errors_reported".to_string(), json!(self.errors_reported));
        map
    }
}
