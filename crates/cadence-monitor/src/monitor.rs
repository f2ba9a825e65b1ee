//! The performance monitor.
//!
//! Samples are kept per metric name in a bounded ring, oldest dropped first.
//! A sample carrying a threshold (its own, or one registered for its name)
//! is checked on arrival: at or above `critical` raises a critical alert,
//! otherwise at or above `warning` raises a warning. Alerts are logged,
//! kept in a bounded list and emitted as `performance.alert`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use cadence_contracts::{
    error::CadenceResult,
    event::{Event, EventKind},
    metric::{Alert, AlertLevel, MetricThreshold, PerformanceMetric},
};
use cadence_core::{config::MonitorConfig, traits::EventHandler, EventBus, SubscribeOptions, Subscription};

use crate::stats::MetricStats;

const SOURCE: &str = "performance-monitor";

/// Alerts younger than this decide `system_status`.
const STATUS_WINDOW_MINUTES: i64 = 5;

/// Overall health derived from recent alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub status: HealthState,
    pub warning_alerts: usize,
    pub critical_alerts: usize,
    pub tracked_metrics: usize,
    pub total_samples: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct MonitorState {
    metrics: HashMap<String, VecDeque<PerformanceMetric>>,
    thresholds: HashMap<String, MetricThreshold>,
    alerts: VecDeque<Alert>,
}

pub struct PerformanceMonitor {
    state: Mutex<MonitorState>,
    config: MonitorConfig,
    events: EventBus,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig, events: EventBus) -> Self {
        Self {
            state: Mutex::new(MonitorState::default()),
            config,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `threshold` to every future sample of `name` that lacks its own.
    pub fn set_threshold(&self, name: impl Into<String>, warning: f64, critical: f64) {
        self.lock()
            .thresholds
            .insert(name.into(), MetricThreshold { warning, critical });
    }

    /// Store a sample and raise an alert if it crosses a threshold.
    pub async fn record_metric(&self, metric: PerformanceMetric) -> Option<Alert> {
        let alert = {
            let mut state = self.lock();
            let threshold = metric
                .threshold
                .or_else(|| state.thresholds.get(&metric.name).copied());
            let alert = threshold.and_then(|t| check_threshold(&metric, t));

            let history = state.metrics.entry(metric.name.clone()).or_default();
            push_bounded(history, metric, self.config.history_capacity);

            if let Some(alert) = &alert {
                push_bounded(&mut state.alerts, alert.clone(), self.config.alert_capacity);
            }
            alert
        };

        let alert = alert?;
        match alert.level {
            AlertLevel::Critical => error!(metric = %alert.metric, value = alert.value, threshold = alert.threshold, "{}", alert.message),
            AlertLevel::Warning => warn!(metric = %alert.metric, value = alert.value, threshold = alert.threshold, "{}", alert.message),
        }
        self.events
            .emit(EventKind::PERFORMANCE_ALERT, json!(alert), SOURCE)
            .await;
        Some(alert)
    }

    /// Await `work`, recording `<name>.duration` in milliseconds and a
    /// `<name>.success` or `<name>.error` count. The output is returned as is.
    pub async fn measure<F, T, E>(&self, name: &str, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let outcome = work.await;
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;

        self.record_metric(PerformanceMetric::new(format!("{name}.duration"), elapsed, "ms"))
            .await;
        let counter = if outcome.is_ok() { "success" } else { "error" };
        self.record_metric(PerformanceMetric::new(format!("{name}.{counter}"), 1.0, "count"))
            .await;

        outcome
    }

    /// Samples for `name`, oldest first, or every sample grouped by name.
    pub fn metrics(&self, name: Option<&str>) -> BTreeMap<String, Vec<PerformanceMetric>> {
        let state = self.lock();
        state
            .metrics
            .iter()
            .filter(|(key, _)| name.map_or(true, |n| key.as_str() == n))
            .map(|(key, samples)| (key.clone(), samples.iter().cloned().collect()))
            .collect()
    }

    /// Statistics over the samples of `name`, optionally only the last `window`.
    pub fn metric_stats(&self, name: &str, window: Option<chrono::Duration>) -> Option<MetricStats> {
        let cutoff = window.map(|w| Utc::now() - w);
        let values: Vec<f64> = {
            let state = self.lock();
            state
                .metrics
                .get(name)?
                .iter()
                .filter(|m| cutoff.map_or(true, |c| m.timestamp >= c))
                .map(|m| m.value)
                .collect()
        };
        MetricStats::from_values(&values)
    }

    /// Retained alerts, oldest first, optionally of one level.
    pub fn alerts(&self, level: Option<AlertLevel>) -> Vec<Alert> {
        self.lock()
            .alerts
            .iter()
            .filter(|a| level.map_or(true, |l| a.level == l))
            .cloned()
            .collect()
    }

    pub fn clear_alerts(&self) {
        self.lock().alerts.clear();
    }

    /// Healthy with no recent alerts, degraded with recent warnings only,
    /// critical with any recent critical alert.
    pub fn system_status(&self) -> SystemStatus {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::minutes(STATUS_WINDOW_MINUTES);
        let state = self.lock();

        let recent = state.alerts.iter().filter(|a| a.timestamp >= cutoff);
        let (mut warning_alerts, mut critical_alerts) = (0, 0);
        for alert in recent {
            match alert.level {
                AlertLevel::Warning => warning_alerts += 1,
                AlertLevel::Critical => critical_alerts += 1,
            }
        }

        let status = if critical_alerts > 0 {
            HealthState::Critical
        } else if warning_alerts > 0 {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        SystemStatus {
            status,
            warning_alerts,
            critical_alerts,
            tracked_metrics: state.metrics.len(),
            total_samples: state.metrics.values().map(VecDeque::len).sum(),
            timestamp: now,
        }
    }

    /// Record execution times from bus traffic.
    ///
    /// | event                  | metric                |
    /// |------------------------|-----------------------|
    /// | `command.executed`     | `command.duration`    |
    /// | `query.executed`       | `query.duration`      |
    /// | `agent.task_completed` | `agent.task.duration` |
    /// | `agent.task_failed`    | `agent.task.duration` |
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> Vec<Subscription> {
        [
            (EventKind::COMMAND_EXECUTED, "command.duration"),
            (EventKind::QUERY_EXECUTED, "query.duration"),
            (EventKind::AGENT_TASK_COMPLETED, "agent.task.duration"),
            (EventKind::AGENT_TASK_FAILED, "agent.task.duration"),
        ]
        .into_iter()
        .map(|(kind, metric)| {
            let sink = MetricSink {
                monitor: Arc::downgrade(self),
                metric,
            };
            bus.subscribe(kind, Arc::new(sink), SubscribeOptions::default())
        })
        .collect()
    }
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Append `item`, evicting from the front to stay within `capacity`. Zero
/// keeps nothing.
fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

fn check_threshold(metric: &PerformanceMetric, threshold: MetricThreshold) -> Option<Alert> {
    let (level, crossed) = if metric.value >= threshold.critical {
        (AlertLevel::Critical, threshold.critical)
    } else if metric.value >= threshold.warning {
        (AlertLevel::Warning, threshold.warning)
    } else {
        return None;
    };

    Some(Alert {
        id: uuid::Uuid::new_v4().to_string(),
        level,
        metric: metric.name.clone(),
        value: metric.value,
        threshold: crossed,
        message: format!(
            "{} is {}{} ({} threshold {}{})",
            metric.name,
            metric.value,
            metric.unit,
            level.as_str(),
            crossed,
            metric.unit
        ),
        timestamp: metric.timestamp,
    })
}

struct MetricSink {
    monitor: Weak<PerformanceMonitor>,
    metric: &'static str,
}

#[async_trait]
impl EventHandler for MetricSink {
    async fn handle(&self, event: &Event) -> CadenceResult<()> {
        let Some(monitor) = self.monitor.upgrade() else {
            return Ok(());
        };
        let Some(elapsed) = event.payload.get("executionTime").and_then(Value::as_f64) else {
            debug!(event_type = %event.event_type, "event carries no execution time");
            return Ok(());
        };

        let mut sample = PerformanceMetric::new(self.metric, elapsed, "ms");
        if let Some(kind) = event.payload.get("type").and_then(Value::as_str) {
            sample = sample.with_tag("type", kind);
        }
        if let Some(success) = event.payload.get("success").and_then(Value::as_bool) {
            sample = sample.with_tag("success", success.to_string());
        }
        if let Some(cached) = event.payload.get("fromCache").and_then(Value::as_bool) {
            sample = sample.with_tag("fromCache", cached.to_string());
        }

        monitor.record_metric(sample).await;
        Ok(())
    }
}
