//! # cadence-monitor
//!
//! Metric collection for the Cadence orchestration core: per-name bounded
//! sample history, rolling statistics with nearest-rank percentiles, and
//! warning/critical threshold alerts.

pub mod monitor;
pub mod stats;

pub use monitor::{HealthState, PerformanceMonitor, SystemStatus};
pub use stats::MetricStats;
