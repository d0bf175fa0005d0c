//! Metrics collection for the message pipeline
//!
//! A pluggable collector interface with an in-memory implementation, plus
//! a pipeline-facing wrapper that pre-registers every label set it will
//! ever emit. The collector is a passive observer: metric failures are
//! logged and never influence control flow.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{ChatPipeError, Result};

/// Pipeline outcome labels. The full set is fixed at compile time so metric
/// cardinality stays bounded.
pub mod outcome {
    pub const SUCCESS: &str = "success";
    pub const IGNORED: &str = "ignored";
    pub const NULL_DATA: &str = "null_data";
    pub const SESSION_NULL: &str = "session_null";
    pub const SESSION_EXPIRED: &str = "session_expired";
    pub const RATE_LIMIT: &str = "rate_limit";
    pub const ROOM_ACCESS_DENIED: &str = "room_access_denied";
    pub const BANNED_WORD: &str = "banned_word";
    pub const INVALID_FILE: &str = "invalid_file";
    pub const PERSIST_FAILED: &str = "persist_failed";
    pub const EXCEPTION: &str = "exception";

    pub const ALL: [&str; 11] = [
        SUCCESS,
        IGNORED,
        NULL_DATA,
        SESSION_NULL,
        SESSION_EXPIRED,
        RATE_LIMIT,
        ROOM_ACCESS_DENIED,
        BANNED_WORD,
        INVALID_FILE,
        PERSIST_FAILED,
        EXCEPTION,
    ];
}

/// Metric value types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
    Histogram { count: u64, sum: f64 },
}

/// A single metric data point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
    pub labels: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

/// Metric collection interface
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Record a counter increment
    async fn increment_counter(&self, name: &str, labels: HashMap<String, String>) -> Result<()>;

    /// Set a gauge value
    async fn set_gauge(&self, name: &str, value: f64, labels: HashMap<String, String>)
        -> Result<()>;

    /// Record a timing measurement
    async fn record_timing(
        &self,
        name: &str,
        duration: Duration,
        labels: HashMap<String, String>,
    ) -> Result<()>;

    /// Get current metric values
    async fn get_metrics(&self) -> Result<Vec<Metric>>;

    /// Get metrics in a specific format (prometheus, json)
    async fn export_metrics(&self, format: &str) -> Result<String>;
}

/// In-memory metrics collector
pub struct InMemoryMetricsCollector {
    metrics: Arc<RwLock<HashMap<String, Metric>>>,
}

impl InMemoryMetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn metric_key(name: &str, labels: &HashMap<String, String>) -> String {
        let mut key = name.to_string();
        let mut sorted_labels: Vec<_> = labels.iter().collect();
        sorted_labels.sort_by_key(|(k, _)| *k);

        for (k, v) in sorted_labels {
            key.push_str(&format!("{}={}", k, v));
        }
        key
    }
}

impl Default for InMemoryMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsCollector for InMemoryMetricsCollector {
    async fn increment_counter(&self, name: &str, labels: HashMap<String, String>) -> Result<()> {
        let key = Self::metric_key(name, &labels);
        let mut metrics = self.metrics.write().await;

        let metric = metrics.entry(key).or_insert_with(|| Metric {
            name: name.to_string(),
            value: MetricValue::Counter(0),
            labels: labels.clone(),
            timestamp: Utc::now(),
        });

        if let MetricValue::Counter(ref mut count) = metric.value {
            *count += 1;
            metric.timestamp = Utc::now();
        }

        Ok(())
    }

    async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: HashMap<String, String>,
    ) -> Result<()> {
        let key = Self::metric_key(name, &labels);
        let mut metrics = self.metrics.write().await;

        metrics.insert(
            key,
            Metric {
                name: name.to_string(),
                value: MetricValue::Gauge(value),
                labels,
                timestamp: Utc::now(),
            },
        );

        Ok(())
    }

    async fn record_timing(
        &self,
        name: &str,
        duration: Duration,
        labels: HashMap<String, String>,
    ) -> Result<()> {
        let key = Self::metric_key(name, &labels);
        let mut metrics = self.metrics.write().await;

        let metric = metrics.entry(key).or_insert_with(|| Metric {
            name: name.to_string(),
            value: MetricValue::Histogram { count: 0, sum: 0.0 },
            labels: labels.clone(),
            timestamp: Utc::now(),
        });

        if let MetricValue::Histogram { count, sum } = &mut metric.value {
            *count += 1;
            *sum += duration.as_secs_f64();
            metric.timestamp = Utc::now();
        }

        Ok(())
    }

    async fn get_metrics(&self) -> Result<Vec<Metric>> {
        let metrics = self.metrics.read().await;
        Ok(metrics.values().cloned().collect())
    }

    async fn export_metrics(&self, format: &str) -> Result<String> {
        let metrics = self.get_metrics().await?;

        match format {
            "json" => Ok(serde_json::to_string_pretty(&metrics)?),
            "prometheus" => {
                let mut output = String::new();

                for metric in metrics {
                    output.push_str(&format!("# TYPE {} ", metric.name));
                    match metric.value {
                        MetricValue::Counter(_) => output.push_str("counter\n"),
                        MetricValue::Gauge(_) => output.push_str("gauge\n"),
                        MetricValue::Histogram { .. } => output.push_str("histogram\n"),
                    }

                    let labels_str = if metric.labels.is_empty() {
                        String::new()
                    } else {
                        let mut labels_vec: Vec<_> = metric.labels.iter().collect();
                        labels_vec.sort_by_key(|(k, _)| *k);
                        let labels: Vec<String> = labels_vec
                            .iter()
                            .map(|(k, v)| format!("{}=\"{}\"", k, v))
                            .collect();
                        format!("{{{}}}", labels.join(","))
                    };

                    match metric.value {
                        MetricValue::Counter(value) => {
                            output.push_str(&format!("{}{} {}\n", metric.name, labels_str, value));
                        }
                        MetricValue::Gauge(value) => {
                            output.push_str(&format!("{}{} {}\n", metric.name, labels_str, value));
                        }
                        MetricValue::Histogram { count, sum } => {
                            output.push_str(&format!(
                                "{}_count{} {}\n",
                                metric.name, labels_str, count
                            ));
                            output
                                .push_str(&format!("{}_sum{} {}\n", metric.name, labels_str, sum));
                        }
                    }

                    output.push('\n');
                }

                Ok(output)
            }
            _ => Err(ChatPipeError::ValidationError(format!(
                "Unsupported export format: {}",
                format
            ))),
        }
    }
}

/// Message-type label values; anything else collapses to "unknown" so the
/// label space stays closed.
const MESSAGE_TYPE_LABELS: [&str; 3] = ["text", "file", "unknown"];

pub const PIPELINE_COUNTER: &str = "pipeline_messages_total";
pub const PIPELINE_TIMER: &str = "pipeline_processing_seconds";

/// Pipeline-facing metrics front-end.
///
/// Every (outcome, message_type) label set is built once at construction;
/// the hot path only clones pre-registered maps, never formats label
/// strings per call.
pub struct PipelineMetrics {
    collector: Arc<dyn MetricsCollector>,
    labels: HashMap<(&'static str, &'static str), HashMap<String, String>>,
}

impl PipelineMetrics {
    pub fn new(collector: Arc<dyn MetricsCollector>) -> Self {
        let mut labels = HashMap::new();
        for outcome in outcome::ALL {
            for message_type in MESSAGE_TYPE_LABELS {
                let mut set = HashMap::new();
                set.insert("outcome".to_string(), outcome.to_string());
                set.insert("message_type".to_string(), message_type.to_string());
                labels.insert((outcome, message_type), set);
            }
        }
        Self { collector, labels }
    }

    fn label_set(&self, outcome: &'static str, message_type: &str) -> HashMap<String, String> {
        let message_type = match message_type {
            "text" => "text",
            "file" => "file",
            _ => "unknown",
        };
        self.labels
            .get(&(outcome, message_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Record one pipeline run: an outcome counter plus a labeled duration.
    pub async fn record(&self, outcome: &'static str, message_type: &str, elapsed: Duration) {
        let labels = self.label_set(outcome, message_type);

        if let Err(e) = self
            .collector
            .increment_counter(PIPELINE_COUNTER, labels.clone())
            .await
        {
            log::debug!("failed to record pipeline counter: {}", e);
        }
        if let Err(e) = self
            .collector
            .record_timing(PIPELINE_TIMER, elapsed, labels)
            .await
        {
            log::debug!("failed to record pipeline timing: {}", e);
        }
    }

    pub fn collector(&self) -> Arc<dyn MetricsCollector> {
        self.collector.clone()
    }
}
