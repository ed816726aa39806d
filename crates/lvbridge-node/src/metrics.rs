//! Capacity metrics for Prometheus
//!
//! # Prometheus Metrics
//!
//! - `lvbridge_node_available_bytes` - Free bytes per device class
//! - `lvbridge_node_size_bytes` - Total bytes per device class
//!
//! Both carry a constant `node` label and a `device_class` label. The
//! registry is an owned value: the agent creates one at startup and hands it
//! to the reconciler and the HTTP endpoint, so tests can use isolated ones.

use lvbridge_common::CapacitySnapshot;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

pub const METRICS_NAMESPACE: &str = "lvbridge";
pub const METRICS_SUBSYSTEM: &str = "node";

/// Escape a label value for the text exposition format
fn escape_label_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"', '\n']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Gauge family with one variable label
#[derive(Debug)]
pub struct GaugeVec {
    name: String,
    help: &'static str,
    label: &'static str,
    values: RwLock<BTreeMap<String, AtomicU64>>,
}

impl GaugeVec {
    fn new(name: &str, help: &'static str, label: &'static str) -> Self {
        Self {
            name: format!("{METRICS_NAMESPACE}_{METRICS_SUBSYSTEM}_{name}"),
            help,
            label,
            values: RwLock::new(BTreeMap::new()),
        }
    }

    /// Set the gauge for `label_value`
    pub fn set(&self, label_value: &str, value: u64) {
        if let Some(gauge) = self.values.read().get(label_value) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        self.values
            .write()
            .entry(label_value.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn get(&self, label_value: &str) -> Option<u64> {
        self.values
            .read()
            .get(label_value)
            .map(|g| g.load(Ordering::Relaxed))
    }

    fn export(&self, output: &mut String, node: &str) {
        writeln!(output, "# HELP {} {}", self.name, self.help).unwrap();
        writeln!(output, "# TYPE {} gauge", self.name).unwrap();
        for (label_value, gauge) in self.values.read().iter() {
            writeln!(
                output,
                "{}{{node=\"{}\",{}=\"{}\"}} {}",
                self.name,
                escape_label_value(node),
                self.label,
                escape_label_value(label_value),
                gauge.load(Ordering::Relaxed)
            )
            .unwrap();
        }
    }
}

/// Per-node capacity gauges
#[derive(Debug)]
pub struct CapacityMetrics {
    node: String,
    available_bytes: GaugeVec,
    size_bytes: GaugeVec,
}

impl CapacityMetrics {
    /// Register both gauge families for `node`
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            available_bytes: GaugeVec::new(
                "available_bytes",
                "LVM VG available bytes under lvmd management",
                "device_class",
            ),
            size_bytes: GaugeVec::new(
                "size_bytes",
                "LVM VG size bytes under lvmd management",
                "device_class",
            ),
        }
    }

    /// Publish every device class of a snapshot
    pub fn record(&self, snapshot: &CapacitySnapshot) {
        for item in &snapshot.items {
            self.available_bytes.set(&item.device_class, item.free_bytes);
            self.size_bytes.set(&item.device_class, item.size_bytes);
        }
    }

    pub fn available_bytes(&self, device_class: &str) -> Option<u64> {
        self.available_bytes.get(device_class)
    }

    pub fn size_bytes(&self, device_class: &str) -> Option<u64> {
        self.size_bytes.get(device_class)
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(1024);
        self.available_bytes.export(&mut output, &self.node);
        self.size_bytes.export(&mut output, &self.node);
        output
    }
}
