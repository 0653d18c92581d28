//! In-process metric registry for the HTTP servers.
//!
//! Counter/gauge/histogram vectors with label names fixed at construction and
//! per-series state in a `DashMap` keyed by label values. Counters and gauges
//! are plain atomics; histograms keep cumulative bucket counters plus an f64
//! sum updated with a CAS loop, so concurrent writers never take a lock beyond
//! the map shard needed to create a new series.
//!
//! The registry is an explicit value: construct one, wrap it in an `Arc`, and
//! hand it to both the instrumentation middleware and the `/metrics` handler.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use crate::obs::process::ProcessCollector;

/// Wire format for `/metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpositionFormat {
    /// Prometheus text format 0.0.4.
    Prometheus,
    /// OpenMetrics 1.0 text format.
    OpenMetrics,
}

impl ExpositionFormat {
    /// Pick a format from an `Accept` header value.
    pub fn negotiate(accept: Option<&str>) -> Self {
        match accept {
            Some(a) if a.contains("application/openmetrics-text") => ExpositionFormat::OpenMetrics,
            _ => ExpositionFormat::Prometheus,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExpositionFormat::Prometheus => "text/plain; version=0.0.4; charset=utf-8",
            ExpositionFormat::OpenMetrics => {
                "application/openmetrics-text; version=1.0.0; charset=utf-8"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// A single unlabelled value computed at scrape time (process/runtime collectors).
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub value: f64,
}

/// `count` bucket bounds starting at `start`, each `factor` times the previous.
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(count);
    let mut b = start;
    for _ in 0..count {
        out.push(b);
        b *= factor;
    }
    out
}

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn fmt_float(v: f64, format: ExpositionFormat) -> String {
    if v.is_infinite() {
        return if v > 0.0 { "+Inf".into() } else { "-Inf".into() };
    }
    // OpenMetrics wants canonical floats for `le`/values; "64.0" rather than "64".
    if format == ExpositionFormat::OpenMetrics && v.fract() == 0.0 && v.abs() < 1e15 {
        return format!("{v:.1}");
    }
    format!("{v}")
}

fn label_pairs(names: &[&str], values: &[String]) -> String {
    names
        .iter()
        .zip(values)
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn write_series(out: &mut String, name: &str, labels: &str, value: &str) {
    if labels.is_empty() {
        let _ = writeln!(out, "{name} {value}");
    } else {
        let _ = writeln!(out, "{name}{{{labels}}} {value}");
    }
}

/// Family header. OpenMetrics names counter families without the `_total` suffix.
fn write_header(out: &mut String, name: &str, help: &str, kind: MetricKind, format: ExpositionFormat) {
    let family = match (kind, format) {
        (MetricKind::Counter, ExpositionFormat::OpenMetrics) => {
            name.strip_suffix("_total").unwrap_or(name)
        }
        _ => name,
    };
    let _ = writeln!(out, "# HELP {family} {help}");
    let _ = writeln!(out, "# TYPE {family} {}", kind.as_str());
}

fn key_of(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Label values must match the names given at construction.
fn arity_ok(metric: &str, names: &[&str], values: &[&str]) -> bool {
    if names.len() == values.len() {
        return true;
    }
    debug_assert_eq!(names.len(), values.len(), "label arity mismatch for {metric}");
    tracing::warn!(metric, expected = names.len(), got = values.len(), "label arity mismatch; sample dropped");
    false
}

pub struct CounterVec {
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    map: DashMap<Vec<String>, AtomicU64>,
}

impl CounterVec {
    pub fn new(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, help, labels, map: DashMap::new() }
    }

    /// Increment by 1.
    pub fn inc(&self, values: &[&str]) {
        self.add(values, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, values: &[&str], v: u64) {
        if !arity_ok(self.name, self.labels, values) {
            return;
        }
        let counter = self.map.entry(key_of(values)).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value of one series (0 when never observed).
    pub fn get(&self, values: &[&str]) -> u64 {
        self.map
            .get(&key_of(values))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, out: &mut String, format: ExpositionFormat) {
        write_header(out, self.name, self.help, MetricKind::Counter, format);
        let mut rows: Vec<(Vec<String>, u64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        for (key, val) in rows {
            write_series(out, self.name, &label_pairs(self.labels, &key), &val.to_string());
        }
    }
}

pub struct GaugeVec {
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    map: DashMap<Vec<String>, AtomicI64>,
}

impl GaugeVec {
    pub fn new(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, help, labels, map: DashMap::new() }
    }

    /// Increment by 1.
    pub fn inc(&self, values: &[&str]) { self.add(values, 1); }
    /// Decrement by 1.
    pub fn dec(&self, values: &[&str]) { self.add(values, -1); }

    /// Add an arbitrary signed delta.
    pub fn add(&self, values: &[&str], v: i64) {
        if !arity_ok(self.name, self.labels, values) {
            return;
        }
        let gauge = self.map.entry(key_of(values)).or_insert_with(|| AtomicI64::new(0));
        gauge.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, values: &[&str]) -> i64 {
        self.map
            .get(&key_of(values))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, out: &mut String, format: ExpositionFormat) {
        write_header(out, self.name, self.help, MetricKind::Gauge, format);
        let mut rows: Vec<(Vec<String>, i64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        for (key, val) in rows {
            write_series(out, self.name, &label_pairs(self.labels, &key), &val.to_string());
        }
    }
}

struct AtomicHistogram {
    count: AtomicU64,
    sum_bits: AtomicU64,
    // cumulative: buckets[i] counts observations <= bounds[i]
    buckets: Box<[AtomicU64]>,
}

impl AtomicHistogram {
    fn new(n: usize) -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_bits: AtomicU64::new(0f64.to_bits()),
            buckets: (0..n).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    fn add_sum(&self, v: f64) {
        let mut cur = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(cur) + v).to_bits();
            match self.sum_bits.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
    }
}

/// Point-in-time copy of one histogram series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    /// `(upper bound, cumulative count)` pairs, excluding `+Inf`.
    pub buckets: Vec<(f64, u64)>,
}

pub struct HistogramVec {
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    bounds: Vec<f64>,
    map: DashMap<Vec<String>, AtomicHistogram>,
}

impl HistogramVec {
    pub fn new(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
        bounds: Vec<f64>,
    ) -> Self {
        Self { name, help, labels, bounds, map: DashMap::new() }
    }

    pub fn observe(&self, values: &[&str], v: f64) {
        if !arity_ok(self.name, self.labels, values) {
            return;
        }
        let hist = self
            .map
            .entry(key_of(values))
            .or_insert_with(|| AtomicHistogram::new(self.bounds.len()));

        for (i, &b) in self.bounds.iter().enumerate() {
            if v <= b {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        hist.add_sum(v);
        hist.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Observe a duration in seconds.
    pub fn observe_duration(&self, values: &[&str], d: Duration) {
        self.observe(values, d.as_secs_f64());
    }

    pub fn snapshot(&self, values: &[&str]) -> Option<HistogramSnapshot> {
        let hist = self.map.get(&key_of(values))?;
        Some(HistogramSnapshot {
            count: hist.count.load(Ordering::Relaxed),
            sum: hist.sum(),
            buckets: self
                .bounds
                .iter()
                .zip(hist.buckets.iter())
                .map(|(&le, c)| (le, c.load(Ordering::Relaxed)))
                .collect(),
        })
    }

    /// Number of observations in one series (0 when never observed).
    pub fn sample_count(&self, values: &[&str]) -> u64 {
        self.snapshot(values).map(|s| s.count).unwrap_or(0)
    }

    fn render(&self, out: &mut String, format: ExpositionFormat) {
        write_header(out, self.name, self.help, MetricKind::Histogram, format);
        let mut keys: Vec<Vec<String>> = self.map.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        for key in keys {
            let Some(hist) = self.map.get(&key) else { continue };
            let labels = label_pairs(self.labels, &key);
            let prefix = if labels.is_empty() { String::new() } else { format!("{labels},") };

            for (i, &le) in self.bounds.iter().enumerate() {
                let count = hist.buckets[i].load(Ordering::Relaxed);
                let _ = writeln!(
                    out,
                    "{}_bucket{{{}le=\"{}\"}} {}",
                    self.name,
                    prefix,
                    fmt_float(le, format),
                    count
                );
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", self.name, prefix, count);
            write_series(out, &format!("{}_sum", self.name), &labels, &fmt_float(hist.sum(), format));
            write_series(out, &format!("{}_count", self.name), &labels, &count.to_string());
        }
    }
}

const METHOD_ROUTE_STATUS: &[&str] = &["method", "route", "status"];
const METHOD_ROUTE: &[&str] = &["method", "route"];
const ROUTE: &[&str] = &["route"];

/// Process-wide RED metrics plus process/runtime collectors.
pub struct Registry {
    pub requests_total: CounterVec,
    pub request_duration: HistogramVec,
    pub inflight: GaugeVec,
    pub request_size: HistogramVec,
    pub response_size: HistogramVec,
    pub panics_total: CounterVec,
    process: ProcessCollector,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            requests_total: CounterVec::new(
                "http_requests_total",
                "Total number of HTTP requests.",
                METHOD_ROUTE_STATUS,
            ),
            request_duration: HistogramVec::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds.",
                METHOD_ROUTE_STATUS,
                exponential_buckets(0.001, 2.0, 15),
            ),
            inflight: GaugeVec::new(
                "http_inflight_requests",
                "Number of HTTP requests currently being served.",
                ROUTE,
            ),
            request_size: HistogramVec::new(
                "http_request_size_bytes",
                "HTTP request body size in bytes (from Content-Length).",
                METHOD_ROUTE,
                exponential_buckets(64.0, 4.0, 10),
            ),
            response_size: HistogramVec::new(
                "http_response_size_bytes",
                "HTTP response body size in bytes.",
                METHOD_ROUTE_STATUS,
                exponential_buckets(64.0, 4.0, 10),
            ),
            panics_total: CounterVec::new(
                "http_panics_total",
                "Total number of recovered handler panics.",
                ROUTE,
            ),
            process: ProcessCollector::new(),
        }
    }

    /// Render every family, then the collector samples.
    pub fn render(&self, format: ExpositionFormat) -> String {
        let mut out = String::new();
        self.requests_total.render(&mut out, format);
        self.request_duration.render(&mut out, format);
        self.inflight.render(&mut out, format);
        self.request_size.render(&mut out, format);
        self.response_size.render(&mut out, format);
        self.panics_total.render(&mut out, format);

        for s in self.process.collect() {
            write_header(&mut out, s.name, s.help, s.kind, format);
            write_series(&mut out, s.name, "", &fmt_float(s.value, format));
        }
        if format == ExpositionFormat::OpenMetrics {
            out.push_str("# EOF\n");
        }
        out
    }
}
