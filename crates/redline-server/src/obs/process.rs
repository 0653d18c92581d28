//! Process and runtime collectors, sampled at scrape time.
//!
//! Memory and file-descriptor figures come from `/proc/self` and are only
//! reported on Linux; other platforms get start time, uptime and runtime info.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::obs::metrics::{MetricKind, Sample};

pub struct ProcessCollector {
    start_unix: f64,
    started: Instant,
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessCollector {
    pub fn new() -> Self {
        let start_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self { start_unix, started: Instant::now() }
    }

    pub fn collect(&self) -> Vec<Sample> {
        let mut out = vec![
            gauge(
                "process_start_time_seconds",
                "Start time of the process since unix epoch in seconds.",
                self.start_unix,
            ),
            gauge(
                "process_uptime_seconds",
                "Seconds since the metric registry was created.",
                self.started.elapsed().as_secs_f64(),
            ),
        ];

        #[cfg(target_os = "linux")]
        linux::collect(&mut out);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let m = handle.metrics();
            out.push(gauge(
                "tokio_runtime_workers",
                "Number of worker threads used by the runtime.",
                m.num_workers() as f64,
            ));
            out.push(gauge(
                "tokio_runtime_alive_tasks",
                "Number of alive tasks in the runtime.",
                m.num_alive_tasks() as f64,
            ));
        }
        out
    }
}

fn gauge(name: &'static str, help: &'static str, value: f64) -> Sample {
    Sample { name, help, kind: MetricKind::Gauge, value }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;

    use super::gauge;
    use crate::obs::metrics::Sample;

    /// Value of a `/proc/self/status` line such as `VmRSS:   1234 kB`, in bytes.
    fn status_kib(status: &str, key: &str) -> Option<f64> {
        let line = status.lines().find(|l| l.starts_with(key))?;
        let kib: f64 = line[key.len()..].trim().trim_end_matches("kB").trim().parse().ok()?;
        Some(kib * 1024.0)
    }

    pub(super) fn collect(out: &mut Vec<Sample>) {
        if let Ok(status) = fs::read_to_string("/proc/self/status") {
            if let Some(rss) = status_kib(&status, "VmRSS:") {
                out.push(gauge("process_resident_memory_bytes", "Resident memory size in bytes.", rss));
            }
            if let Some(vsz) = status_kib(&status, "VmSize:") {
                out.push(gauge("process_virtual_memory_bytes", "Virtual memory size in bytes.", vsz));
            }
        }
        if let Ok(dir) = fs::read_dir("/proc/self/fd") {
            out.push(gauge(
                "process_open_fds",
                "Number of open file descriptors.",
                dir.count() as f64,
            ));
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_reports_start_time() {
        let samples = ProcessCollector::new().collect();
        let start = samples.iter().find(|s| s.name == "process_start_time_seconds").unwrap();
        assert!(start.value > 0.0);
    }

    #[tokio::test]
    async fn reports_runtime_inside_tokio() {
        let samples = ProcessCollector::new().collect();
        assert!(samples.iter().any(|s| s.name == "tokio_runtime_workers"));
    }
}
