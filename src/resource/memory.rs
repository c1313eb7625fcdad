//! Process memory sampling and leak-growth classification (§4.A).
//!
//! There is no `psutil` equivalent in the dependency stack, so RSS is read
//! directly from `/proc/self/status` on Linux. On platforms without that
//! file, sampling degrades to `None` and leak detection is simply skipped
//! — informational, never fatal, per spec.

use std::fmt;

/// Severity bucket for a detected memory leak, per spec thresholds:
/// moderate < 1.5x threshold, high < 3x threshold, severe >= 3x threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakSeverity {
    Moderate,
    High,
    Severe,
}

impl fmt::Display for LeakSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeakSeverity::Moderate => "moderate",
            LeakSeverity::High => "high",
            LeakSeverity::Severe => "severe",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct MemoryLeakWarning {
    pub growth_mb: f64,
    pub current_mb: f64,
    pub baseline_mb: f64,
    pub threshold_mb: f64,
}

impl MemoryLeakWarning {
    pub fn severity(&self) -> LeakSeverity {
        if self.growth_mb >= self.threshold_mb * 3.0 {
            LeakSeverity::Severe
        } else if self.growth_mb >= self.threshold_mb * 1.5 {
            LeakSeverity::High
        } else {
            LeakSeverity::Moderate
        }
    }

    pub fn recommendations(&self) -> Vec<&'static str> {
        let mut recs = vec![
            "review resource cleanup paths for this operation",
            "check for background tasks that were never tracked for cancellation",
            "verify temporary paths were registered before the scope exited",
        ];
        if self.severity() == LeakSeverity::Severe {
            recs.push("consider restarting the affected worker process");
        }
        recs
    }
}

impl fmt::Display for MemoryLeakWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory leak [{}]: grew by {:.1}MB (current {:.1}MB, baseline {:.1}MB, threshold {:.1}MB)",
            self.severity(),
            self.growth_mb,
            self.current_mb,
            self.baseline_mb,
            self.threshold_mb
        )
    }
}

/// Reads current process RSS in MiB, or `None` if unavailable on this platform.
pub fn current_rss_mb() -> Option<f64> {
    read_proc_self_status_rss_kb().map(|kb| kb as f64 / 1024.0)
}

#[cfg(target_os = "linux")]
fn read_proc_self_status_rss_kb() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
            return digits.parse::<u64>().ok();
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn read_proc_self_status_rss_kb() -> Option<u64> {
    None
}

/// Captures a baseline at scope entry and classifies growth at scope exit.
pub struct MemoryMonitor {
    pub baseline_mb: f64,
    pub threshold_mb: f64,
}

impl MemoryMonitor {
    pub fn new(threshold_mb: f64) -> Self {
        Self {
            baseline_mb: current_rss_mb().unwrap_or(0.0),
            threshold_mb,
        }
    }

    pub fn check_for_leak(&self) -> Option<MemoryLeakWarning> {
        let current_mb = current_rss_mb()?;
        let growth_mb = current_mb - self.baseline_mb;
        if growth_mb > self.threshold_mb {
            Some(MemoryLeakWarning {
                growth_mb,
                current_mb,
                baseline_mb: self.baseline_mb,
                threshold_mb: self.threshold_mb,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_buckets() {
        let w = MemoryLeakWarning {
            growth_mb: 120.0,
            current_mb: 220.0,
            baseline_mb: 100.0,
            threshold_mb: 100.0,
        };
        assert_eq!(w.severity(), LeakSeverity::Moderate);

        let w = MemoryLeakWarning { growth_mb: 160.0, ..w };
        assert_eq!(w.severity(), LeakSeverity::High);

        let w = MemoryLeakWarning { growth_mb: 301.0, ..w };
        assert_eq!(w.severity(), LeakSeverity::Severe);
    }
}
