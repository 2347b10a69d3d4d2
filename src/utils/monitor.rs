use crate::core::pipeline::PipelineReport;
use crate::core::stages::StageReport;
#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// 某一時刻的行程資源用量
#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed: Duration,
}

/// stage 結束時把處理統計與資源用量記在同一行
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    peak_memory_mb: Mutex<u64>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
            started: Instant::now(),
            peak_memory_mb: Mutex::new(0),
            enabled,
        }
    }

    /// 只更新本行程；停用或取不到行程時回傳 None
    pub fn snapshot(&self) -> Option<ResourceSnapshot> {
        if !self.enabled {
            return None;
        }
        let pid = self.pid?;

        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;

        let mut peak = self.peak_memory_mb.lock().ok()?;
        *peak = (*peak).max(memory_mb);

        Some(ResourceSnapshot {
            cpu_usage: process.cpu_usage(),
            memory_mb,
            peak_memory_mb: *peak,
            elapsed: self.started.elapsed(),
        })
    }

    pub fn log_stage(&self, stage: &StageReport) {
        if let Some(snapshot) = self.snapshot() {
            tracing::info!(
                "📊 {} done - processed: {}, failed: {}, cards: {}, retries: {} | CPU: {:.1}%, Memory: {}MB, Time: {:?}",
                stage.stage,
                stage.processed,
                stage.failed,
                stage.cards,
                stage.retries,
                snapshot.cpu_usage,
                snapshot.memory_mb,
                snapshot.elapsed
            );
        }
    }

    pub fn log_run(&self, report: &PipelineReport) {
        if let Some(snapshot) = self.snapshot() {
            let seconds = report.elapsed.as_secs_f64();
            let notes_per_second = if seconds > 0.0 {
                report.notes as f64 / seconds
            } else {
                0.0
            };
            tracing::info!(
                "📊 Run finished - {} tasks, {} notes ({:.1}/s), Peak Memory: {}MB",
                report.tasks,
                report.notes,
                notes_per_second,
                snapshot.peak_memory_mb
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// 非 CLI 建置時的空實作
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn log_stage(&self, _stage: &StageReport) {}

    pub fn log_run(&self, _report: &PipelineReport) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_monitor_takes_no_snapshot() {
        let monitor = SystemMonitor::default();
        assert!(!monitor.is_enabled());
        assert!(monitor.snapshot().is_none());
        monitor.log_stage(&StageReport::new("fetch"));
        monitor.log_run(&PipelineReport::default());
    }

    #[test]
    fn test_peak_memory_never_drops() {
        let monitor = SystemMonitor::new(true);
        let first = monitor.snapshot();
        let _buffer = vec![0u8; 8 * 1024 * 1024];
        let second = monitor.snapshot();
        if let (Some(first), Some(second)) = (first, second) {
            assert!(second.peak_memory_mb >= first.peak_memory_mb);
            assert!(second.peak_memory_mb >= second.memory_mb);
            assert!(second.elapsed >= first.elapsed);
        }
    }
}
