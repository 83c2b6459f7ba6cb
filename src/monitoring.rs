// Progress reporting driven by the byte count of the input stream
use std::time::Instant;
use tracing::info;

/// Report interval for inputs of unknown size
const UNKNOWN_SIZE_STEP: u64 = 64 * 1024 * 1024;

/// Configuration for progress reporting
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub enable_progress: bool,
    /// Percentage step between reports when the input size is known
    pub percent_step: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_progress: true,
            percent_step: 5,
        }
    }
}

/// Passive observer of bytes consumed. It never touches the input itself;
/// the orchestrator hands it the decoder's running byte count.
pub struct ProgressMonitor {
    config: MonitoringConfig,
    total_bytes: Option<u64>,
    next_report: u64,
    started: Instant,
}

impl ProgressMonitor {
    pub fn new(config: MonitoringConfig, total_bytes: Option<u64>) -> Self {
        let mut monitor = Self {
            config,
            total_bytes,
            next_report: 0,
            started: Instant::now(),
        };
        monitor.next_report = monitor.step();
        monitor
    }

    /// A monitor that never reports
    pub fn disabled() -> Self {
        Self::new(
            MonitoringConfig {
                enable_progress: false,
                ..MonitoringConfig::default()
            },
            None,
        )
    }

    fn step(&self) -> u64 {
        match self.total_bytes {
            Some(total) if total > 0 => (total * self.config.percent_step.max(1) / 100).max(1),
            _ => UNKNOWN_SIZE_STEP,
        }
    }

    /// Record the current byte count; logs when a reporting threshold is crossed
    pub fn observe(&mut self, bytes: u64, records: u64) -> bool {
        if !self.config.enable_progress || bytes < self.next_report {
            return false;
        }
        let step = self.step();
        while self.next_report <= bytes {
            self.next_report += step;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { records as f64 / elapsed } else { 0.0 };
        match self.total_bytes {
            Some(total) if total > 0 => info!(
                bytes,
                total,
                records,
                "Import progress: {:.1}% ({:.0} records/s)",
                (bytes as f64 / total as f64) * 100.0,
                rate
            ),
            _ => info!(bytes, records, "Import progress: {} bytes read ({:.0} records/s)", bytes, rate),
        }
        true
    }

    /// Final progress line
    pub fn finish(&self, bytes: u64, records: u64) {
        if self.config.enable_progress {
            info!(
                bytes,
                records,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "Input fully read"
            );
        }
    }
}
