//! Host resource sampling attached to every result row.

use sysinfo::System;

/// CPU and memory utilization of the benchmarking host, in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SystemStats {
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

/// A source of [`SystemStats`] samples.
pub trait StatsProbe: Send {
    /// Samples utilization at this instant.
    fn sample(&mut self) -> SystemStats;
}

/// A probe that always reports the same values, useful where the host should not matter.
impl StatsProbe for SystemStats {
    fn sample(&mut self) -> SystemStats {
        *self
    }
}

/// Samples the host through [`sysinfo`].
///
/// CPU usage is measured between two consecutive samples, so the very first sample after
/// construction reports `0.0`. Memory usage is the share of memory that is not available to new
/// allocations.
pub struct SystemStatsProbe {
    system: System,
}

impl SystemStatsProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self { system }
    }
}

impl Default for SystemStatsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemStatsProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemStatsProbe").finish_non_exhaustive()
    }
}

impl StatsProbe for SystemStatsProbe {
    fn sample(&mut self) -> SystemStats {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let memory_usage = if total == 0 {
            0.0
        } else {
            let used = total.saturating_sub(self.system.available_memory());
            used as f64 / total as f64 * 100.0
        };

        SystemStats {
            cpu_usage: f64::from(self.system.global_cpu_info().cpu_usage()),
            memory_usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_percentages() {
        let mut probe = SystemStatsProbe::new();
        for _ in 0..2 {
            let stats = probe.sample();
            assert!((0.0..=100.0).contains(&stats.memory_usage), "{stats:?}");
            assert!(stats.cpu_usage >= 0.0, "{stats:?}");
        }
    }

    #[test]
    fn fixed_stats_probe() {
        let mut probe = SystemStats {
            cpu_usage: 12.5,
            memory_usage: 40.0,
        };
        assert_eq!(probe.sample().cpu_usage, 12.5);
        assert_eq!(probe.sample().memory_usage, 40.0);
    }
}
