//! Process memory sampling

use crate::error::SampleFailure;
use crate::gauge::{GaugeReporter, Sample};
use std::sync::{Arc, Mutex};
use sysinfo::{Pid, System};

pub const MEMORY_USAGE_GAUGE: &str = "process.memory.usage";
pub const MEMORY_VIRTUAL_GAUGE: &str = "process.memory.virtual";

/// Memory counters of one process, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

/// Samples memory usage of the current process
pub struct ProcessMemorySampler {
    pid: Pid,
    system: Mutex<System>,
}

impl ProcessMemorySampler {
    pub fn current() -> Result<Self, SampleFailure> {
        let pid = sysinfo::get_current_pid().map_err(SampleFailure::new)?;
        Ok(Self {
            pid,
            system: Mutex::new(System::new()),
        })
    }

    /// Refresh and read the process memory counters
    pub fn snapshot(&self) -> Result<MemorySnapshot, SampleFailure> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| SampleFailure::new("memory sampler lock poisoned"))?;

        if !system.refresh_process(self.pid) {
            return Err(SampleFailure::new(format!("process {} not found", self.pid)));
        }

        let process = system
            .process(self.pid)
            .ok_or_else(|| SampleFailure::new(format!("process {} not found", self.pid)))?;

        Ok(MemorySnapshot {
            resident_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        })
    }
}

/// Register resident and virtual memory gauges for the current process
pub fn register_process_memory_gauges(reporter: &GaugeReporter) -> Result<(), SampleFailure> {
    let sampler = Arc::new(ProcessMemorySampler::current()?);

    let resident = sampler.clone();
    reporter.register_gauge(
        MEMORY_USAGE_GAUGE,
        "byte",
        "Reports resident memory of the process.",
        move || Ok(Sample::from(resident.snapshot()?.resident_bytes)),
    );

    reporter.register_gauge(
        MEMORY_VIRTUAL_GAUGE,
        "byte",
        "Reports virtual memory of the process.",
        move || Ok(Sample::from(sampler.snapshot()?.virtual_bytes)),
    );

    Ok(())
}
