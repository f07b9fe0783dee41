use serde::{Deserialize, Serialize};
use std::fmt;

/// Compute device a model instance is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda(usize),
}

impl Device {
    /// Picks the first accelerator when one is visible, otherwise the CPU.
    pub fn detect() -> Self {
        if accelerator_count() > 0 {
            Device::Cuda(0)
        } else {
            Device::Cpu
        }
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{}", index),
        }
    }
}

/// Number of logical processors available to this process.
pub fn logical_cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Number of visible accelerator devices.
///
/// `CUDA_VISIBLE_DEVICES` takes precedence when set, matching how the CUDA
/// runtime masks devices. Without it we fall back to counting entries under
/// the NVIDIA driver's procfs tree, which is empty on hosts without a GPU.
pub fn accelerator_count() -> usize {
    if let Ok(mask) = std::env::var("CUDA_VISIBLE_DEVICES") {
        return visible_devices_in_mask(&mask);
    }
    match std::fs::read_dir("/proc/driver/nvidia/gpus") {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

fn visible_devices_in_mask(mask: &str) -> usize {
    let mask = mask.trim();
    if mask.is_empty() {
        return 0;
    }
    mask.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && *entry != "-1")
        .count()
}
