//! Hardware capability probe
//!
//! Classifies the local host into a processing tier. The tier decides which
//! filter the media pipeline runs and is broadcast to peers as `hardware-info`.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::process::Command;

/// Logical core count above which a host without an accelerator is HIGH_CPU
pub const HIGH_CPU_CORE_THRESHOLD: u32 = 12;

/// Capability tier of the local host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HardwareTier {
    /// CUDA-class accelerator present
    GpuAccel,
    /// More than 12 logical cores
    HighCpu,
    /// Everything else
    StandardCpu,
}

impl HardwareTier {
    /// Stable label used in overlays and logs
    pub fn label(&self) -> &'static str {
        match self {
            HardwareTier::GpuAccel => "GPU_ACCEL",
            HardwareTier::HighCpu => "HIGH_CPU",
            HardwareTier::StandardCpu => "STANDARD_CPU",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            HardwareTier::GpuAccel => "Tier 1: accelerator present (detail enhancement)",
            HardwareTier::HighCpu => "Tier 2: high-performance CPU (edge-preserving smoothing)",
            HardwareTier::StandardCpu => "Tier 3: standard CPU (basic denoise)",
        }
    }
}

impl fmt::Display for HardwareTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of probing the host. Computed once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub tier: HardwareTier,
    pub cpu_cores: u32,
    pub has_accelerator: bool,
    #[serde(default)]
    pub accelerator_name: Option<String>,
}

impl HardwareProfile {
    /// Same host facts, different tier (config override)
    pub fn with_tier(mut self, tier: HardwareTier) -> Self {
        self.tier = tier;
        self
    }
}

/// Acceleration backend reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelerationBackend {
    Cuda,
    Cpu,
}

impl AccelerationBackend {
    pub fn is_cuda_class(&self) -> bool {
        matches!(self, AccelerationBackend::Cuda)
    }
}

/// Read-only view of the host used by the probe
pub trait HostInspector {
    /// Logical CPU count
    fn logical_cores(&self) -> u32;

    /// Available acceleration backends
    fn acceleration_backends(&self) -> Vec<AccelerationBackend>;

    /// Best-effort accelerator name. Must not fail.
    fn accelerator_name(&self) -> Option<String>;
}

/// CUDA driver libraries, probed in order
const CUDA_DRIVER_CANDIDATES: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu/libcuda.so.1",
    "/usr/lib/aarch64-linux-gnu/libcuda.so.1",
    "/usr/lib64/libcuda.so.1",
    "/usr/lib/libcuda.so.1",
    "/usr/lib/wsl/lib/libcuda.so.1",
    "C:\\Windows\\System32\\nvcuda.dll",
];

/// The real host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl HostInspector for SystemHost {
    fn logical_cores(&self) -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1)
    }

    fn acceleration_backends(&self) -> Vec<AccelerationBackend> {
        let mut backends = vec![AccelerationBackend::Cpu];
        if let Some(path) = CUDA_DRIVER_CANDIDATES
            .iter()
            .find(|candidate| Path::new(candidate).exists())
        {
            debug!("Found CUDA driver: {}", path);
            backends.insert(0, AccelerationBackend::Cuda);
        }
        backends
    }

    fn accelerator_name(&self) -> Option<String> {
        let output = match Command::new("nvidia-smi").arg("-L").output() {
            Ok(output) => output,
            Err(e) => {
                trace!("nvidia-smi unavailable: {}", e);
                return None;
            }
        };
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }
}

/// Tier decision for a host without overrides
pub fn classify(cpu_cores: u32, has_accelerator: bool) -> HardwareTier {
    if has_accelerator {
        HardwareTier::GpuAccel
    } else if cpu_cores > HIGH_CPU_CORE_THRESHOLD {
        HardwareTier::HighCpu
    } else {
        HardwareTier::StandardCpu
    }
}

/// Probe the real host
pub fn probe() -> HardwareProfile {
    probe_with(&SystemHost)
}

/// Probe through an arbitrary inspector
pub fn probe_with(host: &impl HostInspector) -> HardwareProfile {
    let cpu_cores = host.logical_cores();
    let has_accelerator = host
        .acceleration_backends()
        .iter()
        .any(AccelerationBackend::is_cuda_class);

    let accelerator_name = if has_accelerator {
        host.accelerator_name()
    } else {
        None
    };

    HardwareProfile {
        tier: classify(cpu_cores, has_accelerator),
        cpu_cores,
        has_accelerator,
        accelerator_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHost {
        cores: u32,
        cuda: bool,
        name: Option<&'static str>,
    }

    impl HostInspector for FakeHost {
        fn logical_cores(&self) -> u32 {
            self.cores
        }

        fn acceleration_backends(&self) -> Vec<AccelerationBackend> {
            if self.cuda {
                vec![AccelerationBackend::Cuda, AccelerationBackend::Cpu]
            } else {
                vec![AccelerationBackend::Cpu]
            }
        }

        fn accelerator_name(&self) -> Option<String> {
            self.name.map(str::to_string)
        }
    }

    #[test]
    fn thirteen_cores_without_accelerator_is_high_cpu() {
        let profile = probe_with(&FakeHost { cores: 13, cuda: false, name: None });
        assert_eq!(profile.tier, HardwareTier::HighCpu);
        assert!(!profile.has_accelerator);
    }

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(classify(12, false), HardwareTier::StandardCpu);
        assert_eq!(classify(8, false), HardwareTier::StandardCpu);
    }

    #[test]
    fn accelerator_wins_regardless_of_cores() {
        for cores in [1, 8, 13, 64] {
            let profile = probe_with(&FakeHost { cores, cuda: true, name: Some("GPU 0: Test") });
            assert_eq!(profile.tier, HardwareTier::GpuAccel);
            assert_eq!(profile.accelerator_name.as_deref(), Some("GPU 0: Test"));
        }
    }

    #[test]
    fn failed_name_lookup_leaves_name_absent() {
        let profile = probe_with(&FakeHost { cores: 4, cuda: true, name: None });
        assert!(profile.has_accelerator);
        assert_eq!(profile.accelerator_name, None);
    }

    #[test]
    fn repeated_probe_is_identical() {
        assert_eq!(probe(), probe());
    }

    #[test]
    fn profile_serializes_camel_case() {
        let profile = HardwareProfile {
            tier: HardwareTier::StandardCpu,
            cpu_cores: 8,
            has_accelerator: false,
            accelerator_name: None,
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["tier"], "STANDARD_CPU");
        assert_eq!(json["cpuCores"], 8);
        assert_eq!(json["hasAccelerator"], false);
    }
}
