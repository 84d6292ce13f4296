//! Compute device selection and memory reclamation

use candle_core::Device;
use cerberus_core::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// CPU inference (always available)
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize), // GPU index
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl DeviceType {
    /// Whether this is an accelerator rather than the host CPU
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{}", idx),
            Self::Metal(idx) => write!(f, "metal:{}", idx),
        }
    }
}

/// Device preference from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    /// Probe for an accelerator and fall back to CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl DeviceSpec {
    /// Resolve the preference to a concrete device type.
    ///
    /// `Auto` asks `compute` for an accelerator and falls back to CPU.
    pub fn resolve(&self, index: usize, compute: &dyn ComputeBackend) -> DeviceType {
        match self {
            Self::Auto => compute.probe_accelerator(index).unwrap_or(DeviceType::Cpu),
            Self::Cpu => DeviceType::Cpu,
            Self::Cuda => DeviceType::Cuda(index),
            Self::Metal => DeviceType::Metal(index),
        }
    }
}

/// Device probing, creation, and memory reclamation.
///
/// Cache release and handle collection act on the whole device, so every
/// detector sharing that device is affected, not only the caller.
pub trait ComputeBackend: Send {
    /// Return the accelerator at `index` if one is usable
    fn probe_accelerator(&self, index: usize) -> Option<DeviceType>;

    /// Create the Candle device for a device type
    fn create_device(&self, device_type: DeviceType) -> Result<Device>;

    /// Return cached accelerator memory to the system
    fn release_cached_memory(&self, device: &Device) -> Result<()>;

    /// Release cross-process shared memory handles
    fn collect_shared_handles(&self, device: &Device) -> Result<()>;

    fn is_accelerator_available(&self) -> bool {
        self.probe_accelerator(0).is_some()
    }
}

/// Candle-backed compute backend. CUDA is preferred over Metal.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleCompute;

impl ComputeBackend for CandleCompute {
    fn probe_accelerator(&self, index: usize) -> Option<DeviceType> {
        if candle_core::utils::cuda_is_available() {
            Some(DeviceType::Cuda(index))
        } else if candle_core::utils::metal_is_available() {
            Some(DeviceType::Metal(index))
        } else {
            None
        }
    }

    fn create_device(&self, device_type: DeviceType) -> Result<Device> {
        match device_type {
            DeviceType::Cpu => Ok(Device::Cpu),
            DeviceType::Cuda(idx) => Device::new_cuda(idx).map_err(|e| {
                cerberus_core::Error::model(format!("Failed to create CUDA device: {}", e))
            }),
            DeviceType::Metal(idx) => Device::new_metal(idx).map_err(|e| {
                cerberus_core::Error::model(format!("Failed to create Metal device: {}", e))
            }),
        }
    }

    fn release_cached_memory(&self, device: &Device) -> Result<()> {
        if device.is_cpu() {
            return Ok(());
        }

        // Buffers dropped by the caller return to the allocator once queued
        // kernels referencing them have completed.
        device.synchronize().map_err(|e| {
            cerberus_core::Error::model(format!("Failed to synchronize device: {}", e))
        })?;
        tracing::debug!("Released cached memory on {:?}", device.location());
        Ok(())
    }

    fn collect_shared_handles(&self, device: &Device) -> Result<()> {
        // Candle does not export IPC memory handles, so nothing is held across processes.
        tracing::trace!("No shared handles to collect on {:?}", device.location());
        Ok(())
    }
}
