//! Backend abstraction - Multi-backend support
//!
//! Supports both CUDA (GPU) and NdArray (CPU) backends, chosen at compile time.
//! The device list is queried once at startup and handed to whoever needs it;
//! nothing here caches device state globally.

use burn::backend::Autodiff;

// --------------------------------------------------------------------------------
// BACKEND SELECTION: CUDA (feature) or NdArray (default)
// --------------------------------------------------------------------------------

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray")))]
compile_error!("At least one backend (cuda or ndarray) must be enabled!");

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device type of the default backend
pub type DefaultDevice = <DefaultBackend as burn::tensor::backend::Backend>::Device;

/// Get the default device
pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
    {
        "NdArray (CPU)"
    }
}

/// Capability to enumerate the compute devices visible to the process.
pub trait DeviceQuery {
    /// Names of every logical device, e.g. `"device:cpu:0"`
    fn list_devices(&self) -> Vec<String>;

    /// Subset of [`DeviceQuery::list_devices`] that are GPUs
    fn gpu_devices(&self) -> Vec<String> {
        self.list_devices()
            .into_iter()
            .filter(|name| name.to_lowercase().contains("device:gpu"))
            .collect()
    }
}

/// Device query backed by the compiled-in Burn backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct BurnDeviceQuery;

impl DeviceQuery for BurnDeviceQuery {
    fn list_devices(&self) -> Vec<String> {
        let mut devices = vec!["device:cpu:0".to_string()];

        #[cfg(feature = "cuda")]
        {
            let device = burn_cuda::CudaDevice::default();
            devices.push(format!("device:gpu:{}", device.index));
        }

        devices
    }
}

/// Snapshot of the devices found at startup.
#[derive(Debug, Clone)]
pub struct DeviceInventory {
    pub devices: Vec<String>,
    pub gpus: Vec<String>,
}

impl DeviceInventory {
    /// Query once and keep the result
    pub fn probe(query: &dyn DeviceQuery) -> Self {
        Self {
            devices: query.list_devices(),
            gpus: query.gpu_devices(),
        }
    }

    pub fn has_gpu(&self) -> bool {
        !self.gpus.is_empty()
    }
}
