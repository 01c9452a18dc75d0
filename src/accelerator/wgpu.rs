use burn::{
    backend::{wgpu::WgpuDevice, Wgpu},
    tensor::backend::Backend,
};
use tracing::{debug, info, warn};

use super::{Accelerator, DeviceDescriptor};
use crate::error::{Error, Result};

/// Accelerator for GPUs driven through burn's wgpu backend.
///
/// wgpu does not expose adapter enumeration through burn, so the number of
/// visible devices is supplied by the caller.
#[derive(Debug, Clone)]
pub struct WgpuAccelerator {
    device_count: usize,
    active: Option<WgpuDevice>,
}

impl WgpuAccelerator {
    pub const KIND: &'static str = "wgpu";

    pub fn new(device_count: usize) -> Self {
        Self {
            device_count,
            active: None,
        }
    }

    /// Device the accelerator was last pinned to.
    pub fn active_device(&self) -> Option<&WgpuDevice> {
        self.active.as_ref()
    }

    /// burn device for a descriptor of this kind.
    pub fn to_device(&self, device: &DeviceDescriptor) -> Result<WgpuDevice> {
        if device.kind != Self::KIND {
            return Err(Error::DeviceKindMismatch {
                expected: Self::KIND.to_string(),
                actual: device.kind.clone(),
            });
        }

        let index = device.index.unwrap_or(0);
        if index >= self.device_count {
            return Err(Error::DeviceIndexOutOfRange {
                index,
                count: self.device_count,
            });
        }

        Ok(WgpuDevice::DiscreteGpu(index))
    }
}

impl Default for WgpuAccelerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Accelerator for WgpuAccelerator {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn setup_device(&mut self, device: &DeviceDescriptor) -> Result<DeviceDescriptor> {
        let wgpu_device = self.to_device(device)?;
        let resolved = DeviceDescriptor::new(Self::KIND, device.index.unwrap_or(0));
        info!(device = %resolved, "wgpu device selected");
        self.active = Some(wgpu_device);
        Ok(resolved)
    }

    fn teardown(&mut self) {
        match self.active.take() {
            Some(device) => {
                debug!(?device, "flushing wgpu device");
                <Wgpu as Backend>::sync(&device);
            }
            None => warn!("teardown called without an active wgpu device"),
        }
    }

    fn auto_device_count(&self) -> usize {
        self.device_count
    }
}
