//! Device adapter for training loops.
//!
//! An [`Accelerator`] validates the device a run is pinned to, expands a user
//! supplied device specification into concrete device handles and releases
//! device state at the end of a run. Implementations are advertised to the
//! training loop through an [`AcceleratorRegistry`].

use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::error::{Error, Result};

pub mod registry;
pub mod wgpu;

pub use registry::{AcceleratorFactory, AcceleratorRegistry};
pub use wgpu::WgpuAccelerator;

/// A device kind plus an optional ordinal, written `kind` or `kind:index`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    pub kind: String,
    pub index: Option<usize>,
}

impl DeviceDescriptor {
    pub fn new(kind: impl Into<String>, index: usize) -> Self {
        Self {
            kind: kind.into(),
            index: Some(index),
        }
    }

    pub fn unindexed(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            index: None,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}:{index}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl FromStr for DeviceDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidDeviceDescriptor(s.to_string());
        match s.split_once(':') {
            Some((kind, index)) if !kind.is_empty() => {
                let index = index.parse().map_err(|_| invalid())?;
                Ok(Self::new(kind, index))
            }
            None if !s.is_empty() => Ok(Self::unindexed(s)),
            _ => Err(invalid()),
        }
    }
}

/// How many devices a run should use, as written by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSpec {
    /// The first `n` devices.
    Count(usize),
    /// Exactly these ordinals.
    Indices(Vec<usize>),
    /// Every visible device.
    Auto,
    /// A device-kind name; the accelerator's own kind means every device.
    Kind(String),
}

impl FromStr for DeviceSpec {
    type Err = Error;

    /// Accepts `auto`, a count (`4`), an index list (`0,2`) or a kind name.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::UnknownDeviceSpec(s.to_string()));
        }
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        if let Ok(count) = s.parse() {
            return Ok(Self::Count(count));
        }
        if s.contains(',') {
            return s
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(|part| {
                    part.trim()
                        .parse()
                        .map_err(|_| Error::UnknownDeviceSpec(s.to_string()))
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::Indices);
        }
        Ok(Self::Kind(s.to_string()))
    }
}

/// Device statistics reported to loggers, keyed by metric name.
pub type DeviceStats = BTreeMap<String, f64>;

/// A compute-device family a training loop can run on.
pub trait Accelerator: fmt::Debug + Send {
    /// Kind string used in descriptors and as the registry key.
    fn kind(&self) -> &'static str;

    /// Pins the accelerator to `device`. A missing index means ordinal 0.
    fn setup_device(&mut self, device: &DeviceDescriptor) -> Result<DeviceDescriptor>;

    /// Releases whatever the active device is holding on to.
    fn teardown(&mut self);

    fn auto_device_count(&self) -> usize;

    fn is_available(&self) -> bool {
        self.auto_device_count() > 0
    }

    /// Every visible device. The spec is accepted for interface parity but
    /// does not narrow the result.
    fn parse_devices(&self, _spec: &DeviceSpec) -> Vec<DeviceDescriptor> {
        self.all_devices()
    }

    /// Concrete devices for a data-parallel run.
    fn parallel_devices(&self, spec: &DeviceSpec) -> Result<Vec<DeviceDescriptor>> {
        match spec {
            DeviceSpec::Count(count) => Ok((0..*count)
                .map(|index| DeviceDescriptor::new(self.kind(), index))
                .collect()),
            DeviceSpec::Indices(indices) => Ok(indices
                .iter()
                .map(|&index| DeviceDescriptor::new(self.kind(), index))
                .collect()),
            DeviceSpec::Auto => Ok(self.all_devices()),
            DeviceSpec::Kind(kind) if kind == self.kind() => Ok(self.all_devices()),
            DeviceSpec::Kind(kind) => Err(Error::UnknownDeviceSpec(kind.clone())),
        }
    }

    fn device_stats(&self, _device: &DeviceDescriptor) -> DeviceStats {
        DeviceStats::new()
    }

    fn all_devices(&self) -> Vec<DeviceDescriptor> {
        (0..self.auto_device_count())
            .map(|index| DeviceDescriptor::new(self.kind(), index))
            .collect()
    }
}
