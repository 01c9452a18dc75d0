use std::collections::BTreeMap;

use tracing::debug;

use super::{Accelerator, WgpuAccelerator};
use crate::error::{Error, Result};

/// Builds a fresh accelerator instance.
pub type AcceleratorFactory = fn() -> Box<dyn Accelerator>;

#[derive(Debug, Clone)]
struct RegistryEntry {
    description: String,
    factory: AcceleratorFactory,
}

/// Accelerators known to the training loop, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct AcceleratorRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl AcceleratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every accelerator this crate ships.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.entries.insert(
            WgpuAccelerator::KIND.to_string(),
            RegistryEntry {
                description: "wgpu accelerator - portable GPU training through burn's wgpu backend."
                    .to_string(),
                factory: || Box::new(WgpuAccelerator::default()),
            },
        );
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        factory: AcceleratorFactory,
    ) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(Error::DuplicateAccelerator(name.to_string()));
        }
        debug!(name, "registering accelerator");
        self.entries.insert(
            name.to_string(),
            RegistryEntry {
                description: description.to_string(),
                factory,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Box<dyn Accelerator>> {
        self.entries
            .get(name)
            .map(|entry| (entry.factory)())
            .ok_or_else(|| Error::UnknownAccelerator(name.to_string()))
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.description.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
