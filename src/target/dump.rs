//! Core dump backed target access
//!
//! A [`CoreDump`] is a static image of target memory and registers captured
//! at some halt, usable anywhere a live connection would be: expression
//! evaluation, tests, and offline post-mortem sessions all drive the same
//! [`TargetAccess`] interface against it. Dumps serialize to JSON so a
//! capture taken against real hardware can be replayed later.

use super::{RegisterSnapshot, TargetAccess};
use crate::error::{RemoteDbgError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One contiguous span of dumped memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    /// First address covered by this region
    pub base: u64,
    /// Raw bytes, `data[0]` at `base`
    pub data: Vec<u8>,
}

impl MemoryRegion {
    /// First address past the end of this region, saturating at the
    /// top of the address space
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.data.len() as u64)
    }

    /// True when `size` bytes starting at `address` fall inside this region
    pub fn covers(&self, address: u64, size: usize) -> bool {
        match address.checked_add(size as u64) {
            Some(read_end) => address >= self.base && read_end <= self.end(),
            None => false,
        }
    }
}

/// Static snapshot of target memory and registers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreDump {
    /// Instruction set the dump was captured from
    pub instruction_set: String,
    /// Dumped memory spans
    regions: Vec<MemoryRegion>,
    /// Register values at the capture point
    registers: RegisterSnapshot,
}

impl CoreDump {
    /// Create an empty dump for the given instruction set
    pub fn new(instruction_set: impl Into<String>) -> Self {
        Self {
            instruction_set: instruction_set.into(),
            regions: Vec::new(),
            registers: RegisterSnapshot::new(),
        }
    }

    /// Add a memory region
    pub fn with_region(mut self, base: u64, data: Vec<u8>) -> Self {
        self.add_region(base, data);
        self
    }

    /// Add one register value
    pub fn with_register(mut self, name: impl Into<String>, value: u64) -> Self {
        self.registers.set(name, value);
        self
    }

    /// Replace the whole register snapshot
    pub fn with_registers(mut self, registers: RegisterSnapshot) -> Self {
        self.registers = registers;
        self
    }

    /// Add a memory region
    pub fn add_region(&mut self, base: u64, data: Vec<u8>) {
        self.regions.push(MemoryRegion { base, data });
    }

    /// Registers captured with this dump
    pub fn registers(&self) -> &RegisterSnapshot {
        &self.registers
    }

    /// Clone the captured registers into a snapshot for a machine
    pub fn snapshot(&self) -> RegisterSnapshot {
        self.registers.clone()
    }

    /// Read bytes from the covering region, if any
    pub fn read(&self, address: u64, size: usize) -> Option<&[u8]> {
        self.regions.iter().find_map(|region| {
            if region.covers(address, size) {
                let offset = (address - region.base) as usize;
                Some(&region.data[offset..offset + size])
            } else {
                None
            }
        })
    }

    /// Load a dump from a JSON file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RemoteDbgError::Config(format!("Failed to read dump file {:?}: {}", path, e))
        })?;
        let dump: CoreDump = serde_json::from_str(&content)?;
        tracing::info!(
            "Loaded {} core dump from {:?}: {} regions, {} registers",
            dump.instruction_set,
            path,
            dump.regions.len(),
            dump.registers.len()
        );
        Ok(dump)
    }

    /// Save this dump to a JSON file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| {
            RemoteDbgError::Config(format!("Failed to write dump file {:?}: {}", path, e))
        })
    }
}

impl TargetAccess for CoreDump {
    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>> {
        match self.read(address, size) {
            Some(bytes) => Ok(bytes.to_vec()),
            None => {
                tracing::warn!("Dump cannot serve {} bytes at 0x{:x}", size, address);
                Err(RemoteDbgError::TargetAccess {
                    address,
                    message: format!("no dumped region covers {} bytes here", size),
                })
            }
        }
    }

    fn read_register(&mut self, name: &str) -> Result<u64> {
        self.registers.get(name)
    }
}
