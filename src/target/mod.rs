//! Target access for expression evaluation
//!
//! The expression machine never talks to hardware directly. It consumes a
//! [`TargetAccess`] capability ("read N bytes at address A", "read register
//! R") plus a [`RegisterSnapshot`] captured when the target halted. Whether
//! the capability is backed by a live serial debug link or a saved core dump
//! is invisible to the machine; [`dump::CoreDump`] is the offline backend
//! shipped with this crate.

pub mod dump;

pub use dump::{CoreDump, MemoryRegion};

use crate::arch::ArchProfile;
use crate::error::{RemoteDbgError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unified interface for reading target state
///
/// Implementations serve a single blocking request per call; the machine
/// performs no retry, batching, or caching on top of this. Bounding latency
/// or failure of the underlying transport is the implementation's job.
///
/// # Example
///
/// ```ignore
/// fn peek_u16(target: &mut dyn TargetAccess, address: u64) -> Result<u16> {
///     let bytes = target.read_memory(address, 2)?;
///     Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait TargetAccess: Send {
    /// Read raw memory from the target
    ///
    /// # Arguments
    /// * `address` - Memory address to read from
    /// * `size` - Number of bytes to read
    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Read the current value of a machine register by name
    fn read_register(&mut self, name: &str) -> Result<u64>;
}

/// Register values captured at a halt, keyed by machine register name
///
/// This is the snapshot the machine resolves register tokens against; it is
/// instance-local mutable state with no internal synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSnapshot {
    values: BTreeMap<String, u64>,
}

impl RegisterSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one register value
    pub fn with_register(mut self, name: impl Into<String>, value: u64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Set or overwrite one register value
    pub fn set(&mut self, name: impl Into<String>, value: u64) {
        self.values.insert(name.into(), value);
    }

    /// Value of a register, or `UnknownRegister` if the snapshot lacks it
    pub fn get(&self, name: &str) -> Result<u64> {
        self.values.get(name).copied().ok_or_else(|| {
            RemoteDbgError::UnknownRegister(format!("register '{}' missing from snapshot", name))
        })
    }

    /// Value of a register, if present
    pub fn try_get(&self, name: &str) -> Option<u64> {
        self.values.get(name).copied()
    }

    /// Overlay fresh values on this snapshot, keeping registers `other` lacks
    pub fn merge(&mut self, other: &RegisterSnapshot) {
        for (name, value) in other.iter() {
            self.values.insert(name.to_string(), value);
        }
    }

    /// Number of captured registers
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no registers were captured
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (name, value) pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Rebuild a snapshot from a register-listing reply
    ///
    /// The debug link reports registers one hex word per line, ordered the
    /// way the profile lists them (general registers first, then SP, PC,
    /// ...). An optional `0x` prefix per line is accepted. The line count
    /// must match the profile's listing exactly; a short or long reply means
    /// the link and the profile disagree about the target.
    pub fn parse_hex_lines(
        profile: &ArchProfile,
        lines: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let listing = profile.register_listing();
        let mut snapshot = RegisterSnapshot::new();
        let mut count = 0usize;

        for (idx, line) in lines.into_iter().enumerate() {
            let text = line.as_ref().trim();
            if text.is_empty() {
                continue;
            }
            let name = listing.get(count).copied().ok_or_else(|| {
                RemoteDbgError::Config(format!(
                    "register listing reply has more than {} lines for {}",
                    listing.len(),
                    profile.instruction_set
                ))
            })?;
            let digits = text.strip_prefix("0x").unwrap_or(text);
            let value = u64::from_str_radix(digits, 16).map_err(|_| {
                RemoteDbgError::Config(format!(
                    "register listing line {} is not a hex value: '{}'",
                    idx, text
                ))
            })?;
            snapshot.set(name, value);
            count += 1;
        }

        if count != listing.len() {
            return Err(RemoteDbgError::Config(format!(
                "register listing reply has {} values, {} profile expects {}",
                count,
                profile.instruction_set,
                listing.len()
            )));
        }

        tracing::debug!(
            "Parsed {} register values for {}",
            count,
            profile.instruction_set
        );
        Ok(snapshot)
    }
}

impl FromIterator<(String, u64)> for RegisterSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
