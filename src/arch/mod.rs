//! Architecture binding for location expression evaluation
//!
//! An [`ArchProfile`] describes everything the expression machine needs to
//! know about the target CPU: how DWARF register numbers translate to
//! machine register names, how wide an address is, and how wide the general
//! registers are. Profiles are bound once per debug session and treated as
//! read-only by every machine that references them; two machines evaluating
//! different expressions may share one profile.
//!
//! # Main Types
//!
//! - [`ArchProfile`] - Immutable per-session architecture description
//!
//! Built-in profiles for the supported targets live in [`profiles`] along
//! with TOML load/save support for custom targets.
//!
//! # The narrow-register rule
//!
//! On parts whose general registers are narrower than an address (AVR: 8-bit
//! registers, 16-bit data addresses), a base-register lookup cannot use one
//! register alone. The profile knows this and exposes
//! [`ArchProfile::pairs_registers`] plus [`ArchProfile::combine_pair`], which
//! joins a register with its successor, successor as the high part:
//! `r27:r26 = 0x12:0x34` resolves to address `0x1234`.

pub mod profiles;

use crate::error::{RemoteDbgError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable description of the target architecture
///
/// Must be fully populated before any evaluation; [`ArchProfile::validate`]
/// treats a missing field as a fatal configuration error, never a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchProfile {
    /// Instruction set identifier (e.g. "avr", "armv7e-m")
    pub instruction_set: String,

    /// Width of a data address in bytes
    pub address_size: usize,

    /// Width of one stack word in bytes (push/pop granularity of the target)
    pub word_size: usize,

    /// Width of a general-purpose register in bytes
    #[serde(default)]
    pub register_size: usize,

    /// Number of general-purpose registers, mapped from DWARF number 0 upward
    #[serde(default)]
    pub general_registers: u16,

    /// DWARF register number to machine register name
    ///
    /// Kept last so the serialized TOML emits scalar keys before the table.
    #[serde(with = "regnum_keys")]
    pub register_map: BTreeMap<u16, String>,
}

impl ArchProfile {
    /// Create a profile with an empty register map
    ///
    /// Register mappings are added with [`ArchProfile::with_register`]; the
    /// profile does not validate until [`ArchProfile::validate`] runs.
    pub fn new(instruction_set: impl Into<String>, address_size: usize, word_size: usize) -> Self {
        Self {
            instruction_set: instruction_set.into(),
            register_map: BTreeMap::new(),
            address_size,
            word_size,
            register_size: word_size,
            general_registers: 0,
        }
    }

    /// Map one DWARF register number to a machine register name
    pub fn with_register(mut self, dwarf_num: u16, name: impl Into<String>) -> Self {
        self.register_map.insert(dwarf_num, name.into());
        self
    }

    /// Set the general-purpose register width in bytes
    pub fn with_register_size(mut self, register_size: usize) -> Self {
        self.register_size = register_size;
        self
    }

    /// Set the number of general-purpose registers
    pub fn with_general_registers(mut self, count: u16) -> Self {
        self.general_registers = count;
        self
    }

    /// Check that every field the machine relies on is populated
    ///
    /// Runs at the start of every `eval`; an incomplete profile is a
    /// configuration error, not a silent default.
    pub fn validate(&self) -> Result<()> {
        if self.instruction_set.is_empty() {
            return Err(RemoteDbgError::UnboundArchitecture(
                "instruction set is empty".to_string(),
            ));
        }
        if self.register_map.is_empty() {
            return Err(RemoteDbgError::UnboundArchitecture(format!(
                "register map for {} is empty",
                self.instruction_set
            )));
        }
        if self.address_size == 0 || self.address_size > 8 {
            return Err(RemoteDbgError::UnboundArchitecture(format!(
                "address size {} bytes is outside 1..=8",
                self.address_size
            )));
        }
        if self.word_size == 0 {
            return Err(RemoteDbgError::UnboundArchitecture(
                "word size is zero".to_string(),
            ));
        }
        if self.register_size == 0 || self.register_size > self.address_size {
            return Err(RemoteDbgError::UnboundArchitecture(format!(
                "register size {} bytes does not fit address size {}",
                self.register_size, self.address_size
            )));
        }
        Ok(())
    }

    /// Resolve a DWARF register number to its machine register name
    pub fn register_name(&self, dwarf_num: u16) -> Result<&str> {
        self.register_map
            .get(&dwarf_num)
            .map(String::as_str)
            .ok_or_else(|| {
                RemoteDbgError::UnknownRegister(format!(
                    "DWARF register {} has no entry in the {} register map",
                    dwarf_num, self.instruction_set
                ))
            })
    }

    /// Address width in bits
    pub fn address_bits(&self) -> u32 {
        (self.address_size * 8) as u32
    }

    /// Mask covering exactly the address width
    pub fn address_mask(&self) -> u64 {
        if self.address_bits() >= 64 {
            u64::MAX
        } else {
            (1u64 << self.address_bits()) - 1
        }
    }

    /// True when general registers are narrower than an address
    ///
    /// Base-register lookups must then read a register pair instead of a
    /// single register.
    pub fn pairs_registers(&self) -> bool {
        self.register_size < self.address_size
    }

    /// True when the DWARF number falls inside the general register file
    pub fn is_general_register(&self, dwarf_num: u16) -> bool {
        dwarf_num < self.general_registers
    }

    /// Join a register pair into one address, successor register as high part
    pub fn combine_pair(&self, low: u64, high: u64) -> u64 {
        let bits = (self.register_size * 8) as u32;
        let mask = if bits >= 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        };
        ((high & mask) << bits) | (low & mask)
    }

    /// Machine register names in DWARF-number order
    ///
    /// This is the order a register-listing reply from the debug link uses:
    /// general registers first, then the named specials (SP, PC, ...).
    pub fn register_listing(&self) -> Vec<&str> {
        self.register_map.values().map(String::as_str).collect()
    }
}

impl std::fmt::Display for ArchProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}-bit addresses, {} mapped registers)",
            self.instruction_set,
            self.address_bits(),
            self.register_map.len()
        )
    }
}

/// Serialize the register map with string keys so profiles stay valid TOML
mod regnum_keys {
    use serde::de::Error;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(
        map: &BTreeMap<u16, String>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (num, name) in map {
            out.serialize_entry(&num.to_string(), name)?;
        }
        out.end()
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> std::result::Result<BTreeMap<u16, String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut map = BTreeMap::new();
        for (key, name) in raw {
            let num = key
                .parse::<u16>()
                .map_err(|_| D::Error::custom(format!("invalid DWARF register number: {}", key)))?;
            map.insert(num, name);
        }
        Ok(map)
    }
}
