//! Built-in architecture profiles and TOML persistence
//!
//! Ships the two target families the debugger supports out of the box
//! (ATmega32u4-class AVR and SAMD51-class Cortex-M4) and loads custom
//! profiles from TOML files for everything else.
//!
//! A profile file looks like:
//!
//! ```toml
//! instruction_set = "avr"
//! address_size = 2
//! word_size = 1
//! register_size = 1
//! general_registers = 32
//!
//! [register_map]
//! 0 = "r0"
//! 1 = "r1"
//! 32 = "SP"
//! 33 = "PC"
//! ```

use super::ArchProfile;
use crate::error::{RemoteDbgError, Result};
use std::path::Path;

impl ArchProfile {
    /// AVR profile (ATmega32u4 class)
    ///
    /// 32 one-byte general registers against two-byte data addresses, so
    /// base-register lookups read an adjacent register pair. DWARF numbers
    /// the general file 0..=31, then SP and PC.
    pub fn avr() -> Self {
        let mut profile = ArchProfile::new("avr", 2, 1)
            .with_register_size(1)
            .with_general_registers(32);
        for num in 0..32u16 {
            profile = profile.with_register(num, format!("r{}", num));
        }
        profile.with_register(32, "SP").with_register(33, "PC")
    }

    /// Cortex-M4 profile (SAMD51 class)
    ///
    /// DWARF numbers r0..r12, then SP (13), LR (14), PC (15). Registers are
    /// address-width, so no pairing applies.
    pub fn cortex_m4() -> Self {
        let mut profile = ArchProfile::new("armv7e-m", 4, 4)
            .with_register_size(4)
            .with_general_registers(13);
        for num in 0..13u16 {
            profile = profile.with_register(num, format!("r{}", num));
        }
        profile
            .with_register(13, "SP")
            .with_register(14, "LR")
            .with_register(15, "PC")
    }

    /// Look up a built-in profile by instruction set name
    pub fn builtin(instruction_set: &str) -> Option<Self> {
        match instruction_set {
            "avr" => Some(Self::avr()),
            "armv7e-m" | "cortex-m4" => Some(Self::cortex_m4()),
            _ => None,
        }
    }

    /// Parse a profile from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let profile: ArchProfile = toml::from_str(text)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Serialize this profile to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load and validate a profile from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RemoteDbgError::Config(format!("Failed to read profile file {:?}: {}", path, e))
        })?;
        let profile = Self::from_toml_str(&content)
            .map_err(|e| e.with_context(format!("Failed to parse profile file {:?}", path)))?;
        tracing::info!("Loaded {} profile from {:?}", profile.instruction_set, path);
        Ok(profile)
    }

    /// Save this profile to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| {
            RemoteDbgError::Config(format!("Failed to write profile file {:?}: {}", path, e))
        })
    }
}
