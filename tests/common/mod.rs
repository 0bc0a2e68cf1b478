//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use remotedbg_rs::{ArchProfile, CoreDump};

/// AVR dump whose X pointer (r27:r26) points at a little-endian u16 counter
pub fn x_pointer_dump() -> CoreDump {
    CoreDump::new("avr")
        .with_region(0x01FE, vec![0x39, 0x30, 0xFF, 0x00])
        .with_register("r24", 0x2A)
        .with_register("r26", 0xFE)
        .with_register("r27", 0x01)
        .with_register("SP", 0x21FF)
        .with_register("PC", 0x0456)
}

/// Profile whose general registers are as wide as its addresses
pub fn wide_reg_profile() -> ArchProfile {
    let mut profile = ArchProfile::new("msp430", 2, 2).with_general_registers(4);
    for num in 0..4u16 {
        profile = profile.with_register(num, format!("r{}", num));
    }
    profile.with_register(4, "SP").with_register(5, "PC")
}
