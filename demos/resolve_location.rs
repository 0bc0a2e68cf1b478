//! End-to-end location resolution against a core dump
//!
//! Run with: cargo run --example resolve_location -- [dump.json] [profile]
//!
//! `profile` is a built-in name (`avr`, `cortex-m4`) or a path to a TOML
//! profile; when omitted it is inferred from the dump's instruction set.
//! Without arguments a small built-in AVR image is evaluated.

use anyhow::Context;
use remotedbg_rs::{format_expression, ArchProfile, CoreDump, ExprMachine, Opcode};
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// A u16 counter at the X pointer (r27:r26), a status byte in r24
fn sample_dump() -> CoreDump {
    CoreDump::new("avr")
        .with_region(0x01FE, vec![0x39, 0x30, 0xFF, 0x00])
        .with_register("r24", 0x2A)
        .with_register("r26", 0xFE)
        .with_register("r27", 0x01)
        .with_register("SP", 0x21FF)
        .with_register("PC", 0x0456)
}

/// Expressions a compiler typically emits for MCU variables
fn demo_expressions(arch: &ArchProfile) -> Vec<(&'static str, Vec<Opcode>)> {
    let mut exprs = vec![
        (
            "counter (via X pointer)",
            vec![Opcode::new(gimli::DW_OP_breg26).with_arg(0)],
        ),
        (
            "status (in a register)",
            vec![Opcode::new(gimli::DW_OP_reg24)],
        ),
        (
            "counter, second byte (pointer + 1)",
            vec![
                Opcode::new(gimli::DW_OP_breg26).with_arg(0),
                Opcode::new(gimli::DW_OP_lit1),
                Opcode::new(gimli::DW_OP_plus),
            ],
        ),
    ];
    if !arch.pairs_registers() {
        // Wide-register targets address locals off SP instead of a pair,
        // and their register file stops well short of number 24
        exprs[0].1 = vec![Opcode::new(gimli::DW_OP_bregx).with_arg(13).with_arg(8)];
        exprs[1].1 = vec![Opcode::new(gimli::DW_OP_reg4)];
        exprs[2].1 = vec![
            Opcode::new(gimli::DW_OP_bregx).with_arg(13).with_arg(8),
            Opcode::new(gimli::DW_OP_lit1),
            Opcode::new(gimli::DW_OP_plus),
        ];
    }
    exprs
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,remotedbg_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();

    let mut dump = match args.get(1) {
        Some(path) => CoreDump::load_from_file(path)
            .with_context(|| format!("loading core dump {}", path))?,
        None => {
            tracing::info!("No dump supplied, using the built-in AVR sample image");
            sample_dump()
        }
    };

    let arch = match args.get(2) {
        Some(path) if path.ends_with(".toml") => ArchProfile::load_from_file(path)
            .with_context(|| format!("loading architecture profile {}", path))?,
        Some(name) => ArchProfile::builtin(name)
            .with_context(|| format!("no built-in profile named '{}'", name))?,
        None => ArchProfile::builtin(&dump.instruction_set).with_context(|| {
            format!(
                "dump instruction set '{}' has no built-in profile; pass one explicitly",
                dump.instruction_set
            )
        })?,
    };

    println!(
        "Target: {} ({} registers mapped)",
        arch,
        arch.register_listing().len()
    );
    println!();

    let read_size = arch.address_size;
    let regs = dump.snapshot();

    for (label, expr) in demo_expressions(&arch) {
        println!("{}", label);
        println!("  expression: {}", format_expression(&expr));

        let mut machine = ExprMachine::new(expr, regs.clone(), &arch, &mut dump);
        let location = machine
            .eval()
            .with_context(|| format!("evaluating '{}'", label))?;
        println!("  location:   {}", location);

        // Fresh stack, then materialize through the same machine
        machine.reset(None, None, None);
        let value = machine
            .access(read_size)
            .with_context(|| format!("materializing '{}'", label))?;
        println!("  value:      0x{:x}", value);
        println!();
    }

    Ok(())
}
