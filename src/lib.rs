//! # RemoteDbg-RS: DWARF Location Resolution for Remote Targets
//!
//! A library for resolving DWARF location expressions against remote embedded
//! targets. Given a decoded `DW_AT_location` expression, a register snapshot,
//! and an architecture profile, the expression machine computes where a
//! variable currently lives: a memory address, a machine register, or a
//! deferred producer.
//!
//! ## Architecture
//!
//! - **Expr**: Stack machine executing decoded DWARF opcodes ([`ExprMachine`])
//! - **Arch**: Immutable per-target numeric profile (address width, word width,
//!   DWARF register numbering) loaded from built-ins or TOML
//! - **Target**: The `TargetAccess` capability for memory and register reads,
//!   with a JSON core-dump implementation for offline work
//! - **Error**: One `thiserror` taxonomy shared across the crate, with fatal
//!   evaluation errors distinguished from forwarded target I/O failures
//!
//! ## Example
//!
//! ```ignore
//! use remotedbg_rs::{ArchProfile, CoreDump, ExprMachine, Opcode, RegisterSnapshot};
//!
//! fn main() -> remotedbg_rs::Result<()> {
//!     let arch = ArchProfile::avr();
//!     let mut dump = CoreDump::load_from_file("target.dump.json")?;
//!
//!     // DW_OP_breg26 0: the address held in the X pointer (r27:r26)
//!     let expr = vec![Opcode::new(gimli::DW_OP_breg26).with_arg(0)];
//!     let regs = dump.snapshot();
//!
//!     let mut machine = ExprMachine::new(expr, regs, &arch, &mut dump);
//!     let location = machine.eval()?;
//!     println!("variable lives at {}", location);
//!     Ok(())
//! }
//! ```

pub mod arch;
pub mod error;
pub mod expr;
pub mod target;

// Re-export commonly used types
pub use arch::ArchProfile;
pub use error::{RemoteDbgError, Result, ResultExt};
pub use expr::{
    format_expression, DeferredFn, EvalStack, ExprMachine, LocationResult, OpKind, Opcode,
    StackValue,
};
pub use target::{CoreDump, MemoryRegion, RegisterSnapshot, TargetAccess};
