//! DWARF location expression evaluation.
//!
//! A decoded `DW_AT_location` attribute arrives as a sequence of [`Opcode`]
//! records. The [`ExprMachine`] executes them against an architecture
//! profile, a register snapshot, and a target-access capability:
//!
//! ```text
//! [Opcode...] ──► [ExprMachine] ──► LocationResult::{Address, Register, Deferred}
//!                   │        ▲
//!                   ▼        │
//!               EvalStack   TargetAccess (deref reads)
//! ```
//!
//! # Design
//!
//! - **Exhaustive dispatch** — every opcode byte classifies into an
//!   [`OpKind`]; the machine matches all of them, so an unhandled operation
//!   is a compile error, not a runtime surprise.
//! - **Fail closed** — control flow, composite pieces, and the other
//!   operations a live embedded target cannot honor raise an
//!   unimplemented-opcode error instead of guessing.
//! - **Three-valued stack** — integers, register name tokens, and deferred
//!   producers share one [`StackValue`] type, so register locations survive
//!   to the end of evaluation without premature resolution.

pub mod machine;
pub mod opcode;
pub mod stack;

pub use machine::{ExprMachine, LocationResult};
pub use opcode::{format_expression, OpKind, Opcode};
pub use stack::{DeferredFn, EvalStack, StackValue};
