//! DWARF location expression opcodes
//!
//! An [`Opcode`] is one already-decoded instruction of a `DW_AT_location`
//! expression: the raw operation byte (kept as a [`gimli::DwOp`] so it
//! carries its standard name) plus its decoded integer operands. Turning
//! raw DWARF bytes into these records happens upstream; this module only
//! classifies them for execution.
//!
//! [`OpKind::classify`] covers the full opcode byte range. The three
//! 32-member families are not enumerated: a literal, register, or
//! base-register opcode is recognized by range and its index recovered by
//! subtracting the family's base value (`DW_OP_lit0`, `DW_OP_reg0`,
//! `DW_OP_breg0`), exactly as the DWARF2 numbering defines them. Every
//! byte outside the handled set classifies as [`OpKind::Unsupported`], which
//! the machine turns into a fatal unimplemented-opcode error carrying the
//! opcode's name and arguments.

use crate::error::{RemoteDbgError, Result};
use gimli::DwOp;

/// One decoded instruction of a location expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode {
    /// The operation byte
    pub op: DwOp,
    /// Decoded integer operands, in encoding order
    pub args: Vec<i64>,
}

impl Opcode {
    /// Create an opcode with no operands
    pub fn new(op: DwOp) -> Self {
        Self {
            op,
            args: Vec::new(),
        }
    }

    /// Append one decoded operand
    pub fn with_arg(mut self, value: i64) -> Self {
        self.args.push(value);
        self
    }

    /// The raw operation byte
    pub fn code(&self) -> u8 {
        self.op.0
    }

    /// Standard name of this opcode (e.g. `DW_OP_breg26`)
    pub fn name(&self) -> String {
        match self.op.static_string() {
            Some(name) => name.to_string(),
            None => format!("DW_OP_unknown_0x{:02x}", self.op.0),
        }
    }

    /// Operand at `index`, or a malformed-expression error if absent
    ///
    /// The upstream decoder guarantees operands for well-formed input, so a
    /// miss here means the expression record itself is broken.
    pub fn arg(&self, index: usize) -> Result<i64> {
        self.args.get(index).copied().ok_or_else(|| {
            RemoteDbgError::MalformedResult(format!(
                "{} is missing operand {}",
                self.name(),
                index
            ))
        })
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.name())
        } else {
            write!(f, "{} {:?}", self.name(), self.args)
        }
    }
}

/// Render a whole expression for logs and error context
pub fn format_expression(opcodes: &[Opcode]) -> String {
    opcodes
        .iter()
        .map(|op| op.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Execution class of an opcode byte
///
/// The index payload of [`OpKind::Lit`], [`OpKind::Reg`], and
/// [`OpKind::Breg`] is the offset from the family base opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Push a literal machine address (operand)
    Addr,
    /// Push a constant operand (all const1u..consts widths)
    Const,
    /// Push the literal 0..=31 encoded in the opcode itself
    Lit(u8),
    /// Duplicate the top entry
    Dup,
    /// Discard the top entry
    Drop,
    /// Push a copy of the second entry
    Over,
    /// Push a copy of the entry at operand depth
    Pick,
    /// Exchange the top two entries
    Swap,
    /// Rotate the top three entries
    Rot,
    /// Pop an address, read address-width bytes there
    Deref,
    /// Pop an address, read operand-width bytes there
    DerefSize,
    /// Extended-space deref, operand-width bytes
    Xderef,
    /// Extended-space deref, operand-width bytes
    XderefSize,
    /// Unary absolute value
    Abs,
    /// Unary two's-complement negation
    Neg,
    /// Unary bitwise negation
    Not,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise exclusive or
    Xor,
    /// Signed division
    Div,
    /// Signed remainder
    Mod,
    /// Subtraction
    Minus,
    /// Multiplication
    Mul,
    /// Addition
    Plus,
    /// Pop a base, add the unsigned constant operand
    PlusUconst,
    /// Shift left
    Shl,
    /// Logical shift right over the address width
    Shr,
    /// Arithmetic shift right
    Shra,
    /// Comparison, pushes 1 or 0
    Eq,
    /// Comparison, pushes 1 or 0
    Ge,
    /// Comparison, pushes 1 or 0
    Gt,
    /// Comparison, pushes 1 or 0
    Le,
    /// Comparison, pushes 1 or 0
    Lt,
    /// Comparison, pushes 1 or 0
    Ne,
    /// Push the name of general register 0..=31
    Reg(u16),
    /// Push the name of the register in the operand
    Regx,
    /// Push general register 0..=31's value plus the operand offset
    Breg(u16),
    /// Push the operand register's value plus the second operand offset
    Bregx,
    /// Does nothing
    Nop,
    /// Recognized by the standard but fatal to evaluate
    Unsupported,
}

impl OpKind {
    /// Classify an opcode byte
    pub fn classify(op: DwOp) -> OpKind {
        match op {
            gimli::DW_OP_addr => OpKind::Addr,
            gimli::DW_OP_deref => OpKind::Deref,
            gimli::DW_OP_const1u
            | gimli::DW_OP_const1s
            | gimli::DW_OP_const2u
            | gimli::DW_OP_const2s
            | gimli::DW_OP_const4u
            | gimli::DW_OP_const4s
            | gimli::DW_OP_const8u
            | gimli::DW_OP_const8s
            | gimli::DW_OP_constu
            | gimli::DW_OP_consts => OpKind::Const,
            gimli::DW_OP_dup => OpKind::Dup,
            gimli::DW_OP_drop => OpKind::Drop,
            gimli::DW_OP_over => OpKind::Over,
            gimli::DW_OP_pick => OpKind::Pick,
            gimli::DW_OP_swap => OpKind::Swap,
            gimli::DW_OP_rot => OpKind::Rot,
            gimli::DW_OP_xderef => OpKind::Xderef,
            gimli::DW_OP_abs => OpKind::Abs,
            gimli::DW_OP_and => OpKind::And,
            gimli::DW_OP_div => OpKind::Div,
            gimli::DW_OP_minus => OpKind::Minus,
            gimli::DW_OP_mod => OpKind::Mod,
            gimli::DW_OP_mul => OpKind::Mul,
            gimli::DW_OP_neg => OpKind::Neg,
            gimli::DW_OP_not => OpKind::Not,
            gimli::DW_OP_or => OpKind::Or,
            gimli::DW_OP_plus => OpKind::Plus,
            gimli::DW_OP_plus_uconst => OpKind::PlusUconst,
            gimli::DW_OP_shl => OpKind::Shl,
            gimli::DW_OP_shr => OpKind::Shr,
            gimli::DW_OP_shra => OpKind::Shra,
            gimli::DW_OP_xor => OpKind::Xor,
            gimli::DW_OP_eq => OpKind::Eq,
            gimli::DW_OP_ge => OpKind::Ge,
            gimli::DW_OP_gt => OpKind::Gt,
            gimli::DW_OP_le => OpKind::Le,
            gimli::DW_OP_lt => OpKind::Lt,
            gimli::DW_OP_ne => OpKind::Ne,
            gimli::DW_OP_regx => OpKind::Regx,
            gimli::DW_OP_bregx => OpKind::Bregx,
            gimli::DW_OP_deref_size => OpKind::DerefSize,
            gimli::DW_OP_xderef_size => OpKind::XderefSize,
            gimli::DW_OP_nop => OpKind::Nop,
            // The three 32-member families, derived from their base values
            op if (gimli::DW_OP_lit0.0..=gimli::DW_OP_lit31.0).contains(&op.0) => {
                OpKind::Lit(op.0 - gimli::DW_OP_lit0.0)
            }
            op if (gimli::DW_OP_reg0.0..=gimli::DW_OP_reg31.0).contains(&op.0) => {
                OpKind::Reg((op.0 - gimli::DW_OP_reg0.0) as u16)
            }
            op if (gimli::DW_OP_breg0.0..=gimli::DW_OP_breg31.0).contains(&op.0) => {
                OpKind::Breg((op.0 - gimli::DW_OP_breg0.0) as u16)
            }
            // Branches: the decoder erases the byte offsets a jump would need
            gimli::DW_OP_skip | gimli::DW_OP_bra => OpKind::Unsupported,
            // Composite assembly: concatenation semantics unresolved, never guessed
            gimli::DW_OP_piece | gimli::DW_OP_bit_piece => OpKind::Unsupported,
            // Needs the enclosing function's DW_AT_frame_base, not supplied here
            gimli::DW_OP_fbreg => OpKind::Unsupported,
            gimli::DW_OP_push_object_address
            | gimli::DW_OP_call2
            | gimli::DW_OP_call4
            | gimli::DW_OP_call_ref
            | gimli::DW_OP_form_tls_address
            | gimli::DW_OP_call_frame_cfa
            | gimli::DW_OP_implicit_value
            | gimli::DW_OP_stack_value
            | gimli::DW_OP_implicit_pointer
            | gimli::DW_OP_addrx
            | gimli::DW_OP_constx
            | gimli::DW_OP_entry_value
            | gimli::DW_OP_const_type
            | gimli::DW_OP_regval_type
            | gimli::DW_OP_deref_type
            | gimli::DW_OP_xderef_type
            | gimli::DW_OP_convert
            | gimli::DW_OP_reinterpret => OpKind::Unsupported,
            gimli::DW_OP_GNU_push_tls_address
            | gimli::DW_OP_GNU_implicit_pointer
            | gimli::DW_OP_GNU_entry_value
            | gimli::DW_OP_GNU_const_type
            | gimli::DW_OP_GNU_regval_type
            | gimli::DW_OP_GNU_deref_type
            | gimli::DW_OP_GNU_convert
            | gimli::DW_OP_GNU_parameter_ref => OpKind::Unsupported,
            _ => OpKind::Unsupported,
        }
    }
}
