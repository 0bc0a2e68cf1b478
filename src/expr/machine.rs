//! The location expression machine
//!
//! [`ExprMachine`] executes one decoded `DW_AT_location` expression against
//! a register snapshot and a target-access capability, producing the
//! [`LocationResult`] that tells the debugger where a variable lives right
//! now: a memory address, a machine register, or a deferred producer.
//!
//! Execution is synchronous and strictly sequential: each opcode mutates
//! the machine's own stack, and opcodes that touch the target issue exactly
//! one blocking read through the capability. A machine evaluates one
//! expression at a time; reuse goes through [`ExprMachine::reset`], and
//! concurrent evaluation takes separate machines (which may share one
//! [`ArchProfile`]).
//!
//! Every opcode the machine does not implement fails the evaluation with an
//! unimplemented-opcode error naming the operation, never a silent no-op.

use crate::arch::ArchProfile;
use crate::error::{RemoteDbgError, Result};
use crate::expr::opcode::{format_expression, OpKind, Opcode};
use crate::expr::stack::{DeferredFn, EvalStack, StackValue};
use crate::target::{RegisterSnapshot, TargetAccess};

/// Where the evaluated expression says the value lives
#[derive(Clone)]
pub enum LocationResult {
    /// A memory address to dereference
    Address(u64),
    /// The value sits directly in this machine register
    Register(String),
    /// The value materializes by invoking this producer
    Deferred(DeferredFn),
}

impl LocationResult {
    /// The address, if this is a memory location
    pub fn as_address(&self) -> Option<u64> {
        match self {
            LocationResult::Address(address) => Some(*address),
            _ => None,
        }
    }

    /// The register name, if the value lives in a register
    pub fn as_register(&self) -> Option<&str> {
        match self {
            LocationResult::Register(name) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Debug for LocationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationResult::Address(address) => write!(f, "Address(0x{:x})", address),
            LocationResult::Register(name) => write!(f, "Register({:?})", name),
            LocationResult::Deferred(_) => write!(f, "Deferred(..)"),
        }
    }
}

impl std::fmt::Display for LocationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationResult::Address(address) => write!(f, "address 0x{:x}", address),
            LocationResult::Register(name) => write!(f, "register {}", name),
            LocationResult::Deferred(_) => write!(f, "<deferred value>"),
        }
    }
}

impl PartialEq for LocationResult {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LocationResult::Address(a), LocationResult::Address(b)) => a == b,
            (LocationResult::Register(a), LocationResult::Register(b)) => a == b,
            (LocationResult::Deferred(a), LocationResult::Deferred(b)) => {
                std::rc::Rc::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}

/// Stack machine for one location expression
///
/// Holds the expression, the register snapshot it resolves against, its own
/// evaluation stack, and borrows of the immutable architecture profile and
/// the target-access capability. Instance state is not synchronized; one
/// machine must not be driven from two threads.
pub struct ExprMachine<'a> {
    opcodes: Vec<Opcode>,
    regs: RegisterSnapshot,
    stack: EvalStack,
    arch: &'a ArchProfile,
    target: &'a mut dyn TargetAccess,
}

impl<'a> ExprMachine<'a> {
    /// Create a machine over an expression, ready to evaluate
    pub fn new(
        opcodes: Vec<Opcode>,
        regs: RegisterSnapshot,
        arch: &'a ArchProfile,
        target: &'a mut dyn TargetAccess,
    ) -> Self {
        Self {
            opcodes,
            regs,
            stack: EvalStack::new(),
            arch,
            target,
        }
    }

    /// Seed the evaluation stack (bottom-to-top) before the first opcode runs
    pub fn with_stack(mut self, values: Vec<StackValue>) -> Self {
        self.stack = EvalStack::from_values(values);
        self
    }

    /// The expression this machine executes
    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    /// The register snapshot register tokens resolve against
    pub fn registers(&self) -> &RegisterSnapshot {
        &self.regs
    }

    /// Current evaluation stack
    pub fn stack(&self) -> &EvalStack {
        &self.stack
    }

    // ==================== Lifecycle ====================

    /// Execute every opcode, then read the top of stack as a location
    ///
    /// The result stays on the stack (it is peeked, not popped); a fresh
    /// evaluation wants [`ExprMachine::reset`] first. Finishing with an
    /// empty stack is a fatal error: callers always expect a location.
    pub fn eval(&mut self) -> Result<LocationResult> {
        self.arch.validate()?;
        tracing::trace!(
            "Evaluating expression: {}",
            format_expression(&self.opcodes)
        );

        for idx in 0..self.opcodes.len() {
            let op = self.opcodes[idx].clone();
            self.step(&op)?;
        }

        let result = match self.stack.top() {
            Some(StackValue::Integer(value)) => LocationResult::Address(*value as u64),
            Some(StackValue::RegisterRef(name)) => LocationResult::Register(name.clone()),
            Some(StackValue::Deferred(producer)) => LocationResult::Deferred(producer.clone()),
            None => {
                return Err(RemoteDbgError::MalformedResult(
                    "expression finished with an empty stack".to_string(),
                ))
            }
        };
        tracing::debug!("Resolved location: {}", result);
        Ok(result)
    }

    /// Evaluate, then materialize a `size`-byte value from the location
    ///
    /// Memory locations are read through the target capability, register
    /// locations come from the snapshot, deferred locations invoke their
    /// producer.
    pub fn access(&mut self, size: usize) -> Result<u64> {
        match self.eval()? {
            LocationResult::Address(address) => {
                let value = self.read_target(address, size)?;
                tracing::debug!("Read {} bytes at 0x{:x}: 0x{:x}", size, address, value);
                Ok(value)
            }
            LocationResult::Register(name) => self.regs.get(&name),
            LocationResult::Deferred(producer) => (*producer)(),
        }
    }

    /// Prepare the machine for another evaluation
    ///
    /// Omitted registers or opcodes keep their current value. The stack is
    /// different: omitting it clears it, so the prior run's result cannot
    /// leak into the next evaluation as a stale address.
    pub fn reset(
        &mut self,
        new_regs: Option<RegisterSnapshot>,
        new_opcodes: Option<Vec<Opcode>>,
        new_stack: Option<Vec<StackValue>>,
    ) {
        if let Some(regs) = new_regs {
            self.regs = regs;
        }
        if let Some(opcodes) = new_opcodes {
            self.opcodes = opcodes;
        }
        self.stack = match new_stack {
            Some(values) => EvalStack::from_values(values),
            None => EvalStack::new(),
        };
    }

    // ==================== Opcode Handlers ====================

    /// Execute one opcode against the stack
    fn step(&mut self, op: &Opcode) -> Result<()> {
        let name = op.name();
        tracing::trace!("Executing {} (stack depth {})", op, self.stack.len());

        match OpKind::classify(op.op) {
            OpKind::Addr | OpKind::Const => {
                let value = op.arg(0)?;
                self.stack.push_int(value);
            }
            OpKind::Lit(index) => self.stack.push_int(index as i64),

            OpKind::Dup => self.stack.dup(&name)?,
            OpKind::Drop => self.stack.drop_top(&name)?,
            OpKind::Over => self.stack.over(&name)?,
            OpKind::Pick => {
                let depth = self.depth_arg(op)?;
                self.stack.pick(depth, &name)?;
            }
            OpKind::Swap => self.stack.swap(&name)?,
            OpKind::Rot => self.stack.rot(&name)?,

            OpKind::Deref => {
                let size = self.arch.address_size;
                self.deref_read(&name, size)?;
            }
            OpKind::DerefSize | OpKind::Xderef | OpKind::XderefSize => {
                let size = self.size_arg(op)?;
                self.deref_read(&name, size)?;
            }

            OpKind::Abs => self.unary_op(&name, i64::wrapping_abs)?,
            OpKind::Neg => self.unary_op(&name, i64::wrapping_neg)?,
            OpKind::Not => self.unary_op(&name, |v| !v)?,

            OpKind::And => self.binary_op(&name, |snd, fst| Ok(snd & fst))?,
            OpKind::Or => self.binary_op(&name, |snd, fst| Ok(snd | fst))?,
            OpKind::Xor => self.binary_op(&name, |snd, fst| Ok(snd ^ fst))?,
            OpKind::Plus => self.binary_op(&name, |snd, fst| Ok(snd.wrapping_add(fst)))?,
            OpKind::Minus => self.binary_op(&name, |snd, fst| Ok(snd.wrapping_sub(fst)))?,
            OpKind::Mul => self.binary_op(&name, |snd, fst| Ok(snd.wrapping_mul(fst)))?,
            OpKind::Div => {
                let op_name = name.clone();
                self.binary_op(&name, move |snd, fst| {
                    if fst == 0 {
                        Err(RemoteDbgError::DivisionByZero { op: op_name })
                    } else {
                        Ok(snd.wrapping_div(fst))
                    }
                })?
            }
            OpKind::Mod => {
                let op_name = name.clone();
                self.binary_op(&name, move |snd, fst| {
                    if fst == 0 {
                        Err(RemoteDbgError::DivisionByZero { op: op_name })
                    } else {
                        Ok(snd.wrapping_rem(fst))
                    }
                })?
            }

            OpKind::PlusUconst => {
                let addend = op.arg(0)?;
                let base = self.stack.pop_int(&name)?;
                self.stack.push_int(base.wrapping_add(addend));
            }

            OpKind::Shl => self.binary_op(&name, |snd, fst| {
                Ok(match u32::try_from(fst) {
                    Ok(count) if count < 64 => ((snd as u64) << count) as i64,
                    _ => 0,
                })
            })?,
            OpKind::Shr => {
                // Logical shift: the value is unsigned over the address width
                let mask = self.arch.address_mask();
                self.binary_op(&name, move |snd, fst| {
                    Ok(match u32::try_from(fst) {
                        Ok(count) if count < 64 => (((snd as u64) & mask) >> count) as i64,
                        _ => 0,
                    })
                })?
            }
            OpKind::Shra => self.binary_op(&name, |snd, fst| {
                Ok(match u32::try_from(fst) {
                    Ok(count) if count < 64 => snd >> count,
                    _ if snd < 0 => -1,
                    _ => 0,
                })
            })?,

            OpKind::Eq => self.compare_op(&name, |snd, fst| snd == fst)?,
            OpKind::Ne => self.compare_op(&name, |snd, fst| snd != fst)?,
            OpKind::Lt => self.compare_op(&name, |snd, fst| snd < fst)?,
            OpKind::Le => self.compare_op(&name, |snd, fst| snd <= fst)?,
            OpKind::Gt => self.compare_op(&name, |snd, fst| snd > fst)?,
            OpKind::Ge => self.compare_op(&name, |snd, fst| snd >= fst)?,

            OpKind::Reg(index) => self.push_register_name(index)?,
            OpKind::Regx => {
                let number = Self::dwarf_regnum(op.arg(0)?)?;
                self.push_register_name(number)?;
            }
            OpKind::Breg(index) => {
                let offset = op.args.first().copied().unwrap_or(0);
                self.breg_lookup(index, offset)?;
            }
            OpKind::Bregx => {
                let number = Self::dwarf_regnum(op.arg(0)?)?;
                let offset = op.args.get(1).copied().unwrap_or(0);
                self.breg_lookup(number, offset)?;
            }

            OpKind::Nop => {}

            OpKind::Unsupported => {
                return Err(RemoteDbgError::UnimplementedOpcode {
                    op: name,
                    args: op.args.clone(),
                })
            }
        }
        Ok(())
    }

    /// Pop two integers and push `snd OP fst`
    ///
    /// fst is the first pop (was the top), snd the second; computing
    /// `snd OP fst` preserves the left-to-right order of the source
    /// expression: `push A; push B; minus` yields `A - B`.
    fn binary_op(&mut self, name: &str, f: impl FnOnce(i64, i64) -> Result<i64>) -> Result<()> {
        let fst = self.stack.pop_int(name)?;
        let snd = self.stack.pop_int(name)?;
        self.stack.push_int(f(snd, fst)?);
        Ok(())
    }

    /// Pop one integer, push the mapped value
    fn unary_op(&mut self, name: &str, f: impl FnOnce(i64) -> i64) -> Result<()> {
        let value = self.stack.pop_int(name)?;
        self.stack.push_int(f(value));
        Ok(())
    }

    /// Pop two integers and push 1 or 0 for `snd CMP fst`
    fn compare_op(&mut self, name: &str, f: impl FnOnce(i64, i64) -> bool) -> Result<()> {
        let fst = self.stack.pop_int(name)?;
        let snd = self.stack.pop_int(name)?;
        self.stack.push_int(f(snd, fst) as i64);
        Ok(())
    }

    /// Pop an address and push `size` bytes read from the target
    fn deref_read(&mut self, name: &str, size: usize) -> Result<()> {
        let address = self.stack.pop_int(name)? as u64;
        let value = self.read_target(address, size)?;
        self.stack.push_int(value as i64);
        Ok(())
    }

    /// One blocking little-endian read through the target capability
    fn read_target(&mut self, address: u64, size: usize) -> Result<u64> {
        if size == 0 || size > 8 {
            return Err(RemoteDbgError::MalformedResult(format!(
                "read size {} bytes is outside 1..=8",
                size
            )));
        }
        let bytes = self.target.read_memory(address, size)?;
        if bytes.len() < size {
            return Err(RemoteDbgError::TargetAccess {
                address,
                message: format!("short read: got {} of {} bytes", bytes.len(), size),
            });
        }
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&bytes[..size]);
        Ok(u64::from_le_bytes(buf))
    }

    /// Push the name token for a DWARF register number
    ///
    /// Resolution to a value is deferred until `access` consumes the result.
    fn push_register_name(&mut self, dwarf_num: u16) -> Result<()> {
        let reg = self.arch.register_name(dwarf_num)?.to_string();
        tracing::debug!("Register token r{} -> {}", dwarf_num, reg);
        self.stack.push(StackValue::RegisterRef(reg));
        Ok(())
    }

    /// Push a register's value plus offset as a base address
    ///
    /// On profiles whose general registers are narrower than an address,
    /// the register joins its successor (successor holds the high part)
    /// before the offset applies.
    fn breg_lookup(&mut self, dwarf_num: u16, offset: i64) -> Result<()> {
        let base = if self.arch.pairs_registers() && self.arch.is_general_register(dwarf_num) {
            let low = self.regs.get(self.arch.register_name(dwarf_num)?)?;
            let high = self.regs.get(self.arch.register_name(dwarf_num + 1)?)?;
            self.arch.combine_pair(low, high)
        } else {
            self.regs.get(self.arch.register_name(dwarf_num)?)?
        };
        let address = (base as i64).wrapping_add(offset);
        tracing::debug!(
            "Base register {} + {} -> 0x{:x}",
            dwarf_num,
            offset,
            address
        );
        self.stack.push_int(address);
        Ok(())
    }

    /// Size operand for the sized deref family, bounded to one target word
    fn size_arg(&self, op: &Opcode) -> Result<usize> {
        let raw = op.arg(0)?;
        match usize::try_from(raw) {
            Ok(size) if (1..=8).contains(&size) => Ok(size),
            _ => Err(RemoteDbgError::MalformedResult(format!(
                "{} read size {} is outside 1..=8",
                op.name(),
                raw
            ))),
        }
    }

    /// Depth operand for pick
    fn depth_arg(&self, op: &Opcode) -> Result<usize> {
        let raw = op.arg(0)?;
        usize::try_from(raw).map_err(|_| {
            RemoteDbgError::MalformedResult(format!(
                "{} depth {} is negative",
                op.name(),
                raw
            ))
        })
    }

    /// A DWARF register number operand
    fn dwarf_regnum(value: i64) -> Result<u16> {
        u16::try_from(value).map_err(|_| {
            RemoteDbgError::UnknownRegister(format!(
                "DWARF register number {} is out of range",
                value
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::dump::CoreDump;
    use crate::target::MockTargetAccess;

    fn avr() -> ArchProfile {
        ArchProfile::avr()
    }

    /// 16-bit registers against 16-bit addresses, so no pairing
    fn wide_reg_profile() -> ArchProfile {
        let mut profile = ArchProfile::new("test16", 2, 2)
            .with_register_size(2)
            .with_general_registers(4);
        for num in 0..4u16 {
            profile = profile.with_register(num, format!("r{}", num));
        }
        profile
    }

    fn empty_dump() -> CoreDump {
        CoreDump::new("avr")
    }

    fn op(code: gimli::DwOp) -> Opcode {
        Opcode::new(code)
    }

    fn op1(code: gimli::DwOp, arg: i64) -> Opcode {
        Opcode::new(code).with_arg(arg)
    }

    #[test]
    fn test_literal_sequence_returns_last_literal() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![op(gimli::DW_OP_lit5), op(gimli::DW_OP_lit17), op(gimli::DW_OP_lit31)];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(31));
    }

    #[test]
    fn test_const_plus_scenario() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![
            op1(gimli::DW_OP_const1u, 5),
            op1(gimli::DW_OP_const1u, 3),
            op(gimli::DW_OP_plus),
        ];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(8));
    }

    #[test]
    fn test_minus_on_seeded_stack_is_snd_minus_fst() {
        let arch = avr();
        let mut dump = empty_dump();
        let mut machine = ExprMachine::new(
            vec![op(gimli::DW_OP_minus)],
            RegisterSnapshot::new(),
            &arch,
            &mut dump,
        )
        .with_stack(vec![StackValue::Integer(10), StackValue::Integer(3)]);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(7));
    }

    #[test]
    fn test_div_and_mod_order_and_zero() {
        let arch = avr();
        let mut dump = empty_dump();
        let mut machine = ExprMachine::new(
            vec![op(gimli::DW_OP_div)],
            RegisterSnapshot::new(),
            &arch,
            &mut dump,
        )
        .with_stack(vec![StackValue::Integer(20), StackValue::Integer(5)]);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(4));

        let mut dump = empty_dump();
        let mut machine = ExprMachine::new(
            vec![op(gimli::DW_OP_mod)],
            RegisterSnapshot::new(),
            &arch,
            &mut dump,
        )
        .with_stack(vec![StackValue::Integer(7), StackValue::Integer(0)]);
        let err = machine.eval().unwrap_err();
        assert!(matches!(err, RemoteDbgError::DivisionByZero { .. }));
        assert!(err.to_string().contains("DW_OP_mod"));
    }

    #[test]
    fn test_shr_masks_to_address_width() {
        // All-ones over 16 bits, shifted logically, drops the sign
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![
            op1(gimli::DW_OP_consts, -1),
            op(gimli::DW_OP_lit1),
            op(gimli::DW_OP_shr),
        ];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(0x7FFF));
    }

    #[test]
    fn test_shra_preserves_sign() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![
            op1(gimli::DW_OP_consts, -1),
            op(gimli::DW_OP_lit1),
            op(gimli::DW_OP_shra),
        ];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        let result = machine.eval().unwrap();
        assert_eq!(result, LocationResult::Address((-1i64) as u64));
    }

    #[test]
    fn test_shift_counts_saturate() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![
            op1(gimli::DW_OP_const1u, 1),
            op1(gimli::DW_OP_const1u, 100),
            op(gimli::DW_OP_shl),
        ];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(0));
    }

    #[test]
    fn test_comparisons_push_one_or_zero() {
        let arch = avr();
        let cases = [
            (gimli::DW_OP_eq, 5i64, 5i64, 1i64),
            (gimli::DW_OP_ne, 5, 5, 0),
            (gimli::DW_OP_lt, 3, 5, 1),
            (gimli::DW_OP_le, 5, 5, 1),
            (gimli::DW_OP_gt, 3, 5, 0),
            (gimli::DW_OP_ge, 5, 3, 1),
        ];
        for (code, snd, fst, expected) in cases {
            let mut dump = empty_dump();
            let mut machine = ExprMachine::new(
                vec![op(code)],
                RegisterSnapshot::new(),
                &arch,
                &mut dump,
            )
            .with_stack(vec![StackValue::Integer(snd), StackValue::Integer(fst)]);
            assert_eq!(
                machine.eval().unwrap(),
                LocationResult::Address(expected as u64),
                "{:?}",
                code
            );
        }
    }

    #[test]
    fn test_plus_uconst_adds_constant_to_base() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![
            op1(gimli::DW_OP_const2u, 0x0100),
            op1(gimli::DW_OP_plus_uconst, 8),
        ];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(0x0108));
    }

    #[test]
    fn test_deref_reads_address_size_bytes() {
        let arch = avr();
        let mut target = MockTargetAccess::new();
        target
            .expect_read_memory()
            .withf(|address, size| *address == 0x0100 && *size == 2)
            .times(1)
            .returning(|_, _| Ok(vec![0x34, 0x12]));

        let expr = vec![op1(gimli::DW_OP_addr, 0x0100), op(gimli::DW_OP_deref)];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut target);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(0x1234));
    }

    #[test]
    fn test_deref_size_reads_operand_bytes() {
        let arch = avr();
        let mut target = MockTargetAccess::new();
        target
            .expect_read_memory()
            .withf(|address, size| *address == 0x0200 && *size == 1)
            .times(1)
            .returning(|_, _| Ok(vec![0x7F]));

        let expr = vec![
            op1(gimli::DW_OP_addr, 0x0200),
            op1(gimli::DW_OP_deref_size, 1),
        ];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut target);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(0x7F));
    }

    #[test]
    fn test_deref_size_rejects_oversized_operand() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![
            op1(gimli::DW_OP_addr, 0x0200),
            op1(gimli::DW_OP_deref_size, 9),
        ];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert!(matches!(
            machine.eval().unwrap_err(),
            RemoteDbgError::MalformedResult(_)
        ));
    }

    #[test]
    fn test_target_failure_is_forwarded() {
        let arch = avr();
        let mut dump = empty_dump(); // no regions at all
        let expr = vec![op1(gimli::DW_OP_addr, 0x0500), op(gimli::DW_OP_deref)];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert!(matches!(
            machine.eval().unwrap_err(),
            RemoteDbgError::TargetAccess { .. }
        ));
    }

    #[test]
    fn test_reg_pushes_name_token() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![op(gimli::DW_OP_reg26)];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        let result = machine.eval().unwrap();
        assert_eq!(result, LocationResult::Register("r26".to_string()));
        assert_eq!(result.as_register(), Some("r26"));
        assert_eq!(result.as_address(), None);
    }

    #[test]
    fn test_regx_unmapped_register_fails() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![op1(gimli::DW_OP_regx, 99)];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        let err = machine.eval().unwrap_err();
        assert!(matches!(err, RemoteDbgError::UnknownRegister(_)));
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_breg_adds_offset_to_register_value() {
        let arch = wide_reg_profile();
        let regs = RegisterSnapshot::new().with_register("r1", 0x1000);
        let mut dump = empty_dump();
        let expr = vec![op1(gimli::DW_OP_breg1, 4)];
        let mut machine = ExprMachine::new(expr, regs, &arch, &mut dump);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(0x1004));
    }

    #[test]
    fn test_breg_pairs_narrow_registers() {
        // r27:r26 = 0x12:0x34 reads as the X pointer 0x1234
        let arch = avr();
        let regs = RegisterSnapshot::new()
            .with_register("r26", 0x34)
            .with_register("r27", 0x12);
        let mut dump = empty_dump();
        let expr = vec![op1(gimli::DW_OP_breg26, 0)];
        let mut machine = ExprMachine::new(expr, regs, &arch, &mut dump);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(0x1234));
    }

    #[test]
    fn test_breg_pairing_crosses_into_named_registers() {
        // r31's successor by DWARF number is SP (32)
        let arch = avr();
        let regs = RegisterSnapshot::new()
            .with_register("r31", 0x34)
            .with_register("SP", 0x12);
        let mut dump = empty_dump();
        let expr = vec![op1(gimli::DW_OP_breg31, 0)];
        let mut machine = ExprMachine::new(expr, regs, &arch, &mut dump);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(0x1234));
    }

    #[test]
    fn test_bregx_takes_register_and_offset_operands() {
        let arch = wide_reg_profile();
        let regs = RegisterSnapshot::new().with_register("r2", 0x2000);
        let mut dump = empty_dump();
        let expr = vec![Opcode::new(gimli::DW_OP_bregx).with_arg(2).with_arg(-16)];
        let mut machine = ExprMachine::new(expr, regs, &arch, &mut dump);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(0x1FF0));
    }

    #[test]
    fn test_breg_missing_snapshot_value_fails() {
        let arch = wide_reg_profile();
        let mut dump = empty_dump();
        let expr = vec![op1(gimli::DW_OP_breg1, 0)];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert!(matches!(
            machine.eval().unwrap_err(),
            RemoteDbgError::UnknownRegister(_)
        ));
    }

    #[test]
    fn test_nop_does_nothing() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![op(gimli::DW_OP_lit5), op(gimli::DW_OP_nop)];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(5));
        assert_eq!(machine.stack().len(), 1);
    }

    #[test]
    fn test_skip_and_bra_are_fatal() {
        let arch = avr();
        for code in [gimli::DW_OP_skip, gimli::DW_OP_bra] {
            let mut dump = empty_dump();
            let expr = vec![op(gimli::DW_OP_lit0), op1(code, 3)];
            let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
            let err = machine.eval().unwrap_err();
            match err {
                RemoteDbgError::UnimplementedOpcode { op, args } => {
                    assert!(op.starts_with("DW_OP_"));
                    assert_eq!(args, vec![3]);
                }
                other => panic!("expected UnimplementedOpcode, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_fbreg_and_piece_are_fatal() {
        let arch = avr();
        for code in [gimli::DW_OP_fbreg, gimli::DW_OP_piece, gimli::DW_OP_call_frame_cfa] {
            let mut dump = empty_dump();
            let mut machine = ExprMachine::new(
                vec![op(code)],
                RegisterSnapshot::new(),
                &arch,
                &mut dump,
            );
            assert!(matches!(
                machine.eval().unwrap_err(),
                RemoteDbgError::UnimplementedOpcode { .. }
            ));
        }
    }

    #[test]
    fn test_empty_final_stack_is_malformed() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![op(gimli::DW_OP_lit0), op(gimli::DW_OP_drop)];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert!(matches!(
            machine.eval().unwrap_err(),
            RemoteDbgError::MalformedResult(_)
        ));
    }

    #[test]
    fn test_eval_requires_populated_profile() {
        let arch = ArchProfile::new("avr", 2, 1); // no registers mapped
        let mut dump = empty_dump();
        let mut machine = ExprMachine::new(
            vec![op(gimli::DW_OP_lit0)],
            RegisterSnapshot::new(),
            &arch,
            &mut dump,
        );
        assert!(matches!(
            machine.eval().unwrap_err(),
            RemoteDbgError::UnboundArchitecture(_)
        ));
    }

    #[test]
    fn test_access_address_reads_memory() {
        let arch = avr();
        let mut dump = CoreDump::new("avr").with_region(0x0100, vec![0x2A, 0x00]);
        let expr = vec![op1(gimli::DW_OP_addr, 0x0100)];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        assert_eq!(machine.access(2).unwrap(), 0x2A);
    }

    #[test]
    fn test_access_register_reads_snapshot() {
        let arch = avr();
        let regs = RegisterSnapshot::new().with_register("r26", 0x42);
        let mut dump = empty_dump();
        let expr = vec![op(gimli::DW_OP_reg26)];
        let mut machine = ExprMachine::new(expr, regs, &arch, &mut dump);
        assert_eq!(machine.access(1).unwrap(), 0x42);
    }

    #[test]
    fn test_access_deferred_invokes_producer() {
        let arch = avr();
        let mut dump = empty_dump();
        let mut machine = ExprMachine::new(vec![], RegisterSnapshot::new(), &arch, &mut dump)
            .with_stack(vec![StackValue::deferred(|| Ok(0xBEEF))]);
        assert_eq!(machine.access(2).unwrap(), 0xBEEF);
    }

    #[test]
    fn test_eval_leaves_result_on_stack() {
        let arch = avr();
        let mut dump = empty_dump();
        let expr = vec![op(gimli::DW_OP_lit7)];
        let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
        machine.eval().unwrap();
        assert_eq!(machine.stack().len(), 1);
    }

    #[test]
    fn test_reset_clears_only_the_stack_by_default() {
        let arch = avr();
        let regs = RegisterSnapshot::new().with_register("r26", 1);
        let mut dump = empty_dump();
        let expr = vec![op(gimli::DW_OP_lit7)];
        let mut machine = ExprMachine::new(expr.clone(), regs.clone(), &arch, &mut dump);
        machine.eval().unwrap();
        assert!(!machine.stack().is_empty());

        machine.reset(None, None, None);
        assert!(machine.stack().is_empty());
        assert_eq!(machine.opcodes(), expr.as_slice());
        assert_eq!(machine.registers(), &regs);

        // The same expression evaluates cleanly again
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(7));
    }

    #[test]
    fn test_reset_replaces_what_is_supplied() {
        let arch = avr();
        let mut dump = empty_dump();
        let mut machine = ExprMachine::new(
            vec![op(gimli::DW_OP_lit7)],
            RegisterSnapshot::new(),
            &arch,
            &mut dump,
        );
        machine.eval().unwrap();

        let new_regs = RegisterSnapshot::new().with_register("r0", 9);
        machine.reset(
            Some(new_regs.clone()),
            Some(vec![op(gimli::DW_OP_minus)]),
            Some(vec![StackValue::Integer(10), StackValue::Integer(3)]),
        );
        assert_eq!(machine.registers(), &new_regs);
        assert_eq!(machine.eval().unwrap(), LocationResult::Address(7));
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_binary_ops_reduce_depth_by_one(
            snd in any::<i64>(),
            fst in any::<i64>(),
            code in prop::sample::select(vec![
                gimli::DW_OP_and,
                gimli::DW_OP_or,
                gimli::DW_OP_xor,
                gimli::DW_OP_plus,
                gimli::DW_OP_minus,
                gimli::DW_OP_mul,
                gimli::DW_OP_shl,
                gimli::DW_OP_shr,
                gimli::DW_OP_shra,
                gimli::DW_OP_eq,
                gimli::DW_OP_ne,
                gimli::DW_OP_lt,
                gimli::DW_OP_le,
                gimli::DW_OP_gt,
                gimli::DW_OP_ge,
            ]),
        ) {
            let arch = ArchProfile::avr();
            let mut dump = CoreDump::new("avr");
            let mut machine = ExprMachine::new(
                vec![Opcode::new(code)],
                RegisterSnapshot::new(),
                &arch,
                &mut dump,
            )
            .with_stack(vec![
                StackValue::Integer(1),
                StackValue::Integer(snd),
                StackValue::Integer(fst),
            ]);
            machine.eval().unwrap();
            prop_assert_eq!(machine.stack().len(), 2);
        }

        #[test]
        fn test_comparisons_always_push_bit(
            snd in any::<i64>(),
            fst in any::<i64>(),
            code in prop::sample::select(vec![
                gimli::DW_OP_eq,
                gimli::DW_OP_ne,
                gimli::DW_OP_lt,
                gimli::DW_OP_le,
                gimli::DW_OP_gt,
                gimli::DW_OP_ge,
            ]),
        ) {
            let arch = ArchProfile::avr();
            let mut dump = CoreDump::new("avr");
            let mut machine = ExprMachine::new(
                vec![Opcode::new(code)],
                RegisterSnapshot::new(),
                &arch,
                &mut dump,
            )
            .with_stack(vec![StackValue::Integer(snd), StackValue::Integer(fst)]);
            let result = machine.eval().unwrap();
            let address = result.as_address().unwrap();
            prop_assert!(address == 0 || address == 1);
        }

        #[test]
        fn test_literal_only_expressions_return_last(
            values in prop::collection::vec(0u8..32, 1..8),
        ) {
            let arch = ArchProfile::avr();
            let mut dump = CoreDump::new("avr");
            let expr: Vec<Opcode> = values
                .iter()
                .map(|&v| Opcode::new(gimli::DwOp(gimli::DW_OP_lit0.0 + v)))
                .collect();
            let last = *values.last().unwrap() as u64;
            let mut machine = ExprMachine::new(expr, RegisterSnapshot::new(), &arch, &mut dump);
            prop_assert_eq!(machine.eval().unwrap(), LocationResult::Address(last));
        }
    }
}
