//! Test data builders for creating test objects

use remotedbg_rs::Opcode;

/// Builder for assembling location expressions opcode by opcode
pub struct ExpressionBuilder {
    opcodes: Vec<Opcode>,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self {
            opcodes: Vec::new(),
        }
    }

    /// Append `DW_OP_lit<n>` (n in 0..=31)
    pub fn lit(mut self, n: u8) -> Self {
        self.opcodes
            .push(Opcode::new(gimli::DwOp(gimli::DW_OP_lit0.0 + n)));
        self
    }

    /// Append `DW_OP_const2u` with one operand
    pub fn constant(mut self, value: i64) -> Self {
        self.opcodes
            .push(Opcode::new(gimli::DW_OP_const2u).with_arg(value));
        self
    }

    /// Append `DW_OP_reg<n>`
    pub fn reg(mut self, n: u8) -> Self {
        self.opcodes
            .push(Opcode::new(gimli::DwOp(gimli::DW_OP_reg0.0 + n)));
        self
    }

    /// Append `DW_OP_breg<n>` with a signed offset operand
    pub fn breg(mut self, n: u8, offset: i64) -> Self {
        self.opcodes
            .push(Opcode::new(gimli::DwOp(gimli::DW_OP_breg0.0 + n)).with_arg(offset));
        self
    }

    /// Append a bare operation
    pub fn op(mut self, code: gimli::DwOp) -> Self {
        self.opcodes.push(Opcode::new(code));
        self
    }

    /// Append an operation with one operand
    pub fn op_with(mut self, code: gimli::DwOp, arg: i64) -> Self {
        self.opcodes.push(Opcode::new(code).with_arg(arg));
        self
    }

    pub fn build(self) -> Vec<Opcode> {
        self.opcodes
    }
}

impl Default for ExpressionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_builder() {
        let expr = ExpressionBuilder::new()
            .lit(5)
            .constant(0x1000)
            .op(gimli::DW_OP_plus)
            .build();

        assert_eq!(expr.len(), 3);
        assert_eq!(expr[0].code(), 0x35);
        assert_eq!(expr[1].args, vec![0x1000]);
        assert_eq!(expr[2].name(), "DW_OP_plus");
    }
}
