//! The evaluation stack and its value model
//!
//! A location expression computes over an ordered, last-in-first-out stack
//! of [`StackValue`]s, local to one machine instance. Entries are indexed
//! from the top: `at(0)` is the most recently pushed value. Popping an
//! empty stack is always a fatal underflow; the opcode name is threaded
//! into every fallible stack operation so the resulting error names the
//! instruction that failed.

use crate::error::{RemoteDbgError, Result};
use std::rc::Rc;

/// Producer invoked to materialize a deferred value
pub type DeferredFn = Rc<dyn Fn() -> Result<u64>>;

/// One entry on the evaluation stack
///
/// Register names stay symbolic on the stack; they resolve to values only
/// when `access` consumes the final result. Deferred entries carry a
/// producer to invoke at that same point.
#[derive(Clone)]
pub enum StackValue {
    /// A signed integer (addresses included)
    Integer(i64),
    /// A machine register name
    RegisterRef(String),
    /// A value that materializes on demand
    Deferred(DeferredFn),
}

impl StackValue {
    /// Build a deferred entry from a producer closure
    pub fn deferred(producer: impl Fn() -> Result<u64> + 'static) -> Self {
        StackValue::Deferred(Rc::new(producer))
    }
}

impl std::fmt::Debug for StackValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackValue::Integer(v) => write!(f, "Integer({})", v),
            StackValue::RegisterRef(name) => write!(f, "RegisterRef({:?})", name),
            StackValue::Deferred(_) => write!(f, "Deferred(..)"),
        }
    }
}

impl std::fmt::Display for StackValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackValue::Integer(v) => write!(f, "{}", v),
            StackValue::RegisterRef(name) => write!(f, "register {}", name),
            StackValue::Deferred(_) => write!(f, "<deferred>"),
        }
    }
}

impl PartialEq for StackValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StackValue::Integer(a), StackValue::Integer(b)) => a == b,
            (StackValue::RegisterRef(a), StackValue::RegisterRef(b)) => a == b,
            (StackValue::Deferred(a), StackValue::Deferred(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for StackValue {
    fn from(value: i64) -> Self {
        StackValue::Integer(value)
    }
}

/// Last-in-first-out store of [`StackValue`]s
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalStack {
    values: Vec<StackValue>,
}

impl EvalStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stack from bottom-to-top values
    pub fn from_values(values: Vec<StackValue>) -> Self {
        Self { values }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the stack holds nothing
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Discard every entry
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Entries bottom to top
    pub fn values(&self) -> &[StackValue] {
        &self.values
    }

    /// Push one entry
    pub fn push(&mut self, value: StackValue) {
        self.values.push(value);
    }

    /// Push an integer entry
    pub fn push_int(&mut self, value: i64) {
        self.values.push(StackValue::Integer(value));
    }

    /// Pop the top entry, fatal underflow if empty
    pub fn pop(&mut self, op: &str) -> Result<StackValue> {
        self.values.pop().ok_or_else(|| RemoteDbgError::StackUnderflow {
            op: op.to_string(),
            depth: 0,
        })
    }

    /// Pop the top entry and require an integer
    pub fn pop_int(&mut self, op: &str) -> Result<i64> {
        match self.pop(op)? {
            StackValue::Integer(v) => Ok(v),
            other => Err(RemoteDbgError::MalformedResult(format!(
                "{} needs an integer operand on the stack, found {}",
                op, other
            ))),
        }
    }

    /// Entry at `depth` below the top (`at(0)` = top)
    pub fn at(&self, depth: usize, op: &str) -> Result<&StackValue> {
        if depth < self.values.len() {
            Ok(&self.values[self.values.len() - 1 - depth])
        } else {
            Err(RemoteDbgError::StackUnderflow {
                op: op.to_string(),
                depth: self.values.len(),
            })
        }
    }

    /// Top entry, if any
    pub fn top(&self) -> Option<&StackValue> {
        self.values.last()
    }

    /// Push a copy of the top entry
    pub fn dup(&mut self, op: &str) -> Result<()> {
        let copy = self.at(0, op)?.clone();
        self.push(copy);
        Ok(())
    }

    /// Discard the top entry
    pub fn drop_top(&mut self, op: &str) -> Result<()> {
        self.pop(op).map(|_| ())
    }

    /// Push a copy of the second entry
    pub fn over(&mut self, op: &str) -> Result<()> {
        self.pick(1, op)
    }

    /// Push a copy of the entry at `depth`
    pub fn pick(&mut self, depth: usize, op: &str) -> Result<()> {
        let copy = self.at(depth, op)?.clone();
        self.push(copy);
        Ok(())
    }

    /// Exchange the top two entries
    pub fn swap(&mut self, op: &str) -> Result<()> {
        let fst = self.pop(op)?;
        let snd = self.pop(op)?;
        self.push(fst);
        self.push(snd);
        Ok(())
    }

    /// Rotate the top three entries: the top moves third, the second tops
    pub fn rot(&mut self, op: &str) -> Result<()> {
        let fst = self.pop(op)?;
        let snd = self.pop(op)?;
        let trd = self.pop(op)?;
        self.push(fst);
        self.push(trd);
        self.push(snd);
        Ok(())
    }
}
