//! Error handling for the remotedbg-rs library
//!
//! This module defines custom error types and a Result alias for use
//! throughout the library. Every failure during expression evaluation is
//! fatal to that evaluation: the first error is surfaced to the caller
//! with enough context (opcode name, arguments, stack depth) to identify
//! which part of the expression failed.

use thiserror::Error;

/// Main error type for remotedbg-rs operations
#[derive(Error, Debug)]
pub enum RemoteDbgError {
    /// A DWARF opcode that the standard defines but this evaluator does not handle
    #[error("unimplemented DWARF opcode {op} (args: {args:?})")]
    UnimplementedOpcode { op: String, args: Vec<i64> },

    /// A pop was attempted on an empty evaluation stack
    #[error("stack underflow in {op} (stack depth {depth})")]
    StackUnderflow { op: String, depth: usize },

    /// A register number or name with no usable mapping
    #[error("unknown register: {0}")]
    UnknownRegister(String),

    /// Evaluation attempted against an incompletely populated architecture profile
    #[error("architecture not bound: {0}")]
    UnboundArchitecture(String),

    /// An expression or its result does not have the required shape
    #[error("malformed expression result: {0}")]
    MalformedResult(String),

    /// Division or modulo with a zero divisor
    #[error("division by zero in {op}")]
    DivisionByZero { op: String },

    /// Errors reported by the target-access capability (live link or dump)
    #[error("target access error at address 0x{address:08X}: {message}")]
    TargetAccess { address: u64, message: String },

    /// Errors related to profile or dump configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Core dump (de)serialization errors
    #[error("dump serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Profile parse errors
    #[error("profile parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Profile serialization errors
    #[error("profile serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RemoteDbgError>,
    },
}

impl RemoteDbgError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RemoteDbgError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for remotedbg-rs operations
pub type Result<T> = std::result::Result<T, RemoteDbgError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
