//! Error taxonomy for the simulator core (§7 of the specification).
//!
//! Every fallible entry point in this crate returns `Result<T, EmulatorError>`.
//! `InvalidTransition` and `InvalidArgument` are caller-misuse errors and never
//! push the engine into `ExecutionState::Error`; every other variant does.

use std::fmt;

use crate::state::ExecutionState;

/// Which permission a memory access was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Execute,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
        };
        write!(f, "{s}")
    }
}

/// The stack operation that ran out of bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOp {
    Push,
    Pop,
    Call,
    Ret,
    Reti,
}

impl fmt::Display for StackOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Push => "PUSH",
            Self::Pop => "POP",
            Self::Call => "CALL",
            Self::Ret => "RET",
            Self::Reti => "RETI",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmulatorError {
    #[error("invalid instruction word 0x{word:04x} at pc=0x{pc:04x}")]
    InvalidInstruction { word: u16, pc: u16 },

    #[error("memory {kind} access to 0x{addr:04x} is not permitted")]
    MemoryAccess { addr: u16, kind: AccessKind },

    #[error("stack pointer 0x{sp:04x} left addressable RAM during {op}")]
    StackBounds { sp: u16, op: StackOp },

    #[error("cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ExecutionState,
        to: ExecutionState,
    },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl EmulatorError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Whether this error, once raised from `step`/`run`, transitions the
    /// engine to `ExecutionState::Error`. `InvalidTransition` and
    /// `InvalidArgument` are caller-misuse errors that reject the request
    /// without disturbing engine state.
    pub fn transitions_to_error(&self) -> bool {
        !matches!(
            self,
            Self::InvalidTransition { .. } | Self::InvalidArgument { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
