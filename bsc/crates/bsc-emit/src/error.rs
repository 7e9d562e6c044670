//! Error types for barrier stub emission and interpretation

use thiserror::Error;

use crate::assembler::AsmLabel;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("label {0} used but never bound")]
    UnboundLabel(AsmLabel),

    #[error("label {0} bound twice")]
    LabelRebound(AsmLabel),

    #[error("register conflict: {0}")]
    RegisterConflict(String),

    #[error("narrow load-reference barrier without a compress encoding")]
    MissingEncoding,

    #[error("not a load-reference barrier instruction")]
    NotABarrier,

    #[error("interpreter stopped after {steps} steps")]
    StepLimit { steps: usize },

    #[error("no such register {0}")]
    InvalidRegister(String),

    #[error("pop from empty stack at instruction {at}")]
    StackUnderflow { at: usize },

    #[error("stack adjustment of {delta} bytes at instruction {at} breaks slot alignment")]
    MisalignedStack { delta: i32, at: usize },
}

impl EmitError {
    /// Whether this error indicates a bug in the emitter rather than bad input
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            EmitError::UnboundLabel(_)
                | EmitError::LabelRebound(_)
                | EmitError::StepLimit { .. }
                | EmitError::InvalidRegister(_)
                | EmitError::StackUnderflow { .. }
                | EmitError::MisalignedStack { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EmitError>;
