use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::concat::ConcatError;

/// Status returned for a run that reached the end of the program.
pub const STATUS_OK: i32 = 0;

/// Status for failures outside the engine (unreadable program file, bad usage).
pub const STATUS_HOST_FAILURE: i32 = -16;

fn as_char(byte: &u8) -> char {
    char::from(*byte)
}

/// A fatal evaluation error. Evaluation stops at the instruction that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unknown instruction {:?} at {position}", as_char(.instruction))]
    UnknownInstruction { instruction: u8, position: usize },

    #[error("could not find matching ']' for '[' at {origin} (scan reached {reached})")]
    UnmatchedOpenBracket { origin: usize, reached: usize },

    #[error("could not find matching '[' for ']' at {origin}")]
    UnmatchedCloseBracket { origin: usize },

    #[error("invalid native function with index {index}")]
    InvalidNativeIndex { index: u8 },

    #[error("data pointer left the tape at instruction {position}")]
    DataPointerOutOfBounds { position: usize },

    #[error("native call {index} at data pointer {data_pointer} would read before cell 0")]
    NativeWindowUnderflow { index: u8, data_pointer: usize },

    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },
}

impl EvalError {
    /// The negative status code reported to hosts for this error.
    pub fn status(&self) -> i32 {
        match self {
            EvalError::UnknownInstruction { .. } => -1,
            EvalError::UnmatchedOpenBracket { .. } => -2,
            EvalError::UnmatchedCloseBracket { .. } => -3,
            EvalError::InvalidNativeIndex { .. } => -4,
            EvalError::DataPointerOutOfBounds { .. } => -5,
            EvalError::NativeWindowUnderflow { .. } => -6,
            EvalError::StepLimitExceeded { .. } => -7,
        }
    }
}

/// Errors raised by the host layer around the engine.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("output error: {0}")]
    Output(#[source] io::Error),

    #[error("failed to compile {}: {source}", .path.display())]
    Compile { path: PathBuf, source: ConcatError },

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl HostError {
    pub fn status(&self) -> i32 {
        match self {
            HostError::Eval(e) => e.status(),
            _ => STATUS_HOST_FAILURE,
        }
    }
}
