use crate::instruction::{Instruction, Offset};
use thiserror::Error;

/// Malformed or inconsistent bytecode. Fatal for the method being analyzed,
/// but never for the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("stack underflow: needed {needed} value(s), stack depth is {depth}")]
    StackUnderflow { needed: usize, depth: usize },

    #[error("local {slot} is out of range: frame has {num_locals} local(s)")]
    InvalidSlot { slot: usize, num_locals: usize },

    #[error("local {slot} holds a value bound to local {bound:?}")]
    AliasMismatch { slot: usize, bound: Option<usize> },

    #[error("frames disagree on stack depth at a join: {left} vs. {right}")]
    StackDepthMismatch { left: usize, right: usize },

    #[error("frames disagree on local count at a join: {left} vs. {right}")]
    LocalCountMismatch { left: usize, right: usize },

    #[error("malformed method descriptor {descriptor:?}: {reason}")]
    InvalidDescriptor { descriptor: String, reason: String },

    #[error("no instruction at offset {offset}")]
    UnknownLocation { offset: Offset },

    #[error("location {offset} did not converge after {visits} visits")]
    NonConvergent { offset: Offset, visits: usize },
}

/// A method whose analysis was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("in method {method}, while processing instruction at {offset} ({instruction:?}): {source}")]
    Instruction {
        method: String,
        offset: Offset,
        instruction: Instruction,
        #[source]
        source: StructuralError,
    },

    #[error("in method {method}: {source}")]
    Method {
        method: String,
        #[source]
        source: StructuralError,
    },
}

impl AnalysisError {
    /// The underlying structural problem
    pub fn structural(&self) -> &StructuralError {
        match self {
            AnalysisError::Instruction { source, .. } => source,
            AnalysisError::Method { source, .. } => source,
        }
    }
}

/// Failure inside an auxiliary `FrameObserver`. Logged and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ObserverError(pub String);

/// A subtype query referred to a type the hierarchy doesn't know about.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing type information for class {class}")]
pub struct MissingTypeError {
    pub class: String,
}
