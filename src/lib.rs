//! Intraprocedural taint analysis of JVM bytecode, with memoized method
//! summaries that let callers analyzed later reuse what was learned about
//! their callees.
//!
//! The usual entry points are [`analyze_method`] for a single method body and
//! [`TaintDetector`] for running a check over whole classes.

mod cfg;
mod config;
mod context;
mod descriptor;
mod detector;
mod driver;
mod error;
mod frame;
mod instruction;
mod method_config;
mod observer;
mod resolver;
mod summary_store;
mod taint;
mod taint_config;
mod transfer;
mod worklist;

pub use crate::cfg::{ControlFlowGraph, MethodBody, MethodDescriptor};
pub use crate::config::Config;
pub use crate::context::AnalysisContext;
pub use crate::descriptor::{class_descriptor, is_reference, MethodSignature};
pub use crate::detector::{
    CallLocation,
    ClassUnit,
    Finding,
    FindingCollector,
    FindingSink,
    MethodUnit,
    TaintCheck,
    TaintDetector,
};
pub use crate::driver::{analyze_method, MethodAnalysis};
pub use crate::error::{AnalysisError, MissingTypeError, ObserverError, StructuralError};
pub use crate::frame::Frame;
pub use crate::instruction::{
    CallSite,
    FieldRef,
    Instruction,
    InvokeKind,
    Literal,
    Offset,
    StackOp,
    ValueKind,
    CONSTRUCTOR_NAME,
    STATIC_INITIALIZER_NAME,
};
pub use crate::method_config::MethodConfig;
pub use crate::observer::FrameObserver;
pub use crate::summary_store::{method_key, CommitOutcome, SummaryStore};
pub use crate::taint::{SourceKind, State, Tag, Taint, TaintLocation, TaintSource};
pub use crate::taint_config::{is_subtype_of_any, StaticTaintConfig, TaintConfig, TypeHierarchy};
