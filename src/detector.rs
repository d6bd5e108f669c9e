use crate::cfg::{ControlFlowGraph, MethodBody, MethodDescriptor};
use crate::context::AnalysisContext;
use crate::driver::{analyze_method, MethodAnalysis};
use crate::error::AnalysisError;
use crate::frame::Frame;
use crate::instruction::{CallSite, Offset};
use crate::taint::Taint;
use log::{debug, warn};
use parking_lot::Mutex;
use rayon::prelude::*;

/// A method to analyze, together with its body
#[derive(Clone, Debug)]
pub struct MethodUnit<G = MethodBody> {
    pub method: MethodDescriptor,
    pub body: G,
}

/// The methods of one class, in the order they should be analyzed (callees
/// before callers where possible, so callers see the callees' summaries)
#[derive(Clone, Debug)]
pub struct ClassUnit<G = MethodBody> {
    /// Internal (slashed) class name
    pub name: String,
    pub methods: Vec<MethodUnit<G>>,
}

/// Everything a check gets to see about one call site
pub struct CallLocation<'a> {
    /// Key of the calling method
    pub method_key: &'a str,
    pub method: &'a MethodDescriptor,
    pub offset: Offset,
    pub call: &'a CallSite,
    /// Frame right before the call; the arguments are on top of its stack
    pub frame: &'a Frame,
}

impl<'a> CallLocation<'a> {
    /// The argument `index` words below the top of the stack at the call
    pub fn argument(&self, index: usize) -> Option<&'a Taint> {
        self.frame.stack_value(index).ok()
    }
}

/// Something a check wants reported
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Finding {
    /// Name of the check which found it
    pub check: String,
    pub method: String,
    pub offset: Offset,
    pub message: String,
    /// The offending value, if the check singled one out
    pub taint: Option<Taint>,
}

/// Where findings and per-method failures go
pub trait FindingSink: Send + Sync {
    fn report(&self, finding: Finding);

    fn log_error(&self, message: &str, error: &AnalysisError);
}

/// A pluggable check run at every reachable call site
pub trait TaintCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Checks may skip whole classes. All classes are analyzed by default.
    fn should_analyze_class(&self, _class_name: &str) -> bool {
        true
    }

    fn analyze_location(&self, location: &CallLocation, sink: &dyn FindingSink);
}

/// A `FindingSink` which keeps everything in memory
#[derive(Default)]
pub struct FindingCollector {
    findings: Mutex<Vec<Finding>>,
    errors: Mutex<Vec<String>>,
}

impl FindingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn findings(&self) -> Vec<Finding> {
        self.findings.lock().clone()
    }

    /// Logged errors, rendered as text
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl FindingSink for FindingCollector {
    fn report(&self, finding: Finding) {
        self.findings.lock().push(finding);
    }

    fn log_error(&self, message: &str, error: &AnalysisError) {
        self.errors.lock().push(format!("{}: {}", message, error));
    }
}

/// Runs the analysis over classes and hands every call site to a check.
///
/// A method which fails to analyze is reported through
/// `FindingSink::log_error`; the rest of the batch carries on.
pub struct TaintDetector<C> {
    ctx: AnalysisContext,
    check: C,
}

impl<C: TaintCheck> TaintDetector<C> {
    pub fn new(ctx: AnalysisContext, check: C) -> Self {
        Self { ctx, check }
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.ctx
    }

    /// Analyze one class, method by method, in the given order
    pub fn visit_class<G: ControlFlowGraph>(&self, class: &ClassUnit<G>, sink: &dyn FindingSink) {
        if !self.check.should_analyze_class(&class.name) {
            debug!("{} skips class {}", self.check.name(), class.name);
            return;
        }
        for unit in &class.methods {
            if let Err(e) = self.visit_method(unit, sink) {
                warn!("Analysis of {} failed: {}", unit.method.key(), e);
                sink.log_error(&format!("Exception while analyzing {}", unit.method.key()), &e);
            }
        }
    }

    /// Analyze several classes in parallel. Methods within one class keep
    /// their order.
    pub fn visit_classes<G>(&self, classes: &[ClassUnit<G>], sink: &dyn FindingSink)
    where
        G: ControlFlowGraph + Sync,
    {
        classes.par_iter().for_each(|class| self.visit_class(class, sink));
    }

    /// Analyze one method and run the check at each of its reachable call
    /// sites
    pub fn visit_method<G: ControlFlowGraph>(
        &self,
        unit: &MethodUnit<G>,
        sink: &dyn FindingSink,
    ) -> Result<MethodAnalysis, AnalysisError> {
        let analysis = analyze_method(&self.ctx, &unit.method, &unit.body)?;
        let method_key = unit.method.key();
        for (offset, frame) in analysis.frames() {
            let call = match unit.body.instruction(offset).and_then(|inst| inst.as_call_site()) {
                Some(call) => call,
                None => continue,
            };
            let location = CallLocation {
                method_key: &method_key,
                method: &unit.method,
                offset,
                call,
                frame,
            };
            self.check.analyze_location(&location, sink);
        }
        Ok(analysis)
    }
}
