use crate::cfg::{ControlFlowGraph, MethodDescriptor};
use crate::context::AnalysisContext;
use crate::descriptor::MethodSignature;
use crate::error::{AnalysisError, StructuralError};
use crate::frame::Frame;
use crate::instruction::{Offset, ValueKind};
use crate::method_config::MethodConfig;
use crate::observer::notify_all;
use crate::summary_store::CommitOutcome;
use crate::taint::{SourceKind, State, Taint, TaintSource};
use crate::transfer::TaintTransfer;
use crate::worklist::Worklist;
use log::debug;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// The result of analyzing one method
#[derive(Clone, Debug)]
pub struct MethodAnalysis {
    method: MethodDescriptor,
    /// Frame right before each reachable location
    frames: BTreeMap<Offset, Frame>,
    output_taint: Option<Taint>,
    visits: BTreeMap<Offset, usize>,
    commit: Option<CommitOutcome>,
}

impl MethodAnalysis {
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// The frame right before the instruction at `offset`, or `None` if that
    /// location is unreachable
    pub fn frame_at(&self, offset: Offset) -> Option<&Frame> {
        self.frames.get(&offset)
    }

    /// Frames of all reachable locations, lowest offset first
    pub fn frames(&self) -> impl Iterator<Item = (Offset, &Frame)> {
        self.frames.iter().map(|(&offset, frame)| (offset, frame))
    }

    /// The merge of everything the method returns
    pub fn output_taint(&self) -> Option<&Taint> {
        self.output_taint.as_ref()
    }

    /// How many times the location at `offset` was processed
    pub fn visit_count(&self, offset: Offset) -> usize {
        self.visits.get(&offset).copied().unwrap_or(0)
    }

    /// What happened when the summary was offered to the store, or `None` if
    /// it wasn't eligible
    pub fn commit_outcome(&self) -> Option<CommitOutcome> {
        self.commit
    }
}

/// Analyze one method body to a fixpoint, then offer its summary to the
/// context's `SummaryStore`.
///
/// A structural error aborts this method only; nothing is committed for it.
pub fn analyze_method<G: ControlFlowGraph + ?Sized>(
    ctx: &AnalysisContext,
    method: &MethodDescriptor,
    cfg: &G,
) -> Result<MethodAnalysis, AnalysisError> {
    let method_key = method.key();
    let method_error = |source: StructuralError| AnalysisError::Method {
        method: method_key.clone(),
        source,
    };
    let signature = method.signature().map_err(method_error)?;
    let entry = cfg.entry();
    if cfg.instruction(entry).is_none() {
        return Err(method_error(StructuralError::UnknownLocation { offset: entry }));
    }

    let mut frames = BTreeMap::new();
    frames.insert(entry, entry_frame(ctx, method, &signature).map_err(method_error)?);
    let mut visits: BTreeMap<Offset, usize> = BTreeMap::new();
    let mut worklist: Worklist<Offset> = std::iter::once(entry).collect();
    let mut transfer = TaintTransfer::new(ctx, method);

    while let Some(offset) = worklist.pop() {
        let count = visits.entry(offset).or_insert(0);
        *count += 1;
        if *count > ctx.config().max_visits_per_location {
            return Err(method_error(StructuralError::NonConvergent {
                offset,
                visits: *count,
            }));
        }
        let inst = cfg
            .instruction(offset)
            .ok_or_else(|| method_error(StructuralError::UnknownLocation { offset }))?;
        let mut frame = match frames.get(&offset) {
            Some(frame) => frame.clone(),
            None => return Err(method_error(StructuralError::UnknownLocation { offset })),
        };
        transfer
            .process_instruction(&mut frame, offset, inst)
            .map_err(|source| AnalysisError::Instruction {
                method: method_key.clone(),
                offset,
                instruction: inst.clone(),
                source,
            })?;

        for &succ in cfg.successors(offset) {
            if cfg.instruction(succ).is_none() {
                return Err(method_error(StructuralError::UnknownLocation { offset: succ }));
            }
            match frames.entry(succ) {
                Entry::Vacant(ventry) => {
                    ventry.insert(frame.clone());
                    worklist.add(succ);
                },
                Entry::Occupied(mut oentry) => {
                    let changed = oentry.get_mut().join_from(&frame).map_err(|source| AnalysisError::Instruction {
                        method: method_key.clone(),
                        offset,
                        instruction: inst.clone(),
                        source,
                    })?;
                    if changed {
                        worklist.add(succ);
                    }
                },
            }
        }
    }

    let output_taint = transfer.into_output_taint();
    notify_all(ctx.observers(), |o| o.visit_method_complete(&method_key, output_taint.as_ref()));
    let commit = commit_summary(ctx, method, &signature, output_taint.as_ref());
    debug!("Analyzed {} ({} reachable locations)", method_key, frames.len());

    Ok(MethodAnalysis {
        method: method.clone(),
        frames,
        output_taint,
        visits,
        commit,
    })
}

/// The frame on entry to `method`. Parameters are UNKNOWN and parametric in
/// their own argument position, except those of taint-safe types; the
/// remaining locals are UNKNOWN.
fn entry_frame(
    ctx: &AnalysisContext,
    method: &MethodDescriptor,
    signature: &MethodSignature,
) -> Result<Frame, StructuralError> {
    let mut frame = Frame::new(method.max_locals);
    let key = method.key();
    let receiver_words = if method.is_static { 0 } else { 1 };
    // stack index of an argument counted from the top at the call site
    let total_words = signature.parameter_words() + receiver_words;
    let mut slot = 0;

    if receiver_words == 1 {
        let mut receiver = Taint::parametric(Some(total_words - 1));
        receiver.add_source(TaintSource::new(SourceKind::Parameter, State::Unknown, format!("{}#this", key)));
        bind_local(&mut frame, slot, &receiver)?;
        slot += 1;
    }
    for (number, (stack_index, ty)) in signature.parameter_stack_indices().into_iter().enumerate() {
        let words = ValueKind::from_descriptor(ty).words();
        let taint = if ctx.taint_config().is_taint_safe(ty) {
            Taint::safe()
        } else {
            // the parameter is addressed through its topmost word
            let mut taint = Taint::parametric(Some(stack_index));
            taint.add_source(TaintSource::new(SourceKind::Parameter, State::Unknown, format!("{}#{}", key, number)));
            taint
        };
        for _ in 0..words {
            bind_local(&mut frame, slot, &taint)?;
            slot += 1;
        }
    }
    debug!("Entry frame of {}: {}", key, frame);
    Ok(frame)
}

fn bind_local(frame: &mut Frame, slot: usize, taint: &Taint) -> Result<(), StructuralError> {
    let mut taint = taint.clone();
    taint.set_bound_slot(Some(slot));
    frame.set_local(slot, taint)
}

/// Offer the summary of a finished method to the store, if it says anything
/// a caller could use
fn commit_summary(
    ctx: &AnalysisContext,
    method: &MethodDescriptor,
    signature: &MethodSignature,
    output_taint: Option<&Taint>,
) -> Option<CommitOutcome> {
    let output_taint = match output_taint {
        Some(taint) if !signature.returns_void() => taint,
        _ => return None,
    };
    let taint_config = ctx.taint_config();
    if taint_config.is_taint_safe(signature.return_type()) && output_taint.state() != State::Null {
        return None;
    }
    let mut summary = output_taint.clone();
    if summary.declared_runtime_type() == class_of(signature.return_type()) {
        summary.set_declared_runtime_type(None);
    }
    summary.set_bound_slot(None);
    summary.set_allocation_site(None);
    let config = MethodConfig::derived(summary);

    let method_id = method.method_id();
    let has_super_summary = || {
        taint_config.lookup_super_method_config(&method.class_name, &method_id).is_some()
            || ctx.store().super_method_config(taint_config, &method.class_name, &method_id).is_some()
    };
    if !config.is_informative() && !has_super_summary() {
        debug!("Not committing uninformative summary of {}", method.key());
        return None;
    }
    Some(ctx.store().commit_derived(method.key(), config))
}

/// Internal class name of a reference type descriptor
fn class_of(ty: &str) -> Option<&str> {
    ty.strip_prefix('L').and_then(|t| t.strip_suffix(';'))
}
