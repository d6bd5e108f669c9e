use crate::cfg::MethodDescriptor;
use crate::context::AnalysisContext;
use crate::descriptor::{class_descriptor, is_reference, MethodSignature};
use crate::error::{ObserverError, StructuralError};
use crate::frame::Frame;
use crate::instruction::{CallSite, FieldRef, Instruction, Literal, Offset, StackOp, ValueKind};
use crate::method_config::MethodConfig;
use crate::observer::{notify_all, FrameObserver};
use crate::resolver::MethodConfigResolver;
use crate::taint::{SourceKind, State, Taint, TaintLocation, TaintSource};
use log::{debug, warn};

/// Applies the effect of each instruction of one method to the frame flowing
/// into it
pub(crate) struct TaintTransfer<'a> {
    ctx: &'a AnalysisContext,
    method: &'a MethodDescriptor,
    /// `method.key()`
    method_key: String,
    /// Merge of every value returned so far
    output_taint: Option<Taint>,
}

impl<'a> TaintTransfer<'a> {
    pub(crate) fn new(ctx: &'a AnalysisContext, method: &'a MethodDescriptor) -> Self {
        Self {
            ctx,
            method,
            method_key: method.key(),
            output_taint: None,
        }
    }

    /// The merge of all values returned so far, `None` if nothing was
    /// returned (yet)
    pub(crate) fn into_output_taint(self) -> Option<Taint> {
        self.output_taint
    }

    /// Update `frame`, the frame right before the instruction at `offset`, to
    /// the frame right after it.
    pub(crate) fn process_instruction(
        &mut self,
        frame: &mut Frame,
        offset: Offset,
        inst: &Instruction,
    ) -> Result<(), StructuralError> {
        if self.ctx.config().debug_print_instructions {
            debug!("{} @{}: {:?}", self.method_key, offset, inst);
        }
        match inst {
            Instruction::Constant(literal) => {
                self.process_constant(frame, literal);
                Ok(())
            },
            Instruction::GetField { field, is_static } => self.process_get_field(frame, offset, field, *is_static),
            Instruction::PutField { field, is_static } => self.process_put_field(frame, offset, field, *is_static),
            Instruction::Load { index, kind } => self.process_load(frame, offset, *index, kind.words()),
            Instruction::Store { index, kind } => {
                for n in 0..kind.words() {
                    let mut taint = frame.pop()?;
                    taint.set_bound_slot(Some(index + n));
                    frame.set_local(index + n, taint)?;
                }
                Ok(())
            },
            Instruction::New { class } => {
                let mut taint = Taint::safe();
                taint.set_declared_runtime_type(Some(class.replace('.', "/")));
                taint.set_allocation_site(Some(offset));
                frame.push(self.describe(taint, || format!("new {}", class)));
                Ok(())
            },
            Instruction::NewArray { dimensions } => {
                frame.pop_n(*dimensions)?;
                let mut taint = Taint::safe();
                taint.set_allocation_site(Some(offset));
                frame.push(self.describe(taint, || "new array".into()));
                Ok(())
            },
            Instruction::ArrayStore { kind } => self.process_array_store(frame, *kind),
            Instruction::ArrayLoad { kind } => {
                frame.pop()?; // index
                let mut element = frame.pop()?;
                // the element may be of any subtype of the array's type
                element.set_declared_runtime_type(None);
                element.set_allocation_site(None);
                push_words(frame, element, kind.words());
                Ok(())
            },
            Instruction::CheckCast { class } => {
                if self.ctx.taint_config().is_taint_safe(&class_descriptor(class)) {
                    frame.pop()?;
                    frame.push(self.describe(Taint::safe(), || format!("cast to {}", class)));
                }
                Ok(())
            },
            Instruction::Return { kind: None } => Ok(()),
            Instruction::Return { kind: Some(kind) } => {
                let taint = frame.top()?.clone();
                self.output_taint = Taint::merge(self.output_taint.as_ref(), Some(&taint));
                frame.pop_n(kind.words())?;
                self.notify(|o| o.visit_return(&self.method_key, offset, &taint));
                Ok(())
            },
            Instruction::Invoke(call) => self.process_invoke(frame, offset, call),
            Instruction::Concat { operands } => {
                // leftmost operand first
                let mut values = frame.pop_n(*operands)?;
                values.reverse();
                let mut result = values
                    .iter()
                    .fold(None, |acc: Option<Taint>, value| {
                        Some(match acc {
                            None => value.clone(),
                            Some(acc) => acc.concat(value),
                        })
                    })
                    .unwrap_or_else(|| Taint::constant(""));
                result.set_bound_slot(None);
                result.set_declared_runtime_type(None);
                result.set_allocation_site(None);
                frame.push(result);
                Ok(())
            },
            Instruction::Stack(op) => process_stack_op(frame, *op),
            Instruction::Other { consumed, produced } => {
                frame.pop_n(*consumed)?;
                push_words(frame, Taint::unknown(), *produced);
                Ok(())
            },
        }
    }

    fn process_constant(&self, frame: &mut Frame, literal: &Literal) {
        let taint = match literal {
            Literal::String(s) => Taint::constant(s.as_str()),
            Literal::Int(i) => Taint::constant(i.to_string()),
            Literal::Char(c) => Taint::constant(c.to_string()),
            Literal::Long(_) | Literal::Float(_) | Literal::Double(_) => Taint::safe(),
            Literal::Null => Taint::null(),
        };
        let taint = self.describe(taint, || format!("{:?}", literal));
        push_words(frame, taint, literal.kind().words());
    }

    fn process_get_field(
        &self,
        frame: &mut Frame,
        offset: Offset,
        field: &FieldRef,
        is_static: bool,
    ) -> Result<(), StructuralError> {
        let signature = field.signature();
        let state = self.ctx.taint_config().field_taint_state(&signature, State::Unknown);
        let mut taint = Taint::new(state);
        if !taint.is_safe() {
            taint.add_location(self.location(offset));
        }
        taint.add_source(TaintSource::new(SourceKind::Field, state, signature.as_str()));
        let taint = self.describe(taint, || format!("field {}", signature));
        frame.pop_n(if is_static { 0 } else { 1 })?;
        push_words(frame, taint.clone(), field.kind().words());
        let frame: &Frame = frame;
        self.notify(|o| o.visit_field(&self.method_key, offset, field, frame, &taint));
        Ok(())
    }

    fn process_put_field(
        &self,
        frame: &mut Frame,
        offset: Offset,
        field: &FieldRef,
        is_static: bool,
    ) -> Result<(), StructuralError> {
        let taint = frame.top()?.clone();
        frame.pop_n(field.kind().words() + if is_static { 0 } else { 1 })?;
        let frame: &Frame = frame;
        self.notify(|o| o.visit_field(&self.method_key, offset, field, frame, &taint));
        Ok(())
    }

    fn process_load(&self, frame: &mut Frame, offset: Offset, index: usize, words: usize) -> Result<(), StructuralError> {
        // the low slot ends up on top, mirroring `Store`
        for slot in (index..index + words).rev() {
            let taint = frame.local(slot)?;
            if taint.bound_slot() != Some(slot) {
                return Err(StructuralError::AliasMismatch {
                    slot,
                    bound: taint.bound_slot(),
                });
            }
            let taint = taint.clone();
            frame.push(taint);
        }
        let frame: &Frame = frame;
        self.notify(|o| o.visit_load(&self.method_key, offset, frame, words));
        Ok(())
    }

    fn process_array_store(&self, frame: &mut Frame, kind: ValueKind) -> Result<(), StructuralError> {
        let value = frame
            .pop_n(kind.words())?
            .iter()
            .fold(None, |acc: Option<Taint>, word| Taint::merge(acc.as_ref(), Some(word)));
        frame.pop()?; // index
        let array = frame.pop()?;
        let mut merged = match value {
            Some(value) => value.join(&array),
            None => array.clone(),
        };
        merged.set_bound_slot(array.bound_slot());
        merged.set_allocation_site(array.allocation_site());
        self.write_to_bound_local(frame, &merged)?;
        // a `dup`ed reference to the same array is still on the stack
        if frame.stack_depth() > 0 && frame.top()?.same_reference(&array) {
            frame.set_stack_value(0, merged)?;
        }
        Ok(())
    }

    fn process_invoke(&mut self, frame: &mut Frame, offset: Offset, call: &CallSite) -> Result<(), StructuralError> {
        if self.ctx.config().debug_print_invocations {
            debug!("{} @{}: invoking {} with {}", self.method_key, offset, call.signature(), frame);
        }
        let signature = MethodSignature::parse(&call.descriptor)?;
        let receiver_words = if call.is_static() { 0 } else { 1 };
        let consumed = signature.parameter_words() + receiver_words;
        let receiver_before = if call.is_constructor() && receiver_words == 1 {
            Some(frame.stack_value(consumed - 1)?.clone())
        } else {
            None
        };

        let config = MethodConfigResolver::new(self.ctx, &self.method_key).resolve(frame, call, &signature)?;
        let real_instance_class = config
            .as_ref()
            .and_then(MethodConfig::output_taint)
            .and_then(Taint::declared_runtime_type)
            .map(str::to_owned);
        let mut taint = self.method_taint(frame, config.as_ref(), offset)?;
        if self.ctx.config().debug_taint_state {
            taint = taint.with_debug_info(format!("{}()", call.name));
        }
        taint.add_source(TaintSource::new(SourceKind::Return, taint.state(), call.signature()));
        if taint.is_unknown() {
            taint.add_location(self.location(offset));
        }
        self.taint_mutable_arguments(frame, config.as_ref(), &signature, offset)?;
        if let Some(config) = &config {
            self.transfer_taint_to_mutables(frame, config, &taint)?;
        }

        let mut result = taint;
        result.set_declared_runtime_type(real_instance_class);
        result.set_bound_slot(None);
        result.set_allocation_site(None);
        if receiver_words == 1 {
            let receiver_index = signature.parameter_words();
            let mutates_receiver = config
                .as_ref()
                .map_or(false, |c| c.mutable_stack_indices().contains(&receiver_index));
            if mutates_receiver {
                // e.g. `StringBuilder.append` returns its (now updated) receiver
                let receiver = frame.stack_value(receiver_index)?;
                result.set_bound_slot(receiver.bound_slot());
                result.set_allocation_site(receiver.allocation_site());
            }
        }

        let parameters: Vec<Taint> = frame.stack()[frame.stack_depth().saturating_sub(consumed)..]
            .iter()
            .rev()
            .cloned()
            .collect();

        // `new X; dup; invokespecial X.<init>` leaves a second reference to the
        // object below the consumed words; it is the object just initialized.
        if let Some(receiver_before) = receiver_before {
            if frame.stack_depth() > consumed && frame.stack_value(consumed)?.same_reference(&receiver_before) {
                let initialized = frame.stack_value(consumed - 1)?.clone();
                frame.set_stack_value(consumed, initialized)?;
            }
        }

        frame.pop_n(consumed)?;
        push_words(frame, result, signature.return_words());
        let frame: &Frame = frame;
        self.notify(|o| o.visit_invoke(&self.method_key, offset, call, frame, &parameters));
        Ok(())
    }

    /// The taint of the value returned by a call described by `config`
    fn method_taint(&self, frame: &Frame, config: Option<&MethodConfig>, offset: Offset) -> Result<Taint, StructuralError> {
        let template = match config.and_then(MethodConfig::output_taint) {
            Some(template) => template,
            None => return Ok(Taint::unknown()),
        };
        let mut taint = if template.is_unknown() && template.has_parameters() {
            let mut merged: Option<Taint> = None;
            for &index in template.parameters() {
                merged = Taint::merge(merged.as_ref(), Some(frame.stack_value(index)?));
            }
            let non_parametric = Taint::new(template.non_parametric_state());
            match merged {
                Some(merged) => non_parametric.join(&merged),
                None => non_parametric,
            }
        } else {
            template.clone()
        };
        if taint.is_tainted() {
            taint.add_location(self.location(offset));
        }
        if !taint.is_safe() {
            for &tag in template.tags() {
                taint.add_tag(tag);
            }
        }
        for &tag in template.tags_to_remove() {
            taint.remove_tag(tag);
        }
        Ok(taint)
    }

    /// Without a configured summary we must assume the callee may store
    /// anything into the mutable objects it is passed
    fn taint_mutable_arguments(
        &self,
        frame: &mut Frame,
        config: Option<&MethodConfig>,
        signature: &MethodSignature,
        offset: Offset,
    ) -> Result<(), StructuralError> {
        if config.map_or(false, MethodConfig::is_configured) {
            return Ok(());
        }
        let taint_config = self.ctx.taint_config();
        for (index, ty) in signature.parameter_stack_indices() {
            if !is_reference(ty) || taint_config.is_immutable(ty) || taint_config.is_taint_safe(ty) {
                continue;
            }
            let value = frame.stack_value(index)?;
            let mut taint = value.join(&Taint::unknown());
            taint.set_bound_slot(value.bound_slot());
            taint.set_declared_runtime_type(value.declared_runtime_type().map(str::to_owned));
            taint.set_allocation_site(value.allocation_site());
            taint.add_location(self.location(offset));
            self.write_to_bound_local(frame, &taint)?;
            frame.set_stack_value(index, taint)?;
        }
        Ok(())
    }

    /// Give every argument the config marks mutable the taint of the result
    fn transfer_taint_to_mutables(&self, frame: &mut Frame, config: &MethodConfig, taint: &Taint) -> Result<(), StructuralError> {
        for &index in config.mutable_stack_indices() {
            if index >= frame.stack_depth() {
                // constructors and static initializers see this with configs
                // written for callers that hold more on the stack
                if self.method.is_constructor() || self.method.is_static_initializer() {
                    debug!(
                        "{}: mutable stack index {} is out of range (stack depth {})",
                        self.method_key,
                        index,
                        frame.stack_depth()
                    );
                } else {
                    warn!(
                        "{}: mutable stack index {} is out of range (stack depth {})",
                        self.method_key,
                        index,
                        frame.stack_depth()
                    );
                }
                continue;
            }
            let argument = frame.stack_value(index)?;
            let mut value = taint.clone();
            value.set_bound_slot(argument.bound_slot());
            value.set_declared_runtime_type(argument.declared_runtime_type().map(str::to_owned));
            value.set_allocation_site(argument.allocation_site());
            self.write_to_bound_local(frame, &value)?;
            frame.set_stack_value(index, value)?;
        }
        Ok(())
    }

    /// If `taint` is bound to a local, that local now holds `taint`
    fn write_to_bound_local(&self, frame: &mut Frame, taint: &Taint) -> Result<(), StructuralError> {
        if let Some(slot) = taint.bound_slot() {
            if slot < frame.num_locals() {
                frame.set_local(slot, taint.clone())?;
            } else {
                warn!(
                    "{}: value bound to local {}, but the frame only has {} local(s)",
                    self.method_key,
                    slot,
                    frame.num_locals()
                );
            }
        }
        Ok(())
    }

    fn location(&self, offset: Offset) -> TaintLocation {
        TaintLocation::new(self.method_key.as_str(), offset)
    }

    fn describe(&self, taint: Taint, info: impl FnOnce() -> String) -> Taint {
        if self.ctx.config().debug_taint_state {
            taint.with_debug_info(info())
        } else {
            taint
        }
    }

    fn notify<F>(&self, callback: F)
    where
        F: Fn(&dyn FrameObserver) -> Result<(), ObserverError>,
    {
        if !self.ctx.observers().is_empty() {
            notify_all(self.ctx.observers(), callback);
        }
    }
}

/// Push `words` copies of `taint`, one per stack word of the value
fn push_words(frame: &mut Frame, taint: Taint, words: usize) {
    for _ in 1..words {
        frame.push(taint.clone());
    }
    if words > 0 {
        frame.push(taint);
    }
}

fn process_stack_op(frame: &mut Frame, op: StackOp) -> Result<(), StructuralError> {
    match op {
        StackOp::Pop => {
            frame.pop()?;
        },
        StackOp::Pop2 => {
            frame.pop_n(2)?;
        },
        StackOp::Dup => {
            let top = frame.top()?.clone();
            frame.push(top);
        },
        StackOp::DupX1 => {
            let top = frame.pop()?;
            let below = frame.pop()?;
            frame.push(top.clone());
            frame.push(below);
            frame.push(top);
        },
        StackOp::Dup2 => {
            let top = frame.stack_value(0)?.clone();
            let below = frame.stack_value(1)?.clone();
            frame.push(below);
            frame.push(top);
        },
        StackOp::Swap => {
            let top = frame.pop()?;
            let below = frame.pop()?;
            frame.push(top);
            frame.push(below);
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary_store::SummaryStore;
    use crate::taint_config::StaticTaintConfig;
    use std::sync::Arc;

    fn context() -> AnalysisContext {
        AnalysisContext::new(Arc::new(StaticTaintConfig::new()), Arc::new(SummaryStore::new()))
    }

    fn method() -> MethodDescriptor {
        MethodDescriptor::new("com/example/Foo", "bar", "()V", true, 4)
    }

    #[test]
    fn load_checks_binding() {
        let ctx = context();
        let method = method();
        let mut transfer = TaintTransfer::new(&ctx, &method);
        let mut frame = Frame::new(4);
        let mut corrupted = Taint::tainted();
        corrupted.set_bound_slot(Some(0));
        frame.set_local(1, corrupted).unwrap();
        let load = Instruction::Load { index: 1, kind: ValueKind::Reference };
        assert_eq!(
            transfer.process_instruction(&mut frame, 0, &load),
            Err(StructuralError::AliasMismatch { slot: 1, bound: Some(0) }),
        );
    }

    #[test]
    fn wide_store_and_load() {
        let ctx = context();
        let method = method();
        let mut transfer = TaintTransfer::new(&ctx, &method);
        let mut frame = Frame::new(4);
        transfer.process_instruction(&mut frame, 0, &Instruction::Constant(Literal::Long(7))).unwrap();
        assert_eq!(frame.stack_depth(), 2);
        transfer.process_instruction(&mut frame, 1, &Instruction::Store { index: 2, kind: ValueKind::Long }).unwrap();
        assert_eq!(frame.stack_depth(), 0);
        assert_eq!(frame.local(2).unwrap().bound_slot(), Some(2));
        assert_eq!(frame.local(3).unwrap().bound_slot(), Some(3));
        transfer.process_instruction(&mut frame, 2, &Instruction::Load { index: 2, kind: ValueKind::Long }).unwrap();
        assert_eq!(frame.stack_depth(), 2);
        assert_eq!(frame.stack_value(0).unwrap().bound_slot(), Some(2));
        assert_eq!(frame.stack_value(1).unwrap().bound_slot(), Some(3));
        assert!(frame.top().unwrap().is_safe());
    }

    #[test]
    fn stack_shuffles() {
        let mut frame = Frame::new(0);
        frame.push(Taint::constant("a"));
        frame.push(Taint::constant("b"));
        process_stack_op(&mut frame, StackOp::Swap).unwrap();
        assert_eq!(frame.top().unwrap().constant_value(), Some("a"));
        process_stack_op(&mut frame, StackOp::DupX1).unwrap();
        let constants: Vec<_> = frame.stack().iter().map(|t| t.constant_value().unwrap()).collect();
        assert_eq!(constants, vec!["a", "b", "a"]);
        process_stack_op(&mut frame, StackOp::Dup2).unwrap();
        assert_eq!(frame.stack_depth(), 5);
        process_stack_op(&mut frame, StackOp::Pop2).unwrap();
        process_stack_op(&mut frame, StackOp::Pop).unwrap();
        assert_eq!(frame.stack_depth(), 2);
        assert_eq!(
            process_stack_op(&mut Frame::new(0), StackOp::Dup),
            Err(StructuralError::StackUnderflow { needed: 1, depth: 0 }),
        );
    }

    #[test]
    fn array_store_updates_duplicate_reference() {
        let ctx = context();
        let method = method();
        let mut transfer = TaintTransfer::new(&ctx, &method);
        let mut frame = Frame::new(4);
        for (offset, inst) in vec![
            Instruction::Constant(Literal::Int(1)),
            Instruction::NewArray { dimensions: 1 },
            Instruction::Stack(StackOp::Dup),
            Instruction::Constant(Literal::Int(0)),
            Instruction::Other { consumed: 0, produced: 1 },
            Instruction::ArrayStore { kind: ValueKind::Reference },
        ]
        .into_iter()
        .enumerate()
        {
            transfer.process_instruction(&mut frame, offset as Offset, &inst).unwrap();
        }
        assert_eq!(frame.stack_depth(), 1);
        assert!(frame.top().unwrap().is_unknown());
    }

    #[test]
    fn array_store_leaves_other_array_alone() {
        let ctx = context();
        let method = method();
        let mut transfer = TaintTransfer::new(&ctx, &method);
        let mut frame = Frame::new(4);
        for (offset, inst) in vec![
            Instruction::Constant(Literal::Int(1)),
            Instruction::NewArray { dimensions: 1 },
            Instruction::Constant(Literal::Int(1)),
            Instruction::NewArray { dimensions: 1 },
            Instruction::Constant(Literal::Int(0)),
            Instruction::Other { consumed: 0, produced: 1 },
            Instruction::ArrayStore { kind: ValueKind::Reference },
        ]
        .into_iter()
        .enumerate()
        {
            transfer.process_instruction(&mut frame, offset as Offset, &inst).unwrap();
        }
        // the first array looks just like the second one, but was allocated
        // elsewhere
        assert_eq!(frame.stack_depth(), 1);
        let first = frame.top().unwrap();
        assert!(first.is_safe());
        assert_eq!(first.allocation_site(), Some(1));
    }
}
