use crate::error::StructuralError;
use crate::taint::Taint;
use itertools::Itertools;
use std::fmt;

/// The taint facts at one program point: the method's local slots plus its
/// operand stack
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Frame {
    locals: Vec<Taint>,
    /// Bottom of the stack first
    stack: Vec<Taint>,
}

impl Frame {
    /// A frame with `num_locals` UNKNOWN locals, each bound to its own slot,
    /// and an empty stack
    pub fn new(num_locals: usize) -> Self {
        Self {
            locals: (0..num_locals)
                .map(|slot| {
                    let mut taint = Taint::unknown();
                    taint.set_bound_slot(Some(slot));
                    taint
                })
                .collect(),
            stack: Vec::new(),
        }
    }

    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    pub fn locals(&self) -> &[Taint] {
        &self.locals
    }

    pub fn local(&self, slot: usize) -> Result<&Taint, StructuralError> {
        let num_locals = self.locals.len();
        self.locals.get(slot).ok_or(StructuralError::InvalidSlot { slot, num_locals })
    }

    pub fn set_local(&mut self, slot: usize, taint: Taint) -> Result<(), StructuralError> {
        let num_locals = self.locals.len();
        match self.locals.get_mut(slot) {
            Some(local) => {
                *local = taint;
                Ok(())
            },
            None => Err(StructuralError::InvalidSlot { slot, num_locals }),
        }
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Stack contents, bottom first
    pub fn stack(&self) -> &[Taint] {
        &self.stack
    }

    pub fn push(&mut self, taint: Taint) {
        self.stack.push(taint);
    }

    pub fn pop(&mut self) -> Result<Taint, StructuralError> {
        self.stack.pop().ok_or(StructuralError::StackUnderflow { needed: 1, depth: 0 })
    }

    /// Pop `count` words, returning them top first
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<Taint>, StructuralError> {
        self.require(count)?;
        let split = self.stack.len() - count;
        let mut popped = self.stack.split_off(split);
        popped.reverse();
        Ok(popped)
    }

    pub fn top(&self) -> Result<&Taint, StructuralError> {
        self.stack_value(0)
    }

    /// The value `index` words below the top of the stack
    pub fn stack_value(&self, index: usize) -> Result<&Taint, StructuralError> {
        let location = self.stack_location(index)?;
        Ok(&self.stack[location])
    }

    pub fn set_stack_value(&mut self, index: usize, taint: Taint) -> Result<(), StructuralError> {
        let location = self.stack_location(index)?;
        self.stack[location] = taint;
        Ok(())
    }

    /// Position (from the bottom) of the value `index` words below the top
    pub fn stack_location(&self, index: usize) -> Result<usize, StructuralError> {
        self.require(index + 1)?;
        Ok(self.stack.len() - 1 - index)
    }

    fn require(&self, needed: usize) -> Result<(), StructuralError> {
        if self.stack.len() < needed {
            Err(StructuralError::StackUnderflow {
                needed,
                depth: self.stack.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Update this frame with the join of itself and `other`, slot by slot.
    ///
    /// Returns `true` if this frame changed.
    pub fn join_from(&mut self, other: &Frame) -> Result<bool, StructuralError> {
        if self.locals.len() != other.locals.len() {
            return Err(StructuralError::LocalCountMismatch {
                left: self.locals.len(),
                right: other.locals.len(),
            });
        }
        if self.stack.len() != other.stack.len() {
            return Err(StructuralError::StackDepthMismatch {
                left: self.stack.len(),
                right: other.stack.len(),
            });
        }
        let mut changed = false;
        for (mine, theirs) in self
            .locals
            .iter_mut()
            .chain(self.stack.iter_mut())
            .zip(other.locals.iter().chain(other.stack.iter()))
        {
            let joined = mine.join(theirs);
            if joined != *mine {
                *mine = joined;
                changed = true;
            }
        }
        Ok(changed)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "locals: [{}] stack: [{}]",
            self.locals.iter().join(", "),
            self.stack.iter().join(", "),
        )
    }
}
