use crate::taint::{State, Taint};
use std::collections::BTreeSet;

/// The taint effect of calling a method: what it returns, and which of its
/// arguments it may (re)taint.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct MethodConfig {
    /// Template for the return value, or `None` if nothing is known about it
    output_taint: Option<Taint>,

    /// Stack indices (counted from the top of the stack at the call) of the
    /// arguments which receive the output taint after the call
    mutable_stack_indices: BTreeSet<usize>,

    /// Written by a human rather than derived by the analysis
    configured: bool,
}

impl MethodConfig {
    pub fn new(configured: bool) -> Self {
        Self {
            output_taint: None,
            mutable_stack_indices: BTreeSet::new(),
            configured,
        }
    }

    /// A human-authored config returning `output_taint`
    pub fn configured(output_taint: Taint) -> Self {
        Self::new(true).with_output_taint(output_taint)
    }

    /// A config derived by analyzing the method body
    pub fn derived(output_taint: Taint) -> Self {
        Self::new(false).with_output_taint(output_taint)
    }

    /// The config of every method returning a taint-safe type
    pub fn safe() -> Self {
        Self::derived(Taint::safe())
    }

    /// Assume a constructor result depends on all of its arguments and may
    /// flow into any of them, the receiver included.
    ///
    /// `stack_size` is the number of words consumed by the call.
    pub fn default_constructor(stack_size: usize) -> Self {
        let mut output = Taint::parametric(0..stack_size);
        output.set_non_parametric_state(State::Safe);
        let mut config = Self::derived(output);
        config.mutable_stack_indices = (0..stack_size).collect();
        config
    }

    pub fn with_output_taint(mut self, output_taint: Taint) -> Self {
        self.output_taint = Some(output_taint);
        self
    }

    pub fn with_mutable_stack_index(mut self, index: usize) -> Self {
        self.mutable_stack_indices.insert(index);
        self
    }

    pub fn output_taint(&self) -> Option<&Taint> {
        self.output_taint.as_ref()
    }

    pub fn output_taint_mut(&mut self) -> Option<&mut Taint> {
        self.output_taint.as_mut()
    }

    pub fn mutable_stack_indices(&self) -> &BTreeSet<usize> {
        &self.mutable_stack_indices
    }

    pub fn has_mutable_stack_indices(&self) -> bool {
        !self.mutable_stack_indices.is_empty()
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Does this config tell us more than the default UNKNOWN result would?
    pub fn is_informative(&self) -> bool {
        if self.has_mutable_stack_indices() {
            return true;
        }
        match &self.output_taint {
            None => false,
            Some(taint) => {
                !taint.is_unknown()
                    || taint.has_parameters()
                    || taint.declared_runtime_type().is_some()
                    || !taint.tags().is_empty()
                    || !taint.tags_to_remove().is_empty()
            },
        }
    }
}
