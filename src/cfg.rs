use crate::descriptor::MethodSignature;
use crate::error::StructuralError;
use crate::instruction::{Instruction, Offset, CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME};
use crate::summary_store::method_key;
use std::collections::BTreeMap;

/// Identifies the method being analyzed
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct MethodDescriptor {
    /// Declaring class, in internal (slashed) form
    pub class_name: String,
    pub name: String,
    /// JVM method descriptor, e.g. `(Ljava/lang/String;)I`
    pub descriptor: String,
    pub is_static: bool,
    /// Number of local variable slots the method uses
    pub max_locals: usize,
}

impl MethodDescriptor {
    pub fn new(
        class_name: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        is_static: bool,
        max_locals: usize,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            name: name.into(),
            descriptor: descriptor.into(),
            is_static,
            max_locals,
        }
    }

    /// `.name(descriptor)`
    pub fn method_id(&self) -> String {
        format!(".{}{}", self.name, self.descriptor)
    }

    /// `class.name(descriptor)`, the key of this method's summary
    pub fn key(&self) -> String {
        method_key(&self.class_name, &self.method_id())
    }

    pub fn signature(&self) -> Result<MethodSignature, StructuralError> {
        MethodSignature::parse(&self.descriptor)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == STATIC_INITIALIZER_NAME
    }
}

/// The control-flow graph of one method body, as produced by the bytecode
/// front end. Locations are bytecode offsets.
pub trait ControlFlowGraph {
    /// Where execution starts
    fn entry(&self) -> Offset;

    /// The instruction at `offset`, if there is one
    fn instruction(&self, offset: Offset) -> Option<&Instruction>;

    /// Locations control may reach directly after executing `offset`
    fn successors(&self, offset: Offset) -> &[Offset];
}

#[derive(PartialEq, Eq, Clone, Debug)]
struct Node {
    instruction: Instruction,
    successors: Vec<Offset>,
}

/// A `ControlFlowGraph` held in memory
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct MethodBody {
    nodes: BTreeMap<Offset, Node>,
    entry: Offset,
}

impl MethodBody {
    pub fn new(entry: Offset) -> Self {
        Self {
            nodes: BTreeMap::new(),
            entry,
        }
    }

    /// A body starting at offset 0 where each instruction falls through to the
    /// next, except returns, which end the method
    pub fn straight_line(instructions: impl IntoIterator<Item = Instruction>) -> Self {
        let instructions: Vec<Instruction> = instructions.into_iter().collect();
        let count = instructions.len() as Offset;
        let mut body = Self::new(0);
        for (offset, instruction) in (0..).zip(instructions) {
            let successors = match instruction {
                Instruction::Return { .. } => vec![],
                _ if offset + 1 < count => vec![offset + 1],
                _ => vec![],
            };
            body.insert(offset, instruction, successors);
        }
        body
    }

    /// Add (or replace) the instruction at `offset`
    pub fn insert(&mut self, offset: Offset, instruction: Instruction, successors: Vec<Offset>) {
        self.nodes.insert(offset, Node { instruction, successors });
    }

    /// Add a control-flow edge. Does nothing if `from` has no instruction.
    pub fn add_edge(&mut self, from: Offset, to: Offset) {
        if let Some(node) = self.nodes.get_mut(&from) {
            if !node.successors.contains(&to) {
                node.successors.push(to);
            }
        }
    }

    /// Replace all outgoing edges of `from`. Does nothing if `from` has no
    /// instruction.
    pub fn set_successors(&mut self, from: Offset, successors: Vec<Offset>) {
        if let Some(node) = self.nodes.get_mut(&from) {
            node.successors = successors;
        }
    }

    /// All offsets holding an instruction, lowest first
    pub fn offsets(&self) -> impl Iterator<Item = Offset> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl ControlFlowGraph for MethodBody {
    fn entry(&self) -> Offset {
        self.entry
    }

    fn instruction(&self, offset: Offset) -> Option<&Instruction> {
        self.nodes.get(&offset).map(|node| &node.instruction)
    }

    fn successors(&self, offset: Offset) -> &[Offset] {
        self.nodes.get(&offset).map(|node| node.successors.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Literal, ValueKind};

    #[test]
    fn straight_line_falls_through() {
        let body = MethodBody::straight_line(vec![
            Instruction::Constant(Literal::Int(1)),
            Instruction::Return { kind: Some(ValueKind::Int) },
            Instruction::Constant(Literal::Int(2)),
        ]);
        assert_eq!(body.successors(0), &[1]);
        assert!(body.successors(1).is_empty());
        assert!(body.successors(2).is_empty());
        assert!(body.instruction(3).is_none());
    }

    #[test]
    fn method_key() {
        let method = MethodDescriptor::new("com/example/Foo", "bar", "(I)Ljava/lang/String;", false, 2);
        assert_eq!(method.key(), "com/example/Foo.bar(I)Ljava/lang/String;");
        assert_eq!(method.method_id(), ".bar(I)Ljava/lang/String;");
    }
}
