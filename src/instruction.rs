/// Bytecode offset of an instruction within its method
pub type Offset = u32;

/// Name of instance constructors
pub const CONSTRUCTOR_NAME: &str = "<init>";
/// Name of static initializers
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";

/// Category of a value as far as the operand stack is concerned
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// Number of stack words (and local slots) a value of this kind occupies
    pub fn words(self) -> usize {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            ValueKind::Int | ValueKind::Float | ValueKind::Reference => 1,
        }
    }

    /// Kind of a value with the given type descriptor, e.g. `J` or `Ljava/lang/String;`
    pub fn from_descriptor(ty: &str) -> Self {
        match ty.as_bytes().first() {
            Some(b'J') => ValueKind::Long,
            Some(b'D') => ValueKind::Double,
            Some(b'F') => ValueKind::Float,
            Some(b'L') | Some(b'[') => ValueKind::Reference,
            _ => ValueKind::Int,
        }
    }
}

/// A literal pushed by a constant-load instruction
#[derive(PartialEq, Clone, Debug)]
pub enum Literal {
    String(String),
    Int(i32),
    /// An int pushed as a character code, as done for `char` arguments
    Char(char),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
}

impl Eq for Literal {}

impl Literal {
    pub fn kind(&self) -> ValueKind {
        match self {
            Literal::String(_) | Literal::Null => ValueKind::Reference,
            Literal::Int(_) | Literal::Char(_) => ValueKind::Int,
            Literal::Long(_) => ValueKind::Long,
            Literal::Float(_) => ValueKind::Float,
            Literal::Double(_) => ValueKind::Double,
        }
    }
}

/// A field operand, e.g. `java/lang/System.out:Ljava/io/PrintStream;`
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl FieldRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Fully qualified signature used for configuration lookups, `owner.name`
    pub fn signature(&self) -> String {
        format!("{}.{}", self.owner.replace('.', "/"), self.name)
    }

    pub fn kind(&self) -> ValueKind {
        ValueKind::from_descriptor(&self.descriptor)
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum InvokeKind {
    Virtual,
    Interface,
    Special,
    Static,
}

/// The operand of an invoke instruction
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct CallSite {
    pub kind: InvokeKind,
    /// Class named by the instruction, in internal (slashed) form
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl CallSite {
    pub fn new(kind: InvokeKind, owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            kind,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.kind == InvokeKind::Static
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// `.name(descriptor)`, the key suffix used by method configs
    pub fn method_id(&self) -> String {
        format!(".{}{}", self.name, self.descriptor)
    }

    /// `owner.name(descriptor)`
    pub fn signature(&self) -> String {
        format!("{}{}", self.owner.replace('.', "/"), self.method_id())
    }
}

/// Operand stack shuffles which don't create new facts
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum StackOp {
    Pop,
    Pop2,
    Dup,
    DupX1,
    Dup2,
    Swap,
}

/// The instruction categories the transfer functions distinguish
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Instruction {
    /// `ldc`, `iconst_*`, `bipush`, `aconst_null`, ...
    Constant(Literal),
    /// `getfield` / `getstatic`
    GetField { field: FieldRef, is_static: bool },
    /// `putfield` / `putstatic`
    PutField { field: FieldRef, is_static: bool },
    /// `aload`, `iload`, ...
    Load { index: usize, kind: ValueKind },
    /// `astore`, `istore`, ...
    Store { index: usize, kind: ValueKind },
    /// `new`
    New { class: String },
    /// `newarray`, `anewarray`, `multianewarray`
    NewArray { dimensions: usize },
    /// `aastore`, `iastore`, ...
    ArrayStore { kind: ValueKind },
    /// `aaload`, `iaload`, ...
    ArrayLoad { kind: ValueKind },
    /// `checkcast`
    CheckCast { class: String },
    /// `areturn`, `ireturn`, ..., or `return` when `kind` is `None`
    Return { kind: Option<ValueKind> },
    /// `invokevirtual`, `invokeinterface`, `invokespecial`, `invokestatic`
    Invoke(CallSite),
    /// String concatenation of the given number of operands, e.g. the
    /// `makeConcatWithConstants` bootstrap
    Concat { operands: usize },
    Stack(StackOp),
    /// Anything else: pops `consumed` words and pushes `produced` default words
    Other { consumed: usize, produced: usize },
}

impl Instruction {
    pub fn is_invoke(&self) -> bool {
        matches!(self, Instruction::Invoke(_))
    }

    pub fn as_call_site(&self) -> Option<&CallSite> {
        match self {
            Instruction::Invoke(call) => Some(call),
            _ => None,
        }
    }
}
