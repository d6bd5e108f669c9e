use crate::instruction::Offset;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt;

/// How much we trust a value
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum State {
    /// Known not to carry attacker-controlled data
    Safe,
    /// Known to be `null`
    Null,
    /// Could be anything; we have no information
    Unknown,
    /// Known to carry attacker-controlled data
    Tainted,
    /// Produced from inconsistent facts. Absorbs everything it is merged with.
    Invalid,
}

impl State {
    /// Position in the danger ranking; `merge` keeps the higher one
    fn rank(self) -> u8 {
        match self {
            State::Safe => 0,
            State::Null => 1,
            State::Unknown => 2,
            State::Tainted => 3,
            State::Invalid => 4,
        }
    }

    /// The more dangerous of the two states
    pub fn merge(self, other: Self) -> Self {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }
}

/// Marker recording that a value went through an operation that escapes one
/// dangerous character
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum Tag {
    CrEncoded,
    LfEncoded,
    QuoteEncoded,
    ApostropheEncoded,
    LtEncoded,
}

impl Tag {
    /// Every tag, paired with the character whose replacement implies it
    pub const REPLACEMENTS: [(&'static str, Tag); 5] = [
        ("\r", Tag::CrEncoded),
        ("\n", Tag::LfEncoded),
        ("\"", Tag::QuoteEncoded),
        ("'", Tag::ApostropheEncoded),
        ("<", Tag::LtEncoded),
    ];
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Field,
    Return,
    Parameter,
}

/// Where a non-safe value came from
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct TaintSource {
    pub kind: SourceKind,
    pub state: State,
    /// Field or method signature, e.g. `java/lang/System.out` or
    /// `java/lang/String.trim()Ljava/lang/String;`
    pub signature: Option<String>,
}

impl TaintSource {
    pub fn new(kind: SourceKind, state: State, signature: impl Into<String>) -> Self {
        Self {
            kind,
            state,
            signature: Some(signature.into()),
        }
    }

    fn key(&self) -> (SourceKind, Option<&str>) {
        (self.kind, self.signature.as_deref())
    }
}

/// A program point in some method at which a value became non-safe
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord)]
pub struct TaintLocation {
    /// Method key, `owner.name(descriptor)`
    pub method: String,
    pub offset: u32,
}

impl TaintLocation {
    pub fn new(method: impl Into<String>, offset: u32) -> Self {
        Self {
            method: method.into(),
            offset,
        }
    }
}

impl fmt::Display for TaintLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.method, self.offset)
    }
}

/// The fact we track for every local slot and operand stack word
#[derive(Clone, Debug)]
pub struct Taint {
    state: State,
    tags: BTreeSet<Tag>,
    tags_to_remove: BTreeSet<Tag>,
    sources: Vec<TaintSource>,
    locations: Vec<TaintLocation>,
    /// Stack indices (counted from the top at a call) whose taint flows into
    /// this value. Only meaningful on method summaries.
    parameters: BTreeSet<usize>,
    /// The state this value has regardless of `parameters`
    non_parametric_state: State,
    constant_value: Option<String>,
    declared_runtime_type: Option<String>,
    bound_slot: Option<usize>,
    /// Offset of the `new`/`newarray` which created the object this value
    /// refers to, while that is still known
    allocation_site: Option<Offset>,
    debug_info: Option<String>,
}

impl Taint {
    pub fn new(state: State) -> Self {
        Self {
            state,
            tags: BTreeSet::new(),
            tags_to_remove: BTreeSet::new(),
            sources: Vec::new(),
            locations: Vec::new(),
            parameters: BTreeSet::new(),
            non_parametric_state: State::Safe,
            constant_value: None,
            declared_runtime_type: None,
            bound_slot: None,
            allocation_site: None,
            debug_info: None,
        }
    }

    pub fn safe() -> Self {
        Self::new(State::Safe)
    }

    pub fn unknown() -> Self {
        Self::new(State::Unknown)
    }

    pub fn tainted() -> Self {
        Self::new(State::Tainted)
    }

    pub fn null() -> Self {
        Self::new(State::Null)
    }

    /// A SAFE value holding the given literal
    pub fn constant(value: impl Into<String>) -> Self {
        let mut taint = Self::safe();
        taint.constant_value = Some(value.into());
        taint
    }

    /// An UNKNOWN value whose taint is that of the given call arguments
    pub fn parametric(parameters: impl IntoIterator<Item = usize>) -> Self {
        let mut taint = Self::unknown();
        taint.parameters = parameters.into_iter().collect();
        taint
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub fn is_safe(&self) -> bool {
        self.state == State::Safe
    }

    pub fn is_unknown(&self) -> bool {
        self.state == State::Unknown
    }

    pub fn is_tainted(&self) -> bool {
        self.state == State::Tainted
    }

    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn add_tag(&mut self, tag: Tag) {
        self.tags.insert(tag);
    }

    pub fn remove_tag(&mut self, tag: Tag) {
        self.tags.remove(&tag);
    }

    pub fn tags_to_remove(&self) -> &BTreeSet<Tag> {
        &self.tags_to_remove
    }

    /// Mark this (summary) value as stripping `tag` from call results
    pub fn add_tag_to_remove(&mut self, tag: Tag) {
        self.tags_to_remove.insert(tag);
    }

    pub fn sources(&self) -> &[TaintSource] {
        &self.sources
    }

    /// Add a provenance record, unless one with the same kind and signature
    /// is already present
    pub fn add_source(&mut self, source: TaintSource) {
        if !self.sources.iter().any(|s| s.key() == source.key()) {
            self.sources.push(source);
        }
    }

    pub fn locations(&self) -> &[TaintLocation] {
        &self.locations
    }

    pub fn add_location(&mut self, location: TaintLocation) {
        if !self.locations.contains(&location) {
            self.locations.push(location);
        }
    }

    pub fn parameters(&self) -> &BTreeSet<usize> {
        &self.parameters
    }

    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    pub fn add_parameter(&mut self, stack_index: usize) {
        self.parameters.insert(stack_index);
    }

    pub fn non_parametric_state(&self) -> State {
        self.non_parametric_state
    }

    pub fn set_non_parametric_state(&mut self, state: State) {
        self.non_parametric_state = state;
    }

    /// The state this value adds to a call result regardless of the call's
    /// arguments
    fn parametric_contribution(&self) -> State {
        if self.has_parameters() {
            self.non_parametric_state
        } else {
            self.state
        }
    }

    pub fn constant_value(&self) -> Option<&str> {
        self.constant_value.as_deref()
    }

    pub fn set_constant_value(&mut self, value: Option<String>) {
        self.constant_value = value;
    }

    pub fn declared_runtime_type(&self) -> Option<&str> {
        self.declared_runtime_type.as_deref()
    }

    pub fn set_declared_runtime_type(&mut self, class: Option<String>) {
        self.declared_runtime_type = class;
    }

    /// Index of the local this value was loaded from or stored to, if any
    pub fn bound_slot(&self) -> Option<usize> {
        self.bound_slot
    }

    pub fn set_bound_slot(&mut self, slot: Option<usize>) {
        self.bound_slot = slot;
    }

    pub fn allocation_site(&self) -> Option<Offset> {
        self.allocation_site
    }

    pub fn set_allocation_site(&mut self, offset: Option<Offset>) {
        self.allocation_site = offset;
    }

    /// Do both values certainly refer to the same object? Values whose
    /// object is neither bound to a local nor traced to its allocation are
    /// never considered the same.
    pub fn same_reference(&self, other: &Self) -> bool {
        (self.allocation_site.is_some() || self.bound_slot.is_some()) && self == other
    }

    pub fn debug_info(&self) -> Option<&str> {
        self.debug_info.as_deref()
    }

    pub fn with_debug_info(mut self, info: impl Into<String>) -> Self {
        self.debug_info = Some(info.into());
        self
    }

    /// Combine two facts observed at a join or consumed by one operation.
    ///
    /// `None` means "no fact yet" and is the identity.
    pub fn merge(a: Option<&Taint>, b: Option<&Taint>) -> Option<Taint> {
        match (a, b) {
            (None, None) => None,
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (Some(a), Some(b)) => Some(a.join(b)),
        }
    }

    /// Compute the join of two `Taint`s. The more dangerous state wins; tags
    /// only survive a join of two SAFE values; provenance is accumulated;
    /// everything else survives only if both sides agree.
    pub fn join(&self, other: &Self) -> Self {
        let state = self.state.merge(other.state);
        let parameters: BTreeSet<usize> = self.parameters.union(&other.parameters).copied().collect();
        // a side without parameters contributes all of its state
        let non_parametric_state = if parameters.is_empty() {
            self.non_parametric_state.merge(other.non_parametric_state)
        } else {
            self.parametric_contribution().merge(other.parametric_contribution())
        };
        let tags = if state == State::Safe {
            self.tags.union(&other.tags).copied().collect()
        } else {
            BTreeSet::new()
        };
        Self {
            state,
            tags,
            tags_to_remove: self.tags_to_remove.union(&other.tags_to_remove).copied().collect(),
            sources: self
                .sources
                .iter()
                .chain(other.sources.iter())
                .unique_by(|s| (s.kind, s.signature.clone()))
                .cloned()
                .collect(),
            locations: self
                .locations
                .iter()
                .chain(other.locations.iter())
                .unique()
                .cloned()
                .collect(),
            parameters,
            non_parametric_state,
            constant_value: agree(&self.constant_value, &other.constant_value),
            declared_runtime_type: agree(&self.declared_runtime_type, &other.declared_runtime_type),
            bound_slot: agree(&self.bound_slot, &other.bound_slot),
            allocation_site: agree(&self.allocation_site, &other.allocation_site),
            debug_info: agree(&self.debug_info, &other.debug_info),
        }
    }

    /// Join for string concatenation: like `join`, but two known literals
    /// produce their concatenation
    pub fn concat(&self, other: &Self) -> Self {
        let mut joined = self.join(other);
        if let (Some(left), Some(right)) = (&self.constant_value, &other.constant_value) {
            joined.constant_value = Some(format!("{}{}", left, right));
        }
        joined
    }
}

fn agree<T: PartialEq + Clone>(a: &Option<T>, b: &Option<T>) -> Option<T> {
    if a == b {
        a.clone()
    } else {
        None
    }
}

/// Order-insensitive comparison of two already de-duplicated lists
fn same_elements<T: PartialEq>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x))
}

// Provenance lists keep insertion order for reporting, but two facts that
// record the same provenance in a different order are the same fact. Sources
// are identified by kind and signature alone, as in `add_source`.
impl PartialEq for Taint {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
            && self.tags == other.tags
            && self.tags_to_remove == other.tags_to_remove
            && self.sources.len() == other.sources.len()
            && self.sources.iter().all(|s| other.sources.iter().any(|o| o.key() == s.key()))
            && same_elements(&self.locations, &other.locations)
            && self.parameters == other.parameters
            && self.non_parametric_state == other.non_parametric_state
            && self.constant_value == other.constant_value
            && self.declared_runtime_type == other.declared_runtime_type
            && self.bound_slot == other.bound_slot
            && self.allocation_site == other.allocation_site
            && self.debug_info == other.debug_info
    }
}

impl Eq for Taint {}

impl fmt::Display for Taint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.state)?;
        if let Some(info) = &self.debug_info {
            write!(f, " {}", info)?;
        }
        if !self.tags.is_empty() {
            write!(f, " {:?}", self.tags)?;
        }
        if let Some(slot) = self.bound_slot {
            write!(f, " @{}", slot)?;
        }
        Ok(())
    }
}
