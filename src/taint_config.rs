use crate::error::MissingTypeError;
use crate::frame::Frame;
use crate::method_config::MethodConfig;
use crate::taint::State;
use log::warn;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// The one class-hierarchy question the analysis asks
pub trait TypeHierarchy {
    /// Is `class` equal to, or a subtype of, `supertype`? Both are internal
    /// (slashed) class names.
    fn is_subtype(&self, class: &str, supertype: &str) -> Result<bool, MissingTypeError>;

    /// Called when a subtype query failed, after which `class` is treated as
    /// unrelated to `supertype`. Implementations keeping state should warn
    /// only once per missing type.
    fn report_missing(&self, error: &MissingTypeError, class: &str, supertype: &str) {
        warn!("{}; assuming {:?} is not a subtype of {:?}", error, class, supertype);
    }
}

/// Source and sink knowledge the analysis consults. Type arguments are type
/// descriptors (`Ljava/lang/String;`, `I`, `[B`) unless stated otherwise.
pub trait TaintConfig: TypeHierarchy + Send + Sync {
    /// Values of this type can never carry taint
    fn is_taint_safe(&self, ty: &str) -> bool;

    /// Instances of this type can't be modified by a callee
    fn is_immutable(&self, ty: &str) -> bool;

    /// State of values read from the field `owner.name`, or `default`
    fn field_taint_state(&self, field_signature: &str, default: State) -> State;

    /// A context-dependent config for a call made from `caller`, which wins
    /// over anything in the `SummaryStore`.
    ///
    /// `method_id` is `.name(descriptor)`.
    fn lookup_method_config(
        &self,
        _frame: &Frame,
        _caller: &str,
        _class: &str,
        _method_id: &str,
    ) -> Option<MethodConfig> {
        None
    }

    /// A config declared on a supertype of `class` for the same method
    fn lookup_super_method_config(&self, _class: &str, _method_id: &str) -> Option<MethodConfig> {
        None
    }
}

/// Is `class` a subtype of any of `supertypes`? Missing classes count as
/// "no", and are reported to the hierarchy.
pub fn is_subtype_of_any<H: TypeHierarchy + ?Sized>(hierarchy: &H, class: &str, supertypes: &[&str]) -> bool {
    for supertype in supertypes {
        match hierarchy.is_subtype(class, supertype) {
            Ok(true) => return true,
            Ok(false) => {},
            Err(e) => hierarchy.report_missing(&e, class, supertype),
        }
    }
    false
}

/// In-memory `TaintConfig`, populated programmatically.
///
/// Primitive types are always taint-safe and immutable.
#[derive(Default)]
pub struct StaticTaintConfig {
    safe_types: HashSet<String>,
    immutable_types: HashSet<String>,
    field_states: HashMap<String, State>,
    /// Map from internal class name to its direct supertypes
    supertypes: HashMap<String, Vec<String>>,
    /// Missing classes we already warned about
    reported_missing: Mutex<HashSet<String>>,
}

impl StaticTaintConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a type (descriptor) taint-safe. Safe types are also immutable.
    pub fn with_safe_type(mut self, ty: impl Into<String>) -> Self {
        let ty = ty.into();
        self.immutable_types.insert(ty.clone());
        self.safe_types.insert(ty);
        self
    }

    pub fn with_immutable_type(mut self, ty: impl Into<String>) -> Self {
        self.immutable_types.insert(ty.into());
        self
    }

    /// Declare the state of a field, by `owner.name` signature
    pub fn with_field_state(mut self, field_signature: impl Into<String>, state: State) -> Self {
        self.field_states.insert(field_signature.into(), state);
        self
    }

    /// Declare that `class` directly extends or implements `supertype`
    pub fn with_supertype(mut self, class: impl Into<String>, supertype: impl Into<String>) -> Self {
        self.supertypes.entry(class.into()).or_default().push(supertype.into());
        self
    }

    /// Whether `class` is a subtype of any of `supertypes`, logging unknown
    /// classes once
    pub fn is_subtype_of_any(&self, class: &str, supertypes: &[&str]) -> bool {
        is_subtype_of_any(self, class, supertypes)
    }

    /// Classes we warned about as missing so far
    pub fn reported_missing(&self) -> Vec<String> {
        let mut reported: Vec<String> = self.reported_missing.lock().iter().cloned().collect();
        reported.sort();
        reported
    }
}

fn is_primitive(ty: &str) -> bool {
    matches!(ty, "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z")
}

impl TypeHierarchy for StaticTaintConfig {
    fn is_subtype(&self, class: &str, supertype: &str) -> Result<bool, MissingTypeError> {
        if class == supertype || supertype == "java/lang/Object" {
            return Ok(true);
        }
        let mut seen = HashSet::new();
        let mut pending = vec![class];
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            match self.supertypes.get(current) {
                Some(direct) => {
                    if direct.iter().any(|s| s == supertype) {
                        return Ok(true);
                    }
                    pending.extend(direct.iter().map(String::as_str));
                },
                // the root of what we were told about; only an error if we
                // know nothing at all about the queried class
                None if current == class => {
                    return Err(MissingTypeError { class: class.into() });
                },
                None => {},
            }
        }
        Ok(false)
    }

    fn report_missing(&self, error: &MissingTypeError, class: &str, supertype: &str) {
        if self.reported_missing.lock().insert(error.class.clone()) {
            warn!("{}; assuming {:?} is not a subtype of {:?}", error, class, supertype);
        }
    }
}

impl TaintConfig for StaticTaintConfig {
    fn is_taint_safe(&self, ty: &str) -> bool {
        is_primitive(ty) || self.safe_types.contains(ty)
    }

    fn is_immutable(&self, ty: &str) -> bool {
        is_primitive(ty) || self.immutable_types.contains(ty)
    }

    fn field_taint_state(&self, field_signature: &str, default: State) -> State {
        self.field_states.get(field_signature).copied().unwrap_or(default)
    }
}
