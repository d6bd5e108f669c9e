use crate::error::StructuralError;
use crate::instruction::ValueKind;

/// A parsed method descriptor such as `(Ljava/lang/String;[IJ)V`
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct MethodSignature {
    parameters: Vec<String>,
    return_type: String,
}

impl MethodSignature {
    pub fn parse(descriptor: &str) -> Result<Self, StructuralError> {
        let invalid = |reason: &str| StructuralError::InvalidDescriptor {
            descriptor: descriptor.into(),
            reason: reason.into(),
        };
        let rest = descriptor.strip_prefix('(').ok_or_else(|| invalid("expected '('"))?;
        let close = rest.find(')').ok_or_else(|| invalid("expected ')'"))?;
        let (mut params, ret) = (&rest[..close], &rest[close + 1..]);
        let mut parameters = Vec::new();
        while !params.is_empty() {
            let len = field_type_len(params).ok_or_else(|| invalid("bad parameter type"))?;
            parameters.push(params[..len].to_owned());
            params = &params[len..];
        }
        if ret != "V" && field_type_len(ret) != Some(ret.len()) {
            return Err(invalid("bad return type"));
        }
        Ok(Self {
            parameters,
            return_type: ret.to_owned(),
        })
    }

    /// Parameter type descriptors, in declaration order
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Return type descriptor; `V` for void
    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn returns_void(&self) -> bool {
        self.return_type == "V"
    }

    /// Stack words taken by the parameters (not counting a receiver)
    pub fn parameter_words(&self) -> usize {
        self.parameters.iter().map(|p| ValueKind::from_descriptor(p).words()).sum()
    }

    /// Stack words pushed by a call returning this type
    pub fn return_words(&self) -> usize {
        if self.returns_void() {
            0
        } else {
            ValueKind::from_descriptor(&self.return_type).words()
        }
    }

    /// Pairs of (stack index counted from the top at the call, parameter
    /// type) for each parameter
    pub fn parameter_stack_indices(&self) -> Vec<(usize, &str)> {
        let total = self.parameter_words();
        let mut slot = 0;
        let mut indices = Vec::with_capacity(self.parameters.len());
        for param in &self.parameters {
            let words = ValueKind::from_descriptor(param).words();
            // a wide value is addressed through its topmost word
            indices.push((total - slot - words, param.as_str()));
            slot += words;
        }
        indices
    }
}

/// Length of the field type descriptor at the start of `s`
fn field_type_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let dims = bytes.iter().take_while(|&&b| b == b'[').count();
    match bytes.get(dims)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(dims + 1),
        b'L' => s[dims..].find(';').map(|end| dims + end + 1),
        _ => None,
    }
}

/// Whether a type descriptor names an object or array type
pub fn is_reference(ty: &str) -> bool {
    ty.starts_with('L') || ty.starts_with('[')
}

/// Type descriptor for an internal class name: `java/lang/String` becomes
/// `Ljava/lang/String;`. Array class names are already descriptors.
pub fn class_descriptor(class: &str) -> String {
    if class.starts_with('[') {
        class.to_owned()
    } else {
        format!("L{};", class.replace('.', "/"))
    }
}
