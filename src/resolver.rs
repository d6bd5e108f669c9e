use crate::context::AnalysisContext;
use crate::descriptor::{class_descriptor, MethodSignature};
use crate::error::StructuralError;
use crate::frame::Frame;
use crate::instruction::CallSite;
use crate::method_config::MethodConfig;
use crate::taint::Tag;
use log::debug;

const STRING_CLASS: &str = "java/lang/String";

/// Picks the `MethodConfig` which describes a call
pub(crate) struct MethodConfigResolver<'a> {
    ctx: &'a AnalysisContext,
    /// Key of the method containing the call
    caller: &'a str,
}

impl<'a> MethodConfigResolver<'a> {
    pub(crate) fn new(ctx: &'a AnalysisContext, caller: &'a str) -> Self {
        Self { ctx, caller }
    }

    /// Resolve the config for `call`, seen with the frame as it is right before
    /// the call.
    ///
    /// Returns `None` if nothing is known, in which case the result of the
    /// call is UNKNOWN.
    pub(crate) fn resolve(
        &self,
        frame: &Frame,
        call: &CallSite,
        signature: &MethodSignature,
    ) -> Result<Option<MethodConfig>, StructuralError> {
        let class = self.instance_class_name(frame, call, signature)?;
        let method_id = call.method_id();
        let config = match self.lookup(frame, call, &class, &method_id) {
            Some(config) => Some(self.with_replace_tags(config, frame, &class, &call.name)?),
            None => None,
        };
        let taint_config = self.ctx.taint_config();

        if let Some(config) = &config {
            if config.is_configured() || config.is_informative() {
                return Ok(Some(config.clone()));
            }
        }
        if taint_config.is_taint_safe(signature.return_type()) {
            return Ok(Some(MethodConfig::safe()));
        }
        if config.is_some() {
            return Ok(config);
        }
        if call.is_constructor() && !taint_config.is_taint_safe(&class_descriptor(&class)) {
            let receiver = if call.is_static() { 0 } else { 1 };
            return Ok(Some(MethodConfig::default_constructor(signature.parameter_words() + receiver)));
        }
        debug!("No config for {}{} called from {}", class, method_id, self.caller);
        Ok(None)
    }

    /// The class the receiver is known to be an instance of, falling back to
    /// the class named by the instruction
    fn instance_class_name(
        &self,
        frame: &Frame,
        call: &CallSite,
        signature: &MethodSignature,
    ) -> Result<String, StructuralError> {
        if call.is_static() {
            return Ok(call.owner.replace('.', "/"));
        }
        let receiver = frame.stack_value(signature.parameter_words())?;
        Ok(match receiver.declared_runtime_type() {
            Some(class) => class.to_owned(),
            None => call.owner.replace('.', "/"),
        })
    }

    /// Configs are looked up by the receiver's class first, then by the
    /// class named at the call, then on supertypes
    fn lookup(&self, frame: &Frame, call: &CallSite, class: &str, method_id: &str) -> Option<MethodConfig> {
        let taint_config = self.ctx.taint_config();
        let store = self.ctx.store();
        let owner = call.owner.replace('.', "/");
        taint_config
            .lookup_method_config(frame, self.caller, class, method_id)
            .or_else(|| store.lookup(class, method_id))
            .or_else(|| if owner != class { store.lookup(&owner, method_id) } else { None })
            .or_else(|| taint_config.lookup_super_method_config(class, method_id))
            .or_else(|| store.super_method_config(taint_config, class, method_id))
    }

    /// A `String.replace` or `String.replaceAll` whose pattern is a known
    /// literal removes dangerous characters; record that as tags on a copy of
    /// the config.
    fn with_replace_tags(
        &self,
        config: MethodConfig,
        frame: &Frame,
        class: &str,
        method_name: &str,
    ) -> Result<MethodConfig, StructuralError> {
        if class != STRING_CLASS || (method_name != "replace" && method_name != "replaceAll") {
            return Ok(config);
        }
        // the pattern argument sits right below the replacement
        let literal = match frame.stack_value(1)?.constant_value() {
            Some(literal) => literal.to_owned(),
            None => return Ok(config),
        };
        let mut config = config;
        if let Some(output) = config.output_taint_mut() {
            for (replaced, tag) in Tag::REPLACEMENTS.iter() {
                let matches = if method_name == "replaceAll" {
                    literal.contains(replaced)
                } else {
                    literal == *replaced
                };
                if matches {
                    output.add_tag(*tag);
                }
            }
        }
        Ok(config)
    }
}
