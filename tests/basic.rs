use bytecode_taint::*;
use std::sync::Arc;

fn init_logging() {
    // capture log messages with test harness
    let _ = env_logger::builder().is_test(true).try_init();
}

fn context(taint_config: StaticTaintConfig) -> AnalysisContext {
    AnalysisContext::new(Arc::new(taint_config), Arc::new(SummaryStore::new()))
}

fn string_method(name: &str, max_locals: usize) -> MethodDescriptor {
    MethodDescriptor::new("com/example/Basic", name, "()Ljava/lang/String;", true, max_locals)
}

fn areturn() -> Instruction {
    Instruction::Return { kind: Some(ValueKind::Reference) }
}

#[test]
fn returns_string_constant() {
    init_logging();
    let ctx = context(StaticTaintConfig::new());
    let method = string_method("constant", 0);
    let body = MethodBody::straight_line(vec![Instruction::Constant(Literal::String("hi".into())), areturn()]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap_or_else(|e| panic!("{}", e));
    let output = analysis.output_taint().unwrap();
    assert_eq!(output.state(), State::Safe);
    assert_eq!(output.constant_value(), Some("hi"));
}

#[test]
fn concatenates_constants() {
    init_logging();
    let ctx = context(StaticTaintConfig::new());
    let method = string_method("concat", 0);
    let body = MethodBody::straight_line(vec![
        Instruction::Constant(Literal::String("he".into())),
        Instruction::Constant(Literal::String("llo".into())),
        Instruction::Concat { operands: 2 },
        areturn(),
    ]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap();
    let output = analysis.output_taint().unwrap();
    assert!(output.is_safe());
    assert_eq!(output.constant_value(), Some("hello"));
}

#[test]
fn concatenation_with_unknown_is_unknown() {
    init_logging();
    let ctx = context(StaticTaintConfig::new());
    let method = MethodDescriptor::new("com/example/Basic", "greet", "(Ljava/lang/String;)Ljava/lang/String;", true, 1);
    let body = MethodBody::straight_line(vec![
        Instruction::Constant(Literal::String("hello ".into())),
        Instruction::Load { index: 0, kind: ValueKind::Reference },
        Instruction::Concat { operands: 2 },
        areturn(),
    ]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap();
    let output = analysis.output_taint().unwrap();
    assert!(output.is_unknown());
    assert_eq!(output.constant_value(), None);
    assert_eq!(output.bound_slot(), None);
}

#[test]
fn unconfigured_field_is_unknown() {
    init_logging();
    let ctx = context(StaticTaintConfig::new());
    let method = string_method("field", 0);
    let field = FieldRef::new("com/example/Settings", "name", "Ljava/lang/String;");
    let body = MethodBody::straight_line(vec![
        Instruction::GetField { field: field.clone(), is_static: true },
        areturn(),
    ]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap();

    let loaded = analysis.frame_at(1).unwrap().top().unwrap();
    assert_eq!(loaded.state(), State::Unknown);
    assert_eq!(loaded.locations(), &[TaintLocation::new(method.key(), 0)]);
    assert_eq!(loaded.sources().len(), 1);
    assert_eq!(loaded.sources()[0].kind, SourceKind::Field);
    assert_eq!(loaded.sources()[0].signature.as_deref(), Some("com/example/Settings.name"));
}

#[test]
fn configured_field_state() {
    init_logging();
    let ctx = context(
        StaticTaintConfig::new()
            .with_field_state("com/example/Settings.name", State::Safe)
            .with_field_state("com/example/Request.body", State::Tainted),
    );
    let method = string_method("fields", 0);
    let body = MethodBody::straight_line(vec![
        Instruction::GetField {
            field: FieldRef::new("com/example/Settings", "name", "Ljava/lang/String;"),
            is_static: true,
        },
        Instruction::GetField {
            field: FieldRef::new("com/example/Request", "body", "Ljava/lang/String;"),
            is_static: true,
        },
        Instruction::Stack(StackOp::Pop),
        areturn(),
    ]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap();
    let frame = analysis.frame_at(2).unwrap();
    let safe = frame.stack_value(1).unwrap();
    assert!(safe.is_safe());
    assert!(safe.locations().is_empty());
    assert_eq!(safe.sources().len(), 1);
    assert!(frame.top().unwrap().is_tainted());
    assert!(analysis.output_taint().unwrap().is_safe());
}

#[test]
fn store_then_load_keeps_binding() {
    init_logging();
    let ctx = context(StaticTaintConfig::new());
    let method = string_method("alias", 2);
    let body = MethodBody::straight_line(vec![
        Instruction::Constant(Literal::String("x".into())),
        Instruction::Store { index: 1, kind: ValueKind::Reference },
        Instruction::Load { index: 1, kind: ValueKind::Reference },
        areturn(),
    ]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap();
    let stored = analysis.frame_at(2).unwrap().local(1).unwrap();
    assert_eq!(stored.bound_slot(), Some(1));
    assert_eq!(stored.constant_value(), Some("x"));
    let loaded = analysis.frame_at(3).unwrap().top().unwrap();
    assert_eq!(loaded.bound_slot(), Some(1));
    assert_eq!(loaded.constant_value(), Some("x"));
    // bindings are not part of a method's summary
    assert_eq!(analysis.output_taint().unwrap().bound_slot(), Some(1));
    let summary = ctx.store().get(&method.key()).unwrap();
    assert_eq!(summary.output_taint().unwrap().bound_slot(), None);
}

#[test]
fn null_and_wide_constants() {
    init_logging();
    let ctx = context(StaticTaintConfig::new());
    let method = string_method("constants", 0);
    let body = MethodBody::straight_line(vec![
        Instruction::Constant(Literal::Double(1.5)),
        Instruction::Stack(StackOp::Pop2),
        Instruction::Constant(Literal::Null),
        areturn(),
    ]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap();
    let after_double = analysis.frame_at(1).unwrap();
    assert_eq!(after_double.stack_depth(), 2);
    assert!(after_double.stack().iter().all(Taint::is_safe));
    assert_eq!(analysis.output_taint().unwrap().state(), State::Null);
}

#[test]
fn char_constant_renders_as_character() {
    init_logging();
    let ctx = context(StaticTaintConfig::new());
    let method = MethodDescriptor::new("com/example/Basic", "ch", "()C", true, 0);
    let body = MethodBody::straight_line(vec![
        Instruction::Constant(Literal::Char('<')),
        Instruction::Return { kind: Some(ValueKind::Int) },
    ]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap();
    assert_eq!(analysis.output_taint().unwrap().constant_value(), Some("<"));
    // primitive return types never get summaries
    assert_eq!(analysis.commit_outcome(), None);
}

#[test]
fn checkcast_to_safe_type() {
    init_logging();
    let ctx = context(StaticTaintConfig::new().with_safe_type("Ljava/lang/Integer;"));
    let method = MethodDescriptor::new("com/example/Basic", "cast", "(Ljava/lang/Object;)Ljava/lang/Object;", true, 1);
    let body = MethodBody::straight_line(vec![
        Instruction::Load { index: 0, kind: ValueKind::Reference },
        Instruction::CheckCast { class: "java/lang/Integer".into() },
        Instruction::Stack(StackOp::Dup),
        Instruction::CheckCast { class: "java/lang/String".into() },
        areturn(),
    ]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap();
    assert!(analysis.frame_at(1).unwrap().top().unwrap().is_unknown());
    assert!(analysis.frame_at(2).unwrap().top().unwrap().is_safe());
    assert!(analysis.output_taint().unwrap().is_safe());
}

#[test]
fn parameters_on_entry() {
    init_logging();
    let ctx = context(StaticTaintConfig::new());
    let method = MethodDescriptor::new("com/example/Basic", "params", "(Ljava/lang/String;JI)V", false, 6);
    let body = MethodBody::straight_line(vec![Instruction::Return { kind: None }]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap();
    let entry = analysis.frame_at(0).unwrap();
    assert_eq!(entry.num_locals(), 6);
    for (slot, local) in entry.locals().iter().enumerate() {
        assert_eq!(local.bound_slot(), Some(slot));
    }
    // receiver, then the String: both parametric in their stack position
    let receiver = entry.local(0).unwrap();
    assert!(receiver.is_unknown());
    assert!(receiver.parameters().contains(&4));
    let string = entry.local(1).unwrap();
    assert!(string.is_unknown());
    assert!(string.parameters().contains(&3));
    assert_eq!(string.sources()[0].kind, SourceKind::Parameter);
    // long and int parameters are safe
    assert!(entry.local(2).unwrap().is_safe());
    assert!(entry.local(3).unwrap().is_safe());
    assert!(entry.local(4).unwrap().is_safe());
    // a plain local
    assert!(entry.local(5).unwrap().is_unknown());
    assert!(!entry.local(5).unwrap().has_parameters());
    assert_eq!(analysis.output_taint(), None);
    assert_eq!(analysis.commit_outcome(), None);
}

#[test]
fn stack_underflow_aborts_method() {
    init_logging();
    let ctx = context(StaticTaintConfig::new());
    let method = string_method("broken", 0);
    let body = MethodBody::straight_line(vec![Instruction::Stack(StackOp::Pop), areturn()]);
    let err = analyze_method(&ctx, &method, &body).unwrap_err();
    match &err {
        AnalysisError::Instruction { method: key, offset, instruction, .. } => {
            assert_eq!(key, &method.key());
            assert_eq!(*offset, 0);
            assert_eq!(instruction, &Instruction::Stack(StackOp::Pop));
        },
        _ => panic!("Expected an instruction error, got {:?}", err),
    }
    assert_eq!(err.structural(), &StructuralError::StackUnderflow { needed: 1, depth: 0 });
    assert!(ctx.store().is_empty());
}

#[test]
fn missing_successor_is_structural_error() {
    init_logging();
    let ctx = context(StaticTaintConfig::new());
    let method = string_method("dangling", 0);
    let mut body = MethodBody::new(0);
    body.insert(0, Instruction::Constant(Literal::Null), vec![7]);
    let err = analyze_method(&ctx, &method, &body).unwrap_err();
    assert_eq!(err.structural(), &StructuralError::UnknownLocation { offset: 7 });
}

#[test]
fn debug_info_is_attached_on_request() {
    init_logging();
    let mut config = Config::default();
    config.debug_taint_state = true;
    config.debug_print_instructions = true;
    let ctx = context(StaticTaintConfig::new()).with_config(config);
    let method = string_method("debug", 0);
    let body = MethodBody::straight_line(vec![
        Instruction::New { class: "java/lang/Object".into() },
        areturn(),
    ]);
    let analysis = analyze_method(&ctx, &method, &body).unwrap();
    let output = analysis.output_taint().unwrap();
    assert_eq!(output.debug_info(), Some("new java/lang/Object"));
    assert_eq!(output.declared_runtime_type(), Some("java/lang/Object"));
}
