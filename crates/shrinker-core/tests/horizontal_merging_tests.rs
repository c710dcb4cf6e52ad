use shrinker_core::config::HorizontalMergingOptions;
use shrinker_core::graph::class::MethodAccessFlags;
use shrinker_core::graph::code::{Instruction, InvokeType, MethodBody, ValueType};
use shrinker_core::graph::factory::TypeRef;
use shrinker_core::horizontalclassmerging::{HorizontalClassMerger, MergeGroup, CLASS_ID_FIELD_NAME};
use shrinker_core::optimizer::Optimizer;
use shrinker_core::{AppView, ShrinkerConfig};
use shrinker_test_helpers::fixtures::{code_of, ProgramBuilder};
use shrinker_test_helpers::MockDiagnosticHandler;
use std::sync::Arc;

fn merger() -> HorizontalClassMerger {
    HorizontalClassMerger::new(&HorizontalMergingOptions::default())
}

/// Three instantiated siblings, each declaring `void run()`, called from main
fn siblings_with_run() -> (AppView, [TypeRef; 3]) {
    let mut builder = ProgramBuilder::new();
    let a = builder.class("Lcom/example/A;");
    let b = builder.class("Lcom/example/B;");
    let c = builder.class("Lcom/example/C;");
    for ty in [a, b, c] {
        let run = builder.virtual_method(ty, "run");
        let instance = builder.instantiate(ty);
        builder.call_virtual(instance, run);
    }
    (builder.build(), [a, b, c])
}

// ============================================================================
// Grouping
// ============================================================================

#[test]
fn test_entry_point_holder_is_not_grouped() {
    let (app, [a, b, c]) = siblings_with_run();
    let groups = merger().compute_groups(&app);
    assert_eq!(groups, vec![MergeGroup::new(vec![a, b, c])]);
}

#[test]
fn test_groups_are_disjoint_and_non_trivial() {
    let mut builder = ProgramBuilder::new();
    let int = builder.factory.known().int_type;
    let mut classes = Vec::new();
    for (index, name) in ["A", "B", "C", "D", "E"].iter().enumerate() {
        let ty = builder.class(&format!("Lcom/example/{name};"));
        if index % 2 == 0 {
            builder.field(ty, "value", int);
        }
        builder.instantiate(ty);
        classes.push(ty);
    }
    let app = builder.build();

    let groups = merger().compute_groups(&app);
    assert_eq!(groups.len(), 2);
    let mut seen = Vec::new();
    for group in &groups {
        assert!(group.len() >= 2);
        for ty in group.iter() {
            assert!(!seen.contains(&ty), "class in two groups");
            seen.push(ty);
        }
    }
    assert_eq!(seen.len(), classes.len());
}

#[test]
fn test_grouping_is_deterministic() {
    let first = {
        let (app, _) = siblings_with_run();
        merger().compute_groups(&app)
    };
    for _ in 0..5 {
        let (app, _) = siblings_with_run();
        assert_eq!(merger().compute_groups(&app), first);
    }
}

#[test]
fn test_uninstantiated_class_is_split_off() {
    let mut builder = ProgramBuilder::new();
    let a = builder.class("Lcom/example/A;");
    let b = builder.class("Lcom/example/B;");
    let c = builder.class("Lcom/example/C;");
    let d = builder.class("Lcom/example/D;");
    builder.instantiate(a);
    builder.instantiate(b);
    // Live through a static call only
    let void = builder.factory.known().void_type;
    for ty in [c, d] {
        let helper = builder.method(
            ty,
            "helper",
            &[],
            void,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            |_, code, _| code.emit_return(None),
        );
        builder.main(|_, code| {
            code.emit_invoke(InvokeType::Static, helper, Vec::new(), None);
        });
    }
    let app = builder.build();

    let groups = merger().compute_groups(&app);
    assert_eq!(groups, vec![MergeGroup::new(vec![a, b]), MergeGroup::new(vec![c, d])]);
}

#[test]
fn test_runtime_type_check_excludes_class() {
    let mut builder = ProgramBuilder::new();
    let a = builder.class("Lcom/example/A;");
    let b = builder.class("Lcom/example/B;");
    let c = builder.class("Lcom/example/C;");
    let boolean = builder.factory.known().boolean_type;
    let mut instances = Vec::new();
    for ty in [a, b, c] {
        instances.push(builder.instantiate(ty));
    }
    builder.main(|_, code| {
        let out = code.new_value(ValueType::Type(boolean));
        code.emit(Instruction::InstanceOf {
            out,
            value: instances[0],
            class: b,
        });
    });
    let app = builder.build();

    let groups = merger().compute_groups(&app);
    assert_eq!(groups, vec![MergeGroup::new(vec![a, c])]);
}

#[test]
fn test_restricted_mode_skips_classes_with_fields() {
    let mut builder = ProgramBuilder::new();
    let int = builder.factory.known().int_type;
    let a = builder.class("Lcom/example/A;");
    let b = builder.class("Lcom/example/B;");
    let c = builder.class("Lcom/example/C;");
    let d = builder.class("Lcom/example/D;");
    builder.field(c, "count", int);
    builder.field(d, "count", int);
    for ty in [a, b, c, d] {
        builder.instantiate(ty);
    }
    let app = builder.build();

    let restricted = HorizontalClassMerger::new(&HorizontalMergingOptions {
        enable: true,
        restricted: true,
    });
    assert_eq!(restricted.compute_groups(&app), vec![MergeGroup::new(vec![a, b])]);
    assert_eq!(merger().compute_groups(&app).len(), 2);
}

// ============================================================================
// Merging
// ============================================================================

#[test]
fn test_merge_installs_class_id_dispatch() {
    let (mut app, [a, b, c]) = siblings_with_run();
    let summary = merger().run(&mut app).unwrap().unwrap();
    assert_eq!(summary.groups, 1);
    assert_eq!(summary.merged_classes, 2);
    assert!(!app.program.contains_class(b));
    assert!(!app.program.contains_class(c));

    let target = app.program.class(a).unwrap();
    let class_id = target
        .instance_fields()
        .iter()
        .find(|f| app.factory.field_name(f.reference) == CLASS_ID_FIELD_NAME);
    assert!(class_id.is_some());

    let dispatch = target
        .virtual_methods()
        .iter()
        .find_map(|m| match &m.body {
            Some(MethodBody::ClassIdDispatch(dispatch)) => Some(dispatch.clone()),
            _ => None,
        })
        .unwrap();
    let names: Vec<&str> = dispatch
        .cases
        .iter()
        .map(|&(_, method)| app.factory.method_name(method))
        .collect();
    assert_eq!(names, vec!["run$A", "run$B", "run$C"]);

    // The renamed copies are private direct methods now
    for &(_, method) in &dispatch.cases {
        let copy = target.lookup_method(method).unwrap();
        assert!(copy.is_direct());
    }
    // One constructor per merged class, two of them with extra parameters
    assert_eq!(target.instance_initializers().count(), 3);
}

#[test]
fn test_pipeline_leaves_no_reference_to_merged_classes() {
    let (mut app, [a, b, c]) = siblings_with_run();
    let mut optimizer = Optimizer::new(Arc::new(ShrinkerConfig::default()), MockDiagnosticHandler::new());
    let summary = optimizer.optimize(&mut app).unwrap();
    assert!(summary.passes_run.contains(&"horizontal-class-merging"));
    assert!(summary.rewritten_bodies > 0);

    let head = app.graph_lens().version();
    for (_, method) in app.program.methods() {
        let Some(code) = method.body.as_ref().and_then(MethodBody::as_code) else {
            continue;
        };
        assert_eq!(code.lens_version, head);
        for instruction in &code.instructions {
            if let Some(ty) = instruction.referenced_type() {
                assert!(ty != b && ty != c, "stale type in {instruction:?}");
            }
            if let Instruction::Invoke { method, .. } = instruction {
                let holder = app.factory.method(*method).holder;
                assert!(holder != b && holder != c, "stale invoke in {instruction:?}");
            }
        }
    }

    // main: new A, call the constructor, call run through the dispatch
    let main_type = app.factory.lookup_type("Lcom/example/Main;").unwrap();
    let main = app.program.class(main_type).unwrap().direct_methods()[0].reference;
    let code = code_of(&app, main).unwrap();
    let allocated: Vec<TypeRef> = code
        .instructions
        .iter()
        .filter_map(|i| match i {
            Instruction::NewInstance { class, .. } => Some(*class),
            _ => None,
        })
        .collect();
    assert_eq!(allocated, vec![a, a, a]);
    let nulls = code
        .instructions
        .iter()
        .filter(|i| matches!(i, Instruction::ConstNull { .. }))
        .count();
    // B's constructor takes one extra argument, C's two
    assert_eq!(nulls, 3);
}

#[test]
fn test_single_override_dispatches_to_inherited_method() {
    let mut builder = ProgramBuilder::new();
    let string = builder.factory.known().string_type;
    let object = builder.factory.known().object_type;
    let a = builder.class("Lcom/example/A;");
    let b = builder.class("Lcom/example/B;");
    let b_to_string = builder.method(b, "toString", &[], string, MethodAccessFlags::PUBLIC, |_, code, _| {
        let out = code.new_value(ValueType::Type(string));
        code.emit(Instruction::ConstString {
            out,
            value: "B".to_string(),
        });
        code.emit_return(Some(out));
    });
    let a_to_string = builder.factory.method_with_holder(b_to_string, a);
    let object_to_string = builder.factory.method_with_holder(b_to_string, object);
    for (ty, to_string) in [(a, a_to_string), (b, b_to_string)] {
        let instance = builder.instantiate(ty);
        builder.call_virtual(instance, to_string);
    }
    let mut app = builder.build();

    let summary = merger().run(&mut app).unwrap().unwrap();
    assert_eq!(summary.merged_classes, 1);

    let target = app.program.class(a).unwrap();
    let merged = target.lookup_method(a_to_string).unwrap();
    let Some(MethodBody::ClassIdDispatch(dispatch)) = &merged.body else {
        panic!("toString() was not dispatched: {:?}", merged.body);
    };
    assert_eq!(dispatch.fallback, Some(object_to_string));
    assert_eq!(dispatch.cases.len(), 1);
    let (class_id, copy) = dispatch.cases[0];
    assert_eq!(class_id, 1);
    assert_eq!(app.factory.method_name(copy), "toString$B");
    assert!(target
        .instance_fields()
        .iter()
        .any(|f| app.factory.field_name(f.reference) == CLASS_ID_FIELD_NAME));
}

#[test]
fn test_single_declaration_without_inherited_method_moves_as_is() {
    let mut builder = ProgramBuilder::new();
    let a = builder.class("Lcom/example/A;");
    let b = builder.class("Lcom/example/B;");
    let run = builder.virtual_method(b, "run");
    builder.instantiate(a);
    let instance = builder.instantiate(b);
    builder.call_virtual(instance, run);
    let mut app = builder.build();

    merger().run(&mut app).unwrap().unwrap();
    let moved = app.graph_lens().lookup_method(run, None, InvokeType::Virtual).reference;
    let target = app.program.class(a).unwrap();
    let method = target.lookup_method(moved).unwrap();
    assert!(matches!(method.body, Some(MethodBody::Code(_))));
    assert_eq!(app.factory.method_name(moved), "run");
    assert!(!target
        .instance_fields()
        .iter()
        .any(|f| app.factory.field_name(f.reference) == CLASS_ID_FIELD_NAME));
}

#[test]
fn test_source_field_shares_target_field_of_same_type() {
    let mut builder = ProgramBuilder::new();
    let int = builder.factory.known().int_type;
    let a = builder.class("Lcom/example/A;");
    let b = builder.class("Lcom/example/B;");
    let a_value = builder.field(a, "value", int);
    let b_value = builder.field(b, "value", int);
    builder.instantiate(a);
    builder.instantiate(b);
    let mut app = builder.build();

    merger().run(&mut app).unwrap().unwrap();
    let target = app.program.class(a).unwrap();
    assert_eq!(target.instance_fields().len(), 1);
    assert_eq!(app.graph_lens().lookup_field(b_value), a_value);
    assert_eq!(app.graph_lens().lookup_field(a_value), a_value);
}

#[test]
fn test_static_method_name_clash_is_renamed() {
    let mut builder = ProgramBuilder::new();
    let void = builder.factory.known().void_type;
    let a = builder.class("Lcom/example/A;");
    let b = builder.class("Lcom/example/B;");
    let access = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    let mut helpers = Vec::new();
    for ty in [a, b] {
        builder.instantiate(ty);
        let helper = builder.method(ty, "helper", &[], void, access, |_, code, _| code.emit_return(None));
        builder.main(|_, code| {
            code.emit_invoke(InvokeType::Static, helper, Vec::new(), None);
        });
        helpers.push(helper);
    }
    let mut app = builder.build();

    merger().run(&mut app).unwrap().unwrap();
    let moved = app.graph_lens().lookup_method(helpers[1], None, InvokeType::Static);
    assert_eq!(app.factory.method(moved.reference).holder, a);
    assert_eq!(app.factory.method_name(moved.reference), "helper$1");
    assert_eq!(
        app.graph_lens().lookup_method(helpers[0], None, InvokeType::Static).reference,
        helpers[0]
    );
}

#[test]
fn test_original_signatures_survive_merging() {
    let (mut app, [a, b, c]) = siblings_with_run();
    merger().run(&mut app).unwrap().unwrap();
    let lens = app.graph_lens();
    assert_eq!(lens.get_original_type(a), a);
    let mut originals = lens.get_original_types(a);
    originals.sort();
    let mut expected = vec![a, b, c];
    expected.sort();
    assert_eq!(originals, expected);
}
