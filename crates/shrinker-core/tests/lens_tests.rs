use proptest::prelude::*;
use shrinker_core::config::OptimizationLevel;
use shrinker_core::graph::factory::{ItemFactory, TypeRef};
use shrinker_core::lens::{GraphLens, NestedLensBuilder};
use shrinker_core::optimizer::Optimizer;
use shrinker_core::{AppView, MappingWriter, ShrinkerConfig};
use shrinker_test_helpers::{MockDiagnosticHandler, ProgramBuilder};
use std::collections::BTreeSet;
use std::sync::Arc;

const TYPE_COUNT: usize = 8;

fn types(factory: &mut ItemFactory) -> Vec<TypeRef> {
    (0..TYPE_COUNT)
        .map(|i| factory.create_type(&format!("Lcom/example/T{i};")))
        .collect()
}

/// Push one nested lens per layer; `layer[i]` is where type `i` goes.
/// A layer only maps the types that still exist after the layers before it.
fn chain(types: &[TypeRef], layers: &[Vec<usize>]) -> Arc<GraphLens> {
    let mut lens = GraphLens::identity();
    let mut live: BTreeSet<usize> = (0..types.len()).collect();
    for layer in layers {
        let mut builder = NestedLensBuilder::new();
        for &from in &live {
            builder.map_type(types[from], types[layer[from]]);
        }
        live = live.iter().map(|&from| layer[from]).collect();
        lens = builder.build(&lens).unwrap();
    }
    lens
}

fn layers() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0..TYPE_COUNT, TYPE_COUNT), 1..5)
}

proptest! {
    #[test]
    fn prop_lookup_composes_layers(layers in layers()) {
        let mut factory = ItemFactory::new();
        let types = types(&mut factory);
        let lens = chain(&types, &layers);
        prop_assert_eq!(lens.chain_len(), layers.len() + 1);

        for start in 0..TYPE_COUNT {
            let expected = layers.iter().fold(start, |index, layer| layer[index]);
            prop_assert_eq!(lens.lookup_type(types[start]), types[expected]);
        }
    }

    #[test]
    fn prop_original_types_contain_every_merged_type(layers in layers()) {
        let mut factory = ItemFactory::new();
        let types = types(&mut factory);
        let lens = chain(&types, &layers);

        for &ty in &types {
            let current = lens.lookup_type(ty);
            prop_assert!(lens.get_original_types(current).contains(&ty));
            // The representative is one of the types that ended up here
            let representative = lens.get_original_type(current);
            prop_assert_eq!(lens.lookup_type(representative), current);
        }
    }

    #[test]
    fn prop_unrelated_layer_does_not_change_lookup(
        layers in layers(),
        extra in prop::collection::vec(4..TYPE_COUNT, TYPE_COUNT - 4),
        position in 0usize..5,
    ) {
        let mut factory = ItemFactory::new();
        let types = types(&mut factory);
        // The extra layer only moves types among T4..T7
        let position = position.min(layers.len());
        let mut with_extra = Vec::new();
        with_extra.extend_from_slice(&layers[..position]);
        let mut extra_layer: Vec<usize> = (0..4).collect();
        extra_layer.extend(extra);
        with_extra.push(extra_layer);
        with_extra.extend_from_slice(&layers[position..]);

        let lens = chain(&types, &layers);
        let lens_with_extra = chain(&types, &with_extra);
        for start in 0..TYPE_COUNT {
            let at_extra = layers[..position].iter().fold(start, |index, layer| layer[index]);
            if at_extra < 4 {
                prop_assert_eq!(lens.lookup_type(types[start]), lens_with_extra.lookup_type(types[start]));
            }
        }
    }

    #[test]
    fn prop_identity_layers_change_nothing(count in 1usize..6) {
        let mut factory = ItemFactory::new();
        let types = types(&mut factory);
        let identity: Vec<Vec<usize>> = vec![(0..TYPE_COUNT).collect(); count];
        let lens = chain(&types, &identity);
        for &ty in &types {
            prop_assert_eq!(lens.lookup_type(ty), ty);
            prop_assert_eq!(lens.get_original_types(ty), vec![ty]);
        }
    }
}

#[test]
fn test_first_inserted_type_represents_a_merge() {
    let mut factory = ItemFactory::new();
    let types = types(&mut factory);
    let mut builder = NestedLensBuilder::new();
    builder.map_type(types[2], types[0]);
    builder.map_type(types[1], types[0]);
    builder.map_type(types[0], types[0]);
    let lens = builder.build(&GraphLens::identity()).unwrap();

    assert_eq!(lens.get_original_type(types[0]), types[2]);
    assert_eq!(lens.get_original_types(types[0]), vec![types[2], types[1], types[0]]);
}

// ============================================================================
// Flattening
// ============================================================================

fn merged_siblings(level: OptimizationLevel) -> (AppView, [TypeRef; 3], bool) {
    let mut builder = ProgramBuilder::new();
    let a = builder.class("Lcom/example/A;");
    let b = builder.class("Lcom/example/B;");
    let c = builder.class("Lcom/example/C;");
    for ty in [a, b, c] {
        let run = builder.virtual_method(ty, "run");
        let instance = builder.instantiate(ty);
        builder.call_virtual(instance, run);
    }
    let mut app = builder.build();

    let mut config = ShrinkerConfig::default();
    config.optimization_level = level;
    let mut optimizer = Optimizer::new(Arc::new(config), MockDiagnosticHandler::new());
    let summary = optimizer.optimize(&mut app).unwrap();
    (app, [a, b, c], summary.lens_flattened)
}

#[test]
fn test_o3_flattens_the_chain() {
    let (app, [a, b, c], flattened) = merged_siblings(OptimizationLevel::O3);
    assert!(flattened);
    let lens = app.graph_lens();
    assert!(lens.is_applied());
    assert_eq!(lens.chain_len(), 2);

    assert_eq!(lens.get_original_type(a), a);
    let mut originals = lens.get_original_types(a);
    originals.sort();
    let mut expected = vec![a, b, c];
    expected.sort();
    assert_eq!(originals, expected);
}

#[test]
fn test_o2_keeps_the_chain() {
    let (app, _, flattened) = merged_siblings(OptimizationLevel::O2);
    assert!(!flattened);
    assert!(!app.graph_lens().is_applied());
    assert!(app.graph_lens().chain_len() >= 2);
}

#[test]
fn test_mapping_survives_flattening() {
    for level in [OptimizationLevel::O2, OptimizationLevel::O3] {
        let (app, _, _) = merged_siblings(level);
        let mapping = MappingWriter::new(&app).write_to_string();
        assert!(mapping.contains("com.example.A -> com.example.A:"), "{level:?}");
        assert!(mapping.contains("# merged: com.example.B"), "{level:?}");
        assert!(mapping.contains("# merged: com.example.C"), "{level:?}");
        assert!(mapping.contains("void com.example.B.run() -> run$B"), "{level:?}");
        assert!(!mapping.contains("com.example.B -> "), "{level:?}");
    }
}
