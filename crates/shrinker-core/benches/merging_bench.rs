use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use shrinker_core::config::HorizontalMergingOptions;
use shrinker_core::optimizer::Optimizer;
use shrinker_core::{AppView, HorizontalClassMerger, ShrinkerConfig};
use shrinker_test_helpers::{MockDiagnosticHandler, ProgramBuilder};
use std::sync::Arc;

/// `class_count` instantiated siblings, each with `run()` and an int field on
/// every third class, plus one enum used from main
fn generate_program(class_count: usize) -> AppView {
    let mut builder = ProgramBuilder::new();
    let int = builder.factory.known().int_type;
    for i in 0..class_count {
        let ty = builder.class(&format!("Lcom/example/gen/C{i};"));
        if i % 3 == 0 {
            builder.field(ty, "value", int);
        }
        let run = builder.virtual_method(ty, "run");
        let instance = builder.instantiate(ty);
        builder.call_virtual(instance, run);
    }
    let (color, constants) = builder.enum_class("Lcom/example/gen/Color;", &["RED", "GREEN", "BLUE"]);
    builder.main(|_, code| {
        code.emit_static_get(constants[0], color);
    });
    builder.build()
}

fn bench_compute_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_groups");
    let merger = HorizontalClassMerger::new(&HorizontalMergingOptions::default());

    for class_count in [10, 100, 1000] {
        let app = generate_program(class_count);
        group.bench_with_input(BenchmarkId::new("classes", class_count), &app, |b, app| {
            b.iter(|| merger.compute_groups(black_box(app)))
        });
    }

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("horizontal_merging");
    group.sample_size(20);
    let merger = HorizontalClassMerger::new(&HorizontalMergingOptions::default());

    for class_count in [10, 100, 500] {
        group.bench_function(BenchmarkId::new("classes", class_count), |b| {
            b.iter_batched(
                || generate_program(class_count),
                |mut app| merger.run(&mut app).expect("Merging failed"),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    for class_count in [100, 500] {
        group.bench_function(BenchmarkId::new("O3", class_count), |b| {
            b.iter_batched(
                || generate_program(class_count),
                |mut app| {
                    let mut config = ShrinkerConfig::default();
                    config.optimization_level = shrinker_core::OptimizationLevel::O3;
                    let mut optimizer = Optimizer::new(Arc::new(config), MockDiagnosticHandler::new());
                    optimizer.optimize(&mut app).expect("Optimization failed")
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compute_groups, bench_merge, bench_pipeline);
criterion_main!(benches);
