//! # Store and Graph Benchmarks
//!
//! Run with: `cargo bench -p gemdflow-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use gemdflow_core::element::{Element, Ingredient, Material, MaterialsSequence, Process};
use gemdflow_core::encoder::thin_documents;
use gemdflow_core::graph::{GraphBuilder, GraphBuilderOptions, GraphScope};
use gemdflow_core::model::{
    EntityRef, Handle, MaterialTemplate, ProcessSpec, ProcessTemplate, collect_reachable,
};
use gemdflow_core::store::{SpecStore, StoresConfig};
use std::hint::black_box;
use tempfile::TempDir;

/// A chain of `size` sequences, each feeding its material into the next.
fn create_chain(size: usize) -> Vec<EntityRef> {
    let stores = StoresConfig::new();
    let pt = Handle::new(ProcessTemplate::new("Step"));
    let mt = Handle::new(MaterialTemplate::new("Intermediate"));
    let mut sequences: Vec<MaterialsSequence> = Vec::with_capacity(size);
    for i in 0..size {
        let sequence = MaterialsSequence::builder(format!("S{i}"))
            .ingredient(Ingredient::new(format!("Feed {i}"), &stores))
            .process(Process::new(format!("Step {i}"), &pt, &stores).expect("process"))
            .material(Material::new(format!("Intermediate {i}"), &mt, &stores).expect("material"))
            .build()
            .expect("sequence");
        sequence.link_within();
        if let Some(prior) = sequences.last() {
            sequence.link_prior(prior, &format!("Feed {i}"));
        }
        sequences.push(sequence);
    }
    let roots: Vec<EntityRef> = sequences
        .iter()
        .flat_map(MaterialsSequence::elements)
        .flat_map(|e: Element| e.entities())
        .collect();
    thin_documents(&roots).expect("uids");
    collect_reachable(&roots)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_spec_interning(c: &mut Criterion) {
    let mut group = c.benchmark_group("spec_interning");
    group.sample_size(10);

    for size in [10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let dir = TempDir::new().expect("tempdir");
                let mut store = SpecStore::open(dir.path(), "auto").expect("open");
                for i in 0..size {
                    // Every other spec duplicates its predecessor.
                    let spec = EntityRef::from(Handle::new(ProcessSpec::new(format!("Spec {}", i / 2))));
                    let _ = store.unique_version_of(&spec, true, true);
                }
                black_box(store.len())
            });
        });
    }

    group.finish();
}

fn bench_graph_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_building");

    for size in [10, 100, 500].iter() {
        let entities = create_chain(*size);
        for which in [GraphScope::Run, GraphScope::All] {
            let builder = GraphBuilder::new(GraphBuilderOptions {
                which,
                ..GraphBuilderOptions::default()
            });
            group.bench_with_input(
                BenchmarkId::new(format!("{which:?}"), size),
                &entities,
                |b, entities| {
                    b.iter(|| black_box(builder.build_from_entities(entities).expect("build")));
                },
            );
        }
    }

    group.finish();
}

fn bench_track(c: &mut Criterion) {
    let mut group = c.benchmark_group("track");
    let entities = create_chain(500);
    let built = GraphBuilder::default()
        .build_from_entities(&entities)
        .expect("build");
    let start = built
        .graph
        .nodes()
        .next()
        .map(|n| n.uid.clone())
        .expect("node");

    for depth in [5, 50].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            b.iter(|| black_box(built.graph.track(&start, depth)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spec_interning, bench_graph_building, bench_track);

criterion_main!(benches);
