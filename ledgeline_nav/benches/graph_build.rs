// Benchmarks for graph construction, incremental rebuild and search over a
// generated terraced level.

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use ledgeline_nav::builder::{apply_tile_added, build_graph};
use ledgeline_nav::planner::{PlanQuery, plan_path};
use ledgeline_nav::{Capabilities, Layer, NavConfig, TileCell, TileLevel, Vec2};

/// A floor `width` tiles wide with stepped terraces and floating ledges
/// every few columns.
fn terraced_level(width: i32) -> TileLevel {
    let mut level = TileLevel::new(1.0);
    for x in 0..width {
        let _ = level.insert(TileCell::new(x, 0), Layer::Ground);
        let step = (x / 6) % 3;
        for y in 1..=step {
            let _ = level.insert(TileCell::new(x, y), Layer::Ground);
        }
        if x % 9 == 4 {
            let _ = level.insert(TileCell::new(x, step + 3), Layer::Ground);
            let _ = level.insert(TileCell::new(x + 1, step + 3), Layer::Ground);
        }
    }
    level
}

fn bench_build(c: &mut Criterion) {
    let cfg = NavConfig::default();
    let level = terraced_level(200);
    c.bench_function("build_graph/200", |b| {
        b.iter(|| black_box(build_graph(black_box(&level), &cfg)))
    });
}

fn bench_region_rebuild(c: &mut Criterion) {
    let cfg = NavConfig::default();
    let level = terraced_level(200);
    let graph = build_graph(&level, &cfg);
    c.bench_function("apply_tile_added/200", |b| {
        b.iter_batched(
            || {
                let mut level = level.clone();
                let id = level
                    .insert(TileCell::new(100, 8), Layer::Ground)
                    .unwrap_or_else(|e| panic!("{e}"));
                (graph.clone(), level, id)
            },
            |(mut graph, level, id)| {
                if let Some(tile) = level.tile(id) {
                    black_box(apply_tile_added(&mut graph, &level, &cfg, tile));
                }
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_search(c: &mut Criterion) {
    let cfg = NavConfig::default();
    let level = terraced_level(200);
    let graph = build_graph(&level, &cfg);
    let query = PlanQuery {
        start: Vec2::new(0.0, 0.5),
        goal: Vec2::new(198.0, 0.5),
        start_on_ladder: false,
        capabilities: Capabilities::default(),
    };
    c.bench_function("plan_path/long", |b| {
        b.iter(|| black_box(plan_path(&graph, &cfg, black_box(&query))))
    });
}

criterion_group!(benches, bench_build, bench_region_rebuild, bench_search);
criterion_main!(benches);
