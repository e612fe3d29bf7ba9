//! # Traversal Benchmark
//!
//! Cost of enumerating a camera frustum over large grids, and of a full
//! driver frame against the recording backend.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sightline_core::{Aabb, Vec3};
use sightline_culling::{
    CullingConfig, Frustum, GridVolume, RecordingBackend, Scene, SceneNode, SceneTraversalDriver,
    SliceTraversal, View,
};

fn camera(extent: f32) -> Frustum {
    Frustum::perspective(
        Vec3::new(-1.0, extent * 0.4, extent * 0.5),
        Vec3::new(1.0, 0.3, -0.2),
        Vec3::Z,
        1.0,
        16.0 / 9.0,
        0.1,
        extent * 1.5,
    )
}

fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("slice_traversal");
    for cells in [16u32, 64, 128] {
        let grid = GridVolume::new(Vec3::ONE, [cells; 3]).unwrap();
        let region = camera(cells as f32).to_region();

        group.bench_with_input(BenchmarkId::from_parameter(cells), &cells, |b, _| {
            b.iter(|| {
                let count = SliceTraversal::new(&grid, &region, grid.full_range()).count();
                black_box(count)
            });
        });
    }
    group.finish();
}

fn bench_driver_frame(c: &mut Criterion) {
    let grid = GridVolume::new(Vec3::splat(4.0), [32, 32, 8]).unwrap();
    let mut scene = Scene::new(grid);

    // One node every other cell along x and y
    for x in (0..128).step_by(8) {
        for y in (0..128).step_by(8) {
            let min = Vec3::new(x as f32 + 1.0, y as f32 + 1.0, 1.0);
            scene.insert_node(SceneNode::new(Aabb::new(min, min + Vec3::splat(2.0))));
        }
    }

    let mut driver = SceneTraversalDriver::for_scene(&scene, CullingConfig::default());
    let viewport = driver.register_viewport();
    let views = [View::new(viewport, camera(128.0).to_region())];
    let mut backend = RecordingBackend::new();

    c.bench_function("driver_frame_32x32x8", |b| {
        b.iter(|| {
            backend.clear_calls();
            black_box(driver.render_frame(&mut scene, &views, &mut backend))
        });
    });
}

criterion_group!(benches, bench_traversal, bench_driver_frame);
criterion_main!(benches);
