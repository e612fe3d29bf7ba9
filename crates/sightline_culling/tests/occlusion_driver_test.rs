//! # Occlusion Driver Integration Test
//!
//! Runs the scene traversal driver against the recording backend and checks
//! which queries, depth passes and shading calls reach the renderer.

use std::cell::Cell;
use std::rc::Rc;

use sightline_core::{Aabb, Vec3};
use sightline_culling::{
    decode_frame, BackendCall, CellIndex, ConvexRegion, CullingConfig, CullingResult, Frustum,
    GridVolume, NodeHandle, RecordingBackend, Scene, SceneNode, SceneTraversalDriver, View,
    VisibilityCache,
};

fn cube(min: Vec3, size: f32) -> Aabb {
    Aabb::new(min, min + Vec3::splat(size))
}

fn scene(cells: [u32; 3]) -> CullingResult<Scene> {
    Ok(Scene::new(GridVolume::new(Vec3::ONE, cells)?))
}

fn whole_grid(scene: &Scene, direction: Vec3) -> ConvexRegion {
    ConvexRegion::from_aabb(&scene.grid().volume_bounds(), direction)
}

fn depth_passes(backend: &RecordingBackend) -> usize {
    backend.count(|c| matches!(c, BackendCall::DepthPass { .. }))
}

#[test]
fn test_single_populated_cell_issues_one_query() -> CullingResult<()> {
    let mut scene = scene([4, 4, 4])?;
    scene.insert_node(SceneNode::new(cube(Vec3::new(2.25, 2.25, 2.25), 0.5)));

    let mut backend = RecordingBackend::new();
    let mut driver = SceneTraversalDriver::for_scene(&scene, CullingConfig::default());
    let viewport = driver.register_viewport();
    let views = [View::new(viewport, whole_grid(&scene, Vec3::new(0.3, 0.5, 1.0)))];

    let stats = driver.render_frame(&mut scene, &views, &mut backend);

    assert_eq!(stats.cells_traversed, 64);
    assert_eq!(stats.cells_empty, 63);
    assert_eq!(stats.cell_queries, 1);
    assert_eq!(backend.queried_cells(), vec![CellIndex::new(2, 2, 2)]);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::SetupQuery)), 1);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::EndQuery)), 1);
    Ok(())
}

#[test]
fn test_visible_cell_trusted_for_success_window() -> CullingResult<()> {
    let mut scene = scene([4, 1, 1])?;
    scene.insert_node(SceneNode::new(cube(Vec3::new(1.25, 0.25, 0.25), 0.5)));

    let config = CullingConfig {
        success_duration: 3,
        ..CullingConfig::default()
    };
    let mut backend = RecordingBackend::new();
    let mut driver = SceneTraversalDriver::for_scene(&scene, config);
    let viewport = driver.register_viewport();
    let views = [View::new(viewport, whole_grid(&scene, Vec3::X))];

    // Frame 1 issues the query; frame 2 harvests it: visible through 2 + 3
    let issued = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!((issued.frame, issued.cell_queries, issued.nodes_queued), (1, 1, 0));

    for frame in 2..=5 {
        let stats = driver.render_frame(&mut scene, &views, &mut backend);
        assert_eq!(stats.frame, frame);
        assert_eq!(stats.cell_queries, 0, "frame {frame} must trust the cached answer");
        assert_eq!(stats.nodes_queued, 1, "frame {frame} renders the cell");
    }

    // Frame 6: record expired, re-query while still rendering
    let stats = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!((stats.frame, stats.cell_queries, stats.nodes_queued), (6, 1, 1));
    assert_eq!(decode_frame(driver.cache().cell_record(viewport, 1)), 5);
    Ok(())
}

#[test]
fn test_hidden_cell_is_not_rendered() -> CullingResult<()> {
    let mut scene = scene([4, 1, 1])?;
    scene.insert_node(SceneNode::new(cube(Vec3::new(0.25, 0.25, 0.25), 0.5)));
    scene.insert_node(SceneNode::new(cube(Vec3::new(3.25, 0.25, 0.25), 0.5)));

    let config = CullingConfig {
        failure_duration: 2,
        ..CullingConfig::default()
    };
    let mut backend = RecordingBackend::new().with_cell_visibility(|probe| probe.cell.x == 0);
    let mut driver = SceneTraversalDriver::for_scene(&scene, config);
    let viewport = driver.register_viewport();
    let views = [View::new(viewport, whole_grid(&scene, Vec3::X))];

    driver.render_frame(&mut scene, &views, &mut backend);
    let second = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!(second.cells_visible, 1);
    assert_eq!(second.nodes_queued, 1);
    assert_eq!(second.cell_queries, 0, "hidden answer coasts for two frames");

    // Hidden through frame 2 + 2
    let third = driver.render_frame(&mut scene, &views, &mut backend);
    let fourth = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!(third.cell_queries + fourth.cell_queries, 0);
    let fifth = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!(fifth.cell_queries, 1, "hidden cell re-queried after its window");
    assert_eq!(backend.queried_cells().last(), Some(&CellIndex::new(3, 0, 0)));
    Ok(())
}

#[test]
fn test_viewports_do_not_share_records() -> CullingResult<()> {
    let mut scene = scene([4, 1, 1])?;
    scene.insert_node(SceneNode::new(cube(Vec3::new(2.25, 0.25, 0.25), 0.5)));

    let mut backend =
        RecordingBackend::new().with_cell_visibility(|probe| probe.direction.x > 0.0);
    let mut driver = SceneTraversalDriver::for_scene(&scene, CullingConfig::default());
    let east = driver.register_viewport();
    let west = driver.register_viewport();
    let views = [
        View::new(east, whole_grid(&scene, Vec3::X)),
        View::new(west, whole_grid(&scene, -Vec3::X)),
    ];

    let first = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!(first.viewports, 2);
    assert_eq!(first.cell_queries, 2);

    driver.render_frame(&mut scene, &views, &mut backend);
    let cache = driver.cache();
    assert!(cache.is_visible(east, 2, 2));
    assert!(!cache.is_visible(west, 2, 2));
    assert_ne!(cache.cell_records(east), cache.cell_records(west));
    Ok(())
}

#[test]
fn test_identical_histories_stay_separate() {
    let mut cache = VisibilityCache::new(16);
    let a = cache.register_viewport();
    let b = cache.register_viewport();

    for frame in 1..=5 {
        cache.record_cell_result(a, 3, frame % 2 == 0, frame, 2, 0);
        cache.record_cell_result(b, 3, frame % 2 == 0, frame, 2, 0);
    }
    assert_eq!(cache.cell_records(a), cache.cell_records(b));

    cache.record_cell_result(a, 3, true, 9, 2, 0);
    assert_eq!(decode_frame(cache.cell_record(a, 3)), 11);
    assert_eq!(decode_frame(cache.cell_record(b, 3)), 6);
    assert!(cache.cell_records(b).iter().enumerate().all(|(i, r)| i == 3 || *r == 0));
}

#[test]
fn test_node_spanning_cells_queued_once() -> CullingResult<()> {
    let mut scene = scene([4, 1, 1])?;
    let wide = scene.insert_node(SceneNode::new(Aabb::new(
        Vec3::new(0.5, 0.25, 0.25),
        Vec3::new(3.5, 0.75, 0.75),
    )));

    let config = CullingConfig {
        cell_culling: false,
        ..CullingConfig::default()
    };
    let mut backend = RecordingBackend::new();
    let mut driver = SceneTraversalDriver::for_scene(&scene, config);
    let viewport = driver.register_viewport();
    let views = [View::new(viewport, whole_grid(&scene, Vec3::X))];

    let stats = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!(stats.cells_visible, 4);
    assert_eq!(stats.nodes_queued, 1);
    assert_eq!(depth_passes(&backend), 1);
    assert!(matches!(
        backend.calls().last(),
        Some(BackendCall::Render { nodes, .. }) if nodes == &[wide]
    ));

    // Next frame stamps again
    let stats = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!(stats.nodes_queued, 1);
    Ok(())
}

#[test]
fn test_flagged_node_gets_own_query() -> CullingResult<()> {
    let mut scene = scene([2, 1, 1])?;
    let plain = scene.insert_node(SceneNode::new(cube(Vec3::new(0.25, 0.25, 0.25), 0.5)).with_payload(1));
    let flagged = scene.insert_node(
        SceneNode::new(cube(Vec3::new(0.3, 0.3, 0.3), 0.2))
            .with_payload(2)
            .with_occlusion_cull(true),
    );

    let config = CullingConfig {
        cell_culling: false,
        ..CullingConfig::default()
    };
    let mut backend = RecordingBackend::new().with_node_visibility(|node| node.payload == 2);
    let mut driver = SceneTraversalDriver::for_scene(&scene, config);
    let viewport = driver.register_viewport();
    let views = [View::new(viewport, whole_grid(&scene, Vec3::X))];

    let first = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!(first.node_queries, 1);
    assert_eq!(first.nodes_queued, 1);
    assert_eq!(
        backend.count(|c| matches!(c, BackendCall::NodeQuery { payload: 2, .. })),
        1
    );

    backend.clear_calls();
    let second = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!(second.queries_harvested, 1);
    assert_eq!(second.node_queries, 0);
    assert_eq!(second.nodes_queued, 2);
    assert!(matches!(
        backend.calls().last(),
        Some(BackendCall::Render { nodes, .. }) if nodes == &[plain, flagged]
    ));

    // Node culling off: flag ignored
    driver.set_config(CullingConfig {
        cell_culling: false,
        node_culling: false,
        ..CullingConfig::default()
    });
    let third = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!((third.node_queries, third.nodes_queued), (0, 2));
    Ok(())
}

fn flagged_node_scene() -> CullingResult<(Scene, NodeHandle)> {
    let mut scene = scene([2, 1, 1])?;
    let node = scene.insert_node(
        SceneNode::new(cube(Vec3::new(0.25, 0.25, 0.25), 0.5)).with_occlusion_cull(true),
    );
    Ok((scene, node))
}

#[test]
fn test_visible_node_renders_while_requeried() -> CullingResult<()> {
    let (mut scene, node) = flagged_node_scene()?;
    let config = CullingConfig {
        success_duration: 2,
        cell_culling: false,
        ..CullingConfig::default()
    };
    let mut backend = RecordingBackend::new();
    let mut driver = SceneTraversalDriver::for_scene(&scene, config);
    let viewport = driver.register_viewport();
    let views = [View::new(viewport, whole_grid(&scene, Vec3::X))];

    let first = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!((first.node_queries, first.nodes_queued), (1, 0));

    // Harvested at 2, 6 and 10; each answer holds two frames, then the
    // expired record is re-queried without dropping the node
    for frame in 2..=13 {
        let stats = driver.render_frame(&mut scene, &views, &mut backend);
        let expected_queries = u32::from(matches!(frame, 5 | 9 | 13));
        assert_eq!(stats.frame, frame);
        assert_eq!(stats.nodes_queued, 1, "frame {frame} must keep the node");
        assert_eq!(stats.node_queries, expected_queries, "frame {frame}");
    }
    assert_eq!(decode_frame(driver.cache().node_record(viewport, node)), 12);
    assert_eq!(driver.pending_queries(), 1);
    Ok(())
}

#[test]
fn test_hidden_node_coasts_then_recovers() -> CullingResult<()> {
    let (mut scene, node) = flagged_node_scene()?;
    let config = CullingConfig {
        failure_duration: 2,
        cell_culling: false,
        ..CullingConfig::default()
    };
    let node_visible = Rc::new(Cell::new(false));
    let answer = Rc::clone(&node_visible);
    let mut backend = RecordingBackend::new().with_node_visibility(move |_| answer.get());
    let mut driver = SceneTraversalDriver::for_scene(&scene, config);
    let viewport = driver.register_viewport();
    let views = [View::new(viewport, whole_grid(&scene, Vec3::X))];

    let first = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!((first.node_queries, first.nodes_queued), (1, 0));

    // Hidden through frame 2 + 2: no queries, nothing drawn
    for frame in 2..=4 {
        let stats = driver.render_frame(&mut scene, &views, &mut backend);
        assert_eq!(stats.queries_harvested, u32::from(frame == 2));
        assert_eq!((stats.node_queries, stats.nodes_queued), (0, 0), "frame {frame}");
    }
    assert_eq!(decode_frame(driver.cache().node_record(viewport, node)), 4);

    node_visible.set(true);
    let fifth = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!((fifth.node_queries, fifth.nodes_queued), (1, 0));

    let sixth = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!((sixth.node_queries, sixth.nodes_queued), (0, 1));
    assert!(driver.cache().is_node_visible(viewport, node, 6));
    assert_eq!(decode_frame(driver.cache().node_record(viewport, node)), 10);
    Ok(())
}

#[test]
fn test_query_runs_close_before_depth_pass() -> CullingResult<()> {
    let mut scene = scene([4, 1, 1])?;
    for x in 0..4 {
        scene.insert_node(SceneNode::new(cube(Vec3::new(x as f32 + 0.25, 0.25, 0.25), 0.5)));
    }

    // Cells 0 and 1 visible, 2 and 3 hidden
    let mut backend = RecordingBackend::new().with_cell_visibility(|probe| probe.cell.x < 2);
    let mut driver = SceneTraversalDriver::for_scene(&scene, CullingConfig::default());
    let viewport = driver.register_viewport();
    let views = [View::new(viewport, whole_grid(&scene, Vec3::X))];

    // Frame 1: four queries in one run, nothing drawn
    let first = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!((first.cell_queries, first.query_batches, first.depth_passes), (4, 1, 0));

    // Visible answers hold through frame 6 and hidden ones are re-checked
    // on odd frames, so frame 7 re-queries all four cells
    for _ in 2..=6 {
        driver.render_frame(&mut scene, &views, &mut backend);
    }
    backend.clear_calls();
    let seventh = driver.render_frame(&mut scene, &views, &mut backend);
    assert_eq!(seventh.frame, 7);
    assert_eq!(seventh.cell_queries, 4);
    assert_eq!(seventh.depth_passes, 2);

    let calls: Vec<&str> = backend
        .calls()
        .iter()
        .map(|call| match call {
            BackendCall::SetupQuery => "setup",
            BackendCall::EndQuery => "end",
            BackendCall::CellQuery { .. } => "cell",
            BackendCall::NodeQuery { .. } => "node",
            BackendCall::QueryResult { .. } => "result",
            BackendCall::DepthPass { .. } => "depth",
            BackendCall::Render { .. } => "render",
        })
        .collect();
    assert_eq!(
        calls,
        vec![
            "setup", "cell", "end", "depth", // cell 0
            "setup", "cell", "end", "depth", // cell 1
            "setup", "cell", "cell", "end", // cells 2 and 3 share a run
            "render",
        ]
    );

    let with_query = backend.count(|c| matches!(c, BackendCall::DepthPass { query: Some(_), .. }));
    assert_eq!(with_query, 2);
    Ok(())
}

#[test]
fn test_frustum_outside_grid_renders_nothing() -> CullingResult<()> {
    let mut scene = scene([4, 4, 1])?;
    scene.insert_node(SceneNode::new(cube(Vec3::new(1.25, 1.25, 0.25), 0.5)));

    let mut backend = RecordingBackend::new();
    let mut driver = SceneTraversalDriver::for_scene(&scene, CullingConfig::default());
    let viewport = driver.register_viewport();
    let region = Frustum::perspective(Vec3::new(-1.0, 1.5, 0.5), -Vec3::X, Vec3::Z, 0.5, 1.0, 0.1, 10.0)
        .to_region();

    let stats = driver.render_frame(&mut scene, &[View::new(viewport, region)], &mut backend);
    assert_eq!(stats.cells_traversed, 0);
    assert_eq!(backend.calls().len(), 1);
    assert!(matches!(&backend.calls()[0], BackendCall::Render { nodes, .. } if nodes.is_empty()));
    Ok(())
}

#[test]
fn test_config_file_drives_durations() -> CullingResult<()> {
    let path = std::env::temp_dir().join(format!("sightline-config-{}.toml", std::process::id()));
    std::fs::write(&path, "success_duration = 0\nfrustum_test_nodes = false\n").map_err(|source| {
        sightline_culling::ConfigError::Io {
            path: path.display().to_string(),
            source,
        }
    })?;
    let config = CullingConfig::from_toml_file(&path)?;
    let _ = std::fs::remove_file(&path);

    assert_eq!(config.success_duration, 0);
    assert!(!config.frustum_test_nodes);

    let mut scene = scene([2, 1, 1])?;
    scene.insert_node(SceneNode::new(cube(Vec3::new(0.25, 0.25, 0.25), 0.5)));
    let mut backend = RecordingBackend::new();
    let mut driver = SceneTraversalDriver::for_scene(&scene, config);
    let viewport = driver.register_viewport();
    let views = [View::new(viewport, whole_grid(&scene, Vec3::X))];

    // With no success window, a visible cell is re-queried every other
    // frame and drawn every frame after the first
    let queued: Vec<(u32, u32)> = (0..5)
        .map(|_| {
            let stats = driver.render_frame(&mut scene, &views, &mut backend);
            (stats.cell_queries, stats.nodes_queued)
        })
        .collect();
    assert_eq!(queued, vec![(1, 0), (0, 1), (1, 1), (0, 1), (1, 1)]);
    Ok(())
}
