mod common;

use std::path::Path;

use scene_tracer::{
    raytracing::{rebuild_triangle_buffer, GpuTriangle, TriangleBuffer},
    scene::{FilterMode, Model},
};

use common::{flat_scene, headless, triangle_mesh};

fn two_mesh_model() -> Model {
    let scene = flat_scene(vec![
        triangle_mesh("four", 4, 0.0),
        triangle_mesh("six", 6, 10.0),
    ]);
    let (_, device) = headless();
    Model::from_scene(Path::new("two-meshes"), &scene, FilterMode::Linear, &device).unwrap()
}

#[test]
fn triangles_follow_mesh_then_index_order() {
    let model = two_mesh_model();
    let triangles = rebuild_triangle_buffer(&model);

    assert_eq!(triangles.len(), 10);
    assert_eq!(triangles.len(), model.triangle_count());
    assert_eq!(triangles.as_bytes().len(), 10 * GpuTriangle::SIZE);

    let depths: Vec<f32> = triangles
        .records()
        .iter()
        .map(|triangle| triangle.positions[0].z)
        .collect();
    assert_eq!(
        depths,
        vec![0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0]
    );
}

#[test]
fn positions_are_points_and_normals_are_directions() {
    let triangles = TriangleBuffer::rebuild(&two_mesh_model());

    for triangle in triangles.records() {
        assert!(triangle.positions.iter().all(|position| position.w == 1.0));
        assert!(triangle.normals.iter().all(|normal| normal.w == 0.0));
    }
}

#[test]
fn normals_are_unit_length() {
    let triangles = TriangleBuffer::rebuild(&two_mesh_model());

    for normal in triangles.records().iter().flat_map(|triangle| triangle.normals) {
        assert!((normal.xyz().mag() - 1.0).abs() < 1e-4);
        assert!((normal.z - 1.0).abs() < 1e-4);
    }
}

#[test]
fn rebuilding_is_deterministic() {
    let model = two_mesh_model();
    let first = TriangleBuffer::rebuild(&model);
    let second = TriangleBuffer::rebuild(&model);

    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[test]
fn empty_models_have_no_triangles() {
    let (_, device) = headless();
    let model = Model::empty(Path::new("empty"), FilterMode::default(), &device);

    assert!(TriangleBuffer::rebuild(&model).is_empty());
}

#[test]
fn meshes_without_faces_are_kept_but_add_no_triangles() {
    let mut points = triangle_mesh("points", 2, 0.0);
    points.faces.clear();
    let scene = flat_scene(vec![points, triangle_mesh("triangle", 1, 5.0)]);

    let (headless, device) = headless();
    let model = Model::from_scene(Path::new("points"), &scene, FilterMode::Linear, &device)
        .unwrap();

    assert_eq!(model.meshes().len(), 2);
    assert_eq!(model.meshes()[0].vertices.len(), 6);
    assert!(model.meshes()[0].index_buffer().is_none());
    // a vertex buffer for both meshes, an index buffer only for the triangle
    assert_eq!(headless.live_buffer_count(), 3);

    let triangles = TriangleBuffer::rebuild(&model);
    assert_eq!(triangles.len(), 1);
    assert_eq!(triangles.records()[0].positions[0].z, 5.0);
}
