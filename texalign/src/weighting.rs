use rayon::prelude::*;

use crate::camera::Camera;
use crate::grid::Grid;
use crate::mesh::Mesh;
use crate::misc::Vector3;
use crate::raster::OwnershipBuffer;

pub type WeightBuffer = Grid<f32>;

/// Favors surface seen head-on from close by: cos²(normal, view) / distance².
pub fn vertex_weight(
    camera: &Camera,
    direction: &Vector3,
    vertex: usize,
    mesh: &Mesh,
) -> f64 {
    let normal = match mesh.normals.get(vertex) {
        Some(normal) => normal,
        None => return 0.0,
    };
    let norms = normal.norm_squared() * direction.norm_squared();
    let distance = camera
        .project_to_camera(&mesh.vertices[vertex])
        .coords
        .norm_squared();
    if norms == 0.0 || distance == 0.0 {
        return 0.0;
    }
    let cos = normal.dot(direction);
    cos * cos / norms / distance
}

pub fn vertex_weights(mesh: &Mesh, camera: &Camera) -> Vec<f64> {
    let direction = camera.view_direction();
    (0..mesh.vertices.len())
        .into_par_iter()
        .map(|v| vertex_weight(camera, &direction, v, mesh))
        .collect()
}

/// Interpolates vertex weights over the pixels each triangle owns.
pub fn rasterize_weights(
    mesh: &Mesh,
    weights: &[f64],
    owners: &OwnershipBuffer,
) -> WeightBuffer {
    let (width, height) = owners.dimensions();
    Grid::par_from_fn(width, height, |p| match owners.get(p) {
        Some(owner) => {
            let face = mesh.faces[owner.face];
            owner.interpolate(face.map(|v| weights[v])).max(0.0) as f32
        }
        None => 0.0,
    })
}
