use image::RgbImage;
use rayon::prelude::*;

use crate::geometry::ViewGeometry;
use crate::mesh::{Mesh, VertexColor};
use crate::misc::{get_pixel_as_vector3, vector3_to_rgb};
use crate::optimize::Votes;
use crate::view::{ViewId, ViewIndex, ViewMap};

fn observe_view(
    mesh: &Mesh,
    geometry: &ViewGeometry,
    id: ViewId,
    image: &RgbImage,
) -> Vec<Votes> {
    let mut observations = vec![Votes::empty(); mesh.vertices.len()];
    let (uvs, owners) = (&geometry.uvs[&id], &geometry.owners[&id]);

    for (f, face) in mesh.faces.iter().enumerate() {
        for &v in face {
            let uv = &uvs[v];
            if uv.depth <= 0.0 {
                continue;
            }
            let x = uv.point.x.round() as i64;
            let y = uv.point.y.round() as i64;
            let p = match owners.checked_pixel(x, y) {
                Some(p) => p,
                None => continue,
            };
            if !matches!(owners.get(p), Some(owner) if owner.face == f) {
                continue;
            }
            if p.x < image.width() && p.y < image.height() {
                let color = get_pixel_as_vector3(image, p.x, p.y);
                observations[v] += Votes::single(color);
            }
        }
    }

    observations
}

/// Vertex colors averaged over every (view, triangle) pair observing the
/// vertex. Unobserved vertices keep their mesh color.
pub fn project_colors(
    mesh: &Mesh,
    views: &ViewIndex,
    geometry: &ViewGeometry,
    images: &ViewMap<RgbImage>,
) -> Vec<VertexColor> {
    let observations = views
        .ids()
        .par_iter()
        .map(|id| observe_view(mesh, geometry, *id, &images[id]))
        .reduce(
            || vec![Votes::empty(); mesh.vertices.len()],
            |mut acc, other| {
                for (a, b) in acc.iter_mut().zip(other) {
                    *a += b;
                }
                acc
            },
        );

    observations
        .iter()
        .enumerate()
        .map(|(v, votes)| {
            if votes.count > 0.0 {
                vector3_to_rgb(&(votes.sum / votes.count)).0
            } else {
                mesh.vertex_color(v)
            }
        })
        .collect()
}
