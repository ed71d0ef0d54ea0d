use rayon::prelude::*;

use crate::camera::{Camera, ProjectedPoint};
use crate::grid::{Grid, Pixel};
use crate::mesh::Mesh;
use crate::misc::Vector2;

/// Projection of every mesh vertex into one view.
pub type UvMap = Vec<ProjectedPoint>;

pub fn project_vertices(mesh: &Mesh, camera: &Camera) -> UvMap {
    mesh.vertices
        .par_iter()
        .map(|v| camera.project_to_img(v))
        .collect()
}

/// Screen-space (affine) barycentric coordinates of a 2D triangle.
pub struct BarycentricCoordinateSystem {
    vertices: [Vector2; 3],
    det: f64,
}

impl BarycentricCoordinateSystem {
    pub fn new(vertices: [Vector2; 3]) -> Option<Self> {
        let [v1, v2, v3] = vertices;
        let det = (v1.x - v3.x) * (v2.y - v3.y) - (v2.x - v3.x) * (v1.y - v3.y);
        if det == 0.0 || !det.is_finite() {
            None
        } else {
            Some(Self { vertices, det })
        }
    }

    pub fn infer(&self, x: f64, y: f64) -> [f64; 3] {
        let [v1, v2, v3] = self.vertices;
        let l0 = ((v2.y - v3.y) * (x - v3.x) + (v3.x - v2.x) * (y - v3.y))
            / self.det;
        let l1 = ((v3.y - v1.y) * (x - v3.x) + (v1.x - v3.x) * (y - v3.y))
            / self.det;
        [l0, l1, 1.0 - l0 - l1]
    }

    pub fn apply(&self, lambdas: [f64; 3]) -> Vector2 {
        let [v1, v2, v3] = self.vertices;
        v1 * lambdas[0] + v2 * lambdas[1] + v3 * lambdas[2]
    }
}

pub fn all_nonneg(lambdas: &[f64; 3]) -> bool {
    lambdas.iter().all(|&l| l >= 0.0)
}

/// Depth interpolated as 1/z = Σ λk / zk.
pub fn interpolate_depth(lambdas: &[f64; 3], depths: [f64; 3]) -> f64 {
    let inverse: f64 = lambdas.iter().zip(depths).map(|(l, z)| l / z).sum();
    1.0 / inverse
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ownership {
    pub face: usize,
    pub lambdas: [f32; 3],
}

impl Ownership {
    pub fn interpolate(&self, values: [f64; 3]) -> f64 {
        self.lambdas
            .iter()
            .zip(values)
            .map(|(&l, v)| l as f64 * v)
            .sum()
    }

    pub fn interpolate_point(&self, points: [Vector2; 3]) -> Vector2 {
        Vector2::new(
            self.interpolate([points[0].x, points[1].x, points[2].x]),
            self.interpolate([points[0].y, points[1].y, points[2].y]),
        )
    }
}

pub type OwnershipBuffer = Grid<Option<Ownership>>;

struct PixelBounds {
    min: (u32, u32),
    max: (u32, u32),
}

impl PixelBounds {
    /// Integer pixels spanned by the points, restricted to the image.
    fn bounding(points: &[Vector2; 3], width: u32, height: u32) -> Option<Self> {
        let fold = |f: fn(f64, f64) -> f64, init: f64, axis: usize| {
            points.iter().map(|p| p[axis]).fold(init, f)
        };
        let (min_x, max_x) = (
            fold(f64::min, f64::INFINITY, 0).floor().max(0.0),
            fold(f64::max, f64::NEG_INFINITY, 0).ceil().min(width as f64 - 1.0),
        );
        let (min_y, max_y) = (
            fold(f64::min, f64::INFINITY, 1).floor().max(0.0),
            fold(f64::max, f64::NEG_INFINITY, 1).ceil().min(height as f64 - 1.0),
        );
        if min_x > max_x || min_y > max_y {
            None
        } else {
            Some(Self {
                min: (min_x as u32, min_y as u32),
                max: (max_x as u32, max_y as u32),
            })
        }
    }
}

/// Z-buffers every triangle of the mesh into one view. Triangles are
/// visited in mesh order and only replace an owner with a strictly smaller
/// depth. Triangles with a vertex at or behind the camera plane are skipped.
pub fn rasterize_view(
    mesh: &Mesh,
    uv: &UvMap,
    width: u32,
    height: u32,
) -> OwnershipBuffer {
    let mut owners = Grid::new(width, height, None);
    let mut depths = Grid::new(width, height, f64::INFINITY);

    for (face, triangle) in mesh.faces.iter().enumerate() {
        let corners = triangle.map(|v| uv[v]);
        if !corners.iter().all(|c| c.depth > 0.0) {
            continue;
        }

        let points = corners.map(|c| c.point);
        let system = match BarycentricCoordinateSystem::new(points) {
            Some(system) => system,
            None => continue,
        };
        let bounds = match PixelBounds::bounding(&points, width, height) {
            Some(bounds) => bounds,
            None => continue,
        };
        let corner_depths = corners.map(|c| c.depth);

        for y in bounds.min.1..=bounds.max.1 {
            for x in bounds.min.0..=bounds.max.0 {
                let lambdas = system.infer(x as f64, y as f64);
                if !all_nonneg(&lambdas) {
                    continue;
                }

                let p = Pixel::new(x, y);
                let depth = interpolate_depth(&lambdas, corner_depths);
                if depth < *depths.get(p) {
                    depths.set(p, depth);
                    owners.set(
                        p,
                        Some(Ownership {
                            face,
                            lambdas: lambdas.map(|l| l as f32),
                        }),
                    );
                }
            }
        }
    }

    owners
}
