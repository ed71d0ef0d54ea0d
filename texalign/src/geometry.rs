use std::time::Instant;

use log::info;

use crate::camera::Camera;
use crate::correspondence::{CorrespondenceTable, Correspondences};
use crate::misc::log_elapsed;
use crate::mesh::Mesh;
use crate::raster::{project_vertices, rasterize_view, OwnershipBuffer, UvMap};
use crate::view::{ViewId, ViewIndex, ViewMap};
use crate::weighting::{rasterize_weights, vertex_weights, WeightBuffer};

/// Per-view buffers derived from the mesh and the cameras at one
/// resolution. Each pass reads only fully built results of earlier passes.
pub struct ViewGeometry {
    pub size: (u32, u32),
    pub uvs: ViewMap<UvMap>,
    pub owners: ViewMap<OwnershipBuffer>,
    pub weights: ViewMap<WeightBuffer>,
    pub correspondences: Correspondences,
}

impl ViewGeometry {
    pub fn build(
        mesh: &Mesh,
        views: &ViewIndex,
        cameras: &ViewMap<Camera>,
        size: (u32, u32),
    ) -> Self {
        let (width, height) = size;
        info!("  building geometry at {}x{}...", width, height);

        let start = Instant::now();
        let uvs = views.map(|id| project_vertices(mesh, &cameras[&id]));
        let owners =
            views.par_map(|id| rasterize_view(mesh, &uvs[&id], width, height));
        log_elapsed(start, "projection and rasterization");

        let start = Instant::now();
        let weights = views.map(|id| {
            let vertex_weights = vertex_weights(mesh, &cameras[&id]);
            rasterize_weights(mesh, &vertex_weights, &owners[&id])
        });
        log_elapsed(start, "weighting");

        let start = Instant::now();
        let correspondences =
            Correspondences::build(mesh, views, &uvs, &owners);
        log_elapsed(start, "correspondences");

        for &id in views.ids() {
            info!(
                "  view {}: {} covered pixels",
                id,
                correspondences.num_valid(id, id)
            );
        }

        Self {
            size,
            uvs,
            owners,
            weights,
            correspondences,
        }
    }

    pub fn correspondence(&self, from: ViewId, to: ViewId) -> &CorrespondenceTable {
        self.correspondences.get(from, to)
    }
}

/// Cameras rescaled to render images of `size` instead of `origin_size`.
pub fn scale_cameras(
    cameras: &ViewMap<Camera>,
    origin_size: (u32, u32),
    size: (u32, u32),
) -> ViewMap<Camera> {
    let sx = size.0 as f64 / origin_size.0 as f64;
    let sy = size.1 as f64 / origin_size.1 as f64;
    cameras
        .iter()
        .map(|(&id, camera)| (id, camera.scaled(sx, sy)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    use base::assert_eq_f32;

    use crate::fixtures::*;
    use crate::grid::Pixel;

    #[test]
    fn test_build_two_views() {
        let (views, cameras) = two_views();
        let geometry = ViewGeometry::build(&quad_mesh(), &views, &cameras, IMAGE_SIZE);
        let (front, back) = (views.ids()[0], views.ids()[1]);

        assert_eq!(geometry.uvs[&front].len(), 4);
        assert_eq!(geometry.owners[&back].dimensions(), IMAGE_SIZE);
        assert_eq!(*geometry.weights[&front].get(Pixel::new(0, 0)), 0.0);
        assert_eq_f32!(*geometry.weights[&front].get(Pixel::new(16, 16)), 1.0 / 11.0);
        assert_eq!(
            *geometry.correspondence(back, back).get(Pixel::new(16, 16)),
            Some(Pixel::new(16, 16))
        );
    }

    #[test]
    fn test_scale_cameras() {
        let (_, cameras) = two_views();
        let scaled = scale_cameras(&cameras, (32, 32), (16, 8));
        let camera = scaled.values().next().unwrap();
        assert_eq!(camera.intrinsics.fx, 8.0);
        assert_eq!(camera.intrinsics.fy, 4.0);
        assert_eq!(camera.pose, cameras.values().next().unwrap().pose);
    }
}
