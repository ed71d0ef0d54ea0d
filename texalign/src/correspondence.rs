use indexmap::IndexMap;
use rayon::prelude::*;

use crate::grid::{Grid, Pixel};
use crate::mesh::Mesh;
use crate::raster::{OwnershipBuffer, UvMap};
use crate::view::{ViewId, ViewIndex, ViewMap};

/// Pixel of the other view showing the same surface point, if it is visible
/// there.
pub type CorrespondenceTable = Grid<Option<Pixel>>;

pub fn identity_correspondence(owners: &OwnershipBuffer) -> CorrespondenceTable {
    let (width, height) = owners.dimensions();
    Grid::par_from_fn(width, height, |p| owners.get(p).map(|_| p))
}

/// Reprojects every owned pixel of one view into another through the owning
/// triangle and keeps it when that triangle owns the landing pixel too.
pub fn map_correspondence(
    mesh: &Mesh,
    from_owners: &OwnershipBuffer,
    to_uv: &UvMap,
    to_owners: &OwnershipBuffer,
) -> CorrespondenceTable {
    let (width, height) = from_owners.dimensions();
    Grid::par_from_fn(width, height, |p| {
        let owner = (*from_owners.get(p))?;
        let face = mesh.faces[owner.face];
        let q = owner.interpolate_point(face.map(|v| to_uv[v].point));
        let q = to_owners.checked_pixel(q.x.round() as i64, q.y.round() as i64)?;
        match to_owners.get(q) {
            Some(other) if other.face == owner.face => Some(q),
            _ => None,
        }
    })
}

pub struct Correspondences {
    tables: IndexMap<(ViewId, ViewId), CorrespondenceTable>,
}

impl Correspondences {
    pub fn build(
        mesh: &Mesh,
        views: &ViewIndex,
        uvs: &ViewMap<UvMap>,
        owners: &ViewMap<OwnershipBuffer>,
    ) -> Self {
        let pairs: Vec<(ViewId, ViewId)> = views
            .ids()
            .iter()
            .flat_map(|&i| views.ids().iter().map(move |&j| (i, j)))
            .collect();

        let tables: Vec<CorrespondenceTable> = pairs
            .par_iter()
            .map(|&(i, j)| {
                if i == j {
                    identity_correspondence(&owners[&i])
                } else {
                    map_correspondence(mesh, &owners[&i], &uvs[&j], &owners[&j])
                }
            })
            .collect();

        Self {
            tables: pairs.into_iter().zip(tables).collect(),
        }
    }

    /// Table mapping pixels of `from` into `to`.
    pub fn get(&self, from: ViewId, to: ViewId) -> &CorrespondenceTable {
        &self.tables[&(from, to)]
    }

    pub fn num_valid(&self, from: ViewId, to: ViewId) -> usize {
        self.get(from, to).cells().iter().flatten().count()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::fixtures::*;
    use crate::raster::{project_vertices, rasterize_view};

    fn build(
        views: &ViewIndex,
        cameras: &ViewMap<crate::camera::Camera>,
    ) -> (ViewMap<OwnershipBuffer>, Correspondences) {
        let mesh = quad_mesh();
        let (w, h) = IMAGE_SIZE;
        let uvs = views.map(|id| project_vertices(&mesh, &cameras[&id]));
        let owners = views.map(|id| rasterize_view(&mesh, &uvs[&id], w, h));
        let correspondences = Correspondences::build(&mesh, views, &uvs, &owners);
        (owners, correspondences)
    }

    #[test]
    fn test_identity_for_single_view() {
        let (views, mut cameras) = one_view();
        for pose_shift in [3.0, 4.5] {
            let id = views.ids()[0];
            cameras[&id].pose[(2, 3)] = pose_shift;
            let (owners, correspondences) = build(&views, &cameras);
            let table = correspondences.get(id, id);
            for (p, q) in table.pixels() {
                match owners[&id].get(p) {
                    Some(_) => assert_eq!(*q, Some(p)),
                    None => assert_eq!(*q, None),
                }
            }
            assert!(correspondences.num_valid(id, id) > 0);
        }
    }

    #[test]
    fn test_mutual_visibility() {
        let (views, cameras) = two_views();
        let (owners, correspondences) = build(&views, &cameras);

        for &i in views.ids() {
            for &j in views.ids() {
                let table = correspondences.get(i, j);
                for (p, q) in table.pixels() {
                    if let Some(q) = q {
                        let from = owners[&i].get(p).unwrap();
                        let to = owners[&j].get(*q).unwrap();
                        assert_eq!(from.face, to.face);
                    }
                }
                assert!(correspondences.num_valid(i, j) > 50);
            }
        }
    }

    #[test]
    fn test_opposite_views_mirror_pixels() {
        let (views, cameras) = two_views();
        let (_, correspondences) = build(&views, &cameras);
        let (front, back) = (views.ids()[0], views.ids()[1]);

        // x' = 2 * cx - x, y' = y for the mirrored camera.
        let q = correspondences.get(front, back).get(Pixel::new(14, 16)).unwrap();
        assert_eq!(q.y, 16);
        assert!(q.x == 18 || q.x == 19);
    }

    #[test]
    fn test_occluded_pixels_are_invalid() {
        let (views, cameras) = two_views();
        let mut mesh = quad_mesh();
        // A blocker between the back camera and the quad.
        let base = mesh.vertices.len();
        mesh.vertices.extend([
            crate::misc::Point3::new(-2.0, -2.0, 1.0),
            crate::misc::Point3::new(2.0, -2.0, 1.0),
            crate::misc::Point3::new(0.0, 2.0, 1.0),
        ]);
        mesh.faces.push([base, base + 1, base + 2]);

        let (w, h) = IMAGE_SIZE;
        let uvs = views.map(|id| project_vertices(&mesh, &cameras[&id]));
        let owners = views.map(|id| rasterize_view(&mesh, &uvs[&id], w, h));
        let correspondences = Correspondences::build(&mesh, &views, &uvs, &owners);
        let (front, back) = (views.ids()[0], views.ids()[1]);

        // The blocker hides the whole quad from the back camera.
        let front_to_back = correspondences.get(front, back);
        for (p, q) in front_to_back.pixels() {
            match owners[&front].get(p) {
                Some(owner) if owner.face < 2 => assert_eq!(*q, None),
                _ => (),
            }
        }
        assert!(correspondences.num_valid(front, back) > 0);
    }
}
