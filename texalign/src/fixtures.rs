use crate::camera::{Camera, Intrinsics};
use crate::mesh::Mesh;
use crate::misc::{Matrix4, Point3, Vector3};
use crate::view::{ViewIndex, ViewMap};

pub const IMAGE_SIZE: (u32, u32) = (32, 32);

/// Pixels strictly covered by the quad in either camera.
pub const QUAD_PIXELS_X: std::ops::RangeInclusive<u32> = 11..=21;
pub const QUAD_PIXELS_Y: std::ops::RangeInclusive<u32> = 11..=20;

/// Two-triangle square in the z = 0 plane.
pub fn quad_mesh() -> Mesh {
    Mesh {
        vertices: vec![
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 1.0, 0.0),
        ],
        normals: vec![Vector3::z(); 4],
        colors: vec![],
        faces: vec![[0, 1, 2], [0, 2, 3]],
    }
}

pub fn intrinsics() -> Intrinsics {
    Intrinsics::from_array([16.0, 16.0, 16.25, 15.5])
}

/// Camera at z = -3 looking along +z.
pub fn front_camera() -> Camera {
    let mut pose = Matrix4::identity();
    pose[(2, 3)] = 3.0;
    Camera::new(pose, intrinsics())
}

/// Camera at z = 3 looking along -z.
pub fn back_camera() -> Camera {
    let mut pose = Matrix4::identity();
    pose[(0, 0)] = -1.0;
    pose[(2, 2)] = -1.0;
    pose[(2, 3)] = 3.0;
    Camera::new(pose, intrinsics())
}

pub fn two_views() -> (ViewIndex, ViewMap<Camera>) {
    let index = ViewIndex::new(&[], 2).unwrap();
    let cameras = [front_camera(), back_camera()];
    let map = index.map(|id| cameras[id.index()].clone());
    (index, map)
}

pub fn one_view() -> (ViewIndex, ViewMap<Camera>) {
    let index = ViewIndex::new(&[], 1).unwrap();
    let map = index.map(|_| front_camera());
    (index, map)
}

pub fn in_quad(x: u32, y: u32) -> bool {
    QUAD_PIXELS_X.contains(&x) && QUAD_PIXELS_Y.contains(&y)
}
