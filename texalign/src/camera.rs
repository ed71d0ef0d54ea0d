use serde::Serialize;

use crate::grid::Pixel;
use crate::misc::{Matrix3, Matrix4, Point3, Vector2, Vector3};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn from_array(values: [f64; 4]) -> Self {
        let [fx, fy, cx, cy] = values;
        Self { fx, fy, cx, cy }
    }

    pub fn matrix(&self) -> Matrix3 {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self {
            fx: self.fx * sx,
            fy: self.fy * sy,
            cx: self.cx * sx,
            cy: self.cy * sy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectedPoint {
    pub point: Vector2,
    pub depth: f64,
}

/// Pinhole camera with a world-to-camera pose.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub pose: Matrix4,
    pub intrinsics: Intrinsics,
}

impl Camera {
    pub fn new(pose: Matrix4, intrinsics: Intrinsics) -> Self {
        Self { pose, intrinsics }
    }

    pub fn project_to_camera(&self, point: &Point3) -> Point3 {
        self.pose.transform_point(point)
    }

    /// Depth is kept as is, callers must check its sign.
    pub fn project_to_img(&self, point: &Point3) -> ProjectedPoint {
        let camera_point = self.project_to_camera(point);
        let p = self.intrinsics.matrix() * camera_point.coords;
        ProjectedPoint {
            point: Vector2::new(p.x / p.z, p.y / p.z),
            depth: camera_point.z,
        }
    }

    /// Camera forward axis in world coordinates.
    pub fn view_direction(&self) -> Vector3 {
        let rotation = self.pose.fixed_slice::<3, 3>(0, 0);
        rotation.transpose() * Vector3::z()
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self {
            pose: self.pose,
            intrinsics: self.intrinsics.scaled(sx, sy),
        }
    }
}

/// Maps pixels between a pyramid level and the resolution the geometry
/// buffers were built at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelScale {
    factor: f64,
    level_size: (u32, u32),
    geometry_size: (u32, u32),
}

impl PixelScale {
    pub fn new(
        factor: f64,
        level_size: (u32, u32),
        geometry_size: (u32, u32),
    ) -> Self {
        Self {
            factor,
            level_size,
            geometry_size,
        }
    }

    pub fn identity(size: (u32, u32)) -> Self {
        Self::new(1.0, size, size)
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn img_to_scale(&self, p: Pixel) -> Pixel {
        let map = |v: u32, size: u32| {
            ((v as f64 / self.factor).round() as u32).min(size - 1)
        };
        Pixel::new(map(p.x, self.level_size.0), map(p.y, self.level_size.1))
    }

    pub fn scale_to_img(&self, p: Pixel) -> Pixel {
        let map = |v: u32, size: u32| {
            ((v as f64 * self.factor).round() as u32).min(size - 1)
        };
        Pixel::new(
            map(p.x, self.geometry_size.0),
            map(p.y, self.geometry_size.1),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use base::assert_eq_f32;

    fn rotation_y(angle: f64) -> Matrix4 {
        nalgebra::Rotation3::from_axis_angle(&Vector3::y_axis(), angle)
            .to_homogeneous()
    }

    #[test]
    fn test_project_to_img() {
        let mut pose = Matrix4::identity();
        pose[(2, 3)] = 3.0;
        let camera = Camera::new(
            pose,
            Intrinsics::from_array([16.0, 20.0, 16.0, 12.0]),
        );

        let projected = camera.project_to_img(&Point3::new(0.75, -1.5, 0.0));
        assert_eq_f32!(projected.point.x, 20.0);
        assert_eq_f32!(projected.point.y, 2.0);
        assert_eq_f32!(projected.depth, 3.0);

        let behind = camera.project_to_img(&Point3::new(0.0, 0.0, -5.0));
        assert_eq_f32!(behind.depth, -2.0);
    }

    #[test]
    fn test_view_direction() {
        let intrinsics = Intrinsics::from_array([1.0, 1.0, 0.0, 0.0]);
        let camera = Camera::new(Matrix4::identity(), intrinsics);
        assert_eq!(camera.view_direction(), Vector3::z());

        let camera = Camera::new(rotation_y(std::f64::consts::PI), intrinsics);
        let direction = camera.view_direction();
        assert_eq_f32!(direction.x, 0.0);
        assert_eq_f32!(direction.z, -1.0);

        let camera =
            Camera::new(rotation_y(std::f64::consts::FRAC_PI_2), intrinsics);
        let direction = camera.view_direction();
        // The forward axis must land on the world point it looks at.
        let ahead = camera.project_to_camera(&Point3::from(direction));
        assert_eq_f32!(ahead.x, 0.0);
        assert_eq_f32!(ahead.z, 1.0);
    }

    #[test]
    fn test_scaled_intrinsics() {
        let intrinsics = Intrinsics::from_array([500.0, 400.0, 320.0, 240.0]);
        assert_eq!(
            intrinsics.scaled(0.5, 0.25),
            Intrinsics::from_array([250.0, 100.0, 160.0, 60.0])
        );
    }

    #[test]
    fn test_pixel_scale_round_trip() {
        for &(factor, level) in &[(2.0, (32, 24)), (1.5, (43, 32))] {
            let scale = PixelScale::new(factor, level, (64, 48));
            for x in 0..64 {
                for y in 0..48 {
                    let p = Pixel::new(x, y);
                    let q = scale.scale_to_img(scale.img_to_scale(p));
                    assert!((q.x as i64 - x as i64).abs() <= 1);
                    assert!((q.y as i64 - y as i64).abs() <= 1);
                }
            }
        }
    }

    #[test]
    fn test_pixel_scale_clamps() {
        let scale = PixelScale::new(2.0, (32, 24), (64, 48));
        assert_eq!(scale.img_to_scale(Pixel::new(63, 47)), Pixel::new(31, 23));
        assert_eq!(scale.scale_to_img(Pixel::new(31, 23)), Pixel::new(62, 46));
        let identity = PixelScale::identity((5, 5));
        assert_eq!(identity.img_to_scale(Pixel::new(4, 3)), Pixel::new(4, 3));
    }
}
