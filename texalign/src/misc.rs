use std::path::Path;
use std::time::Instant;

use image::imageops::{resize, FilterType};
use image::{Rgb, RgbImage};
use log::info;

use base::defs::{IntoResult, Result};

pub type Vector2 = nalgebra::Vector2<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Point3 = nalgebra::Point3<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;
pub type Matrix4 = nalgebra::Matrix4<f64>;

pub fn get_pixel_as_vector3(image: &RgbImage, x: u32, y: u32) -> Vector3 {
    let p = image.get_pixel(x, y);
    Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

pub fn vector3_to_rgb(color: &Vector3) -> Rgb<u8> {
    let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    Rgb([channel(color[0]), channel(color[1]), channel(color[2])])
}

pub fn load_rgb_image<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let path = path.as_ref();
    let image = image::open(path)
        .res(|| format!("failed to load image '{}'", path.display()))?;
    Ok(image.into_rgb8())
}

pub fn save_rgb_image<P: AsRef<Path>>(image: &RgbImage, path: P) -> Result<()> {
    let path = path.as_ref();
    image
        .save(path)
        .res(|| format!("failed to save image '{}'", path.display()))
}

pub fn resize_image(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        image.clone()
    } else {
        resize(image, width, height, FilterType::Triangle)
    }
}

pub fn log_elapsed(start: Instant, what: &str) {
    info!("  {} took {:.2}s", what, start.elapsed().as_secs_f64());
}
