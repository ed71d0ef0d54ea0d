use image::{Rgb, RgbImage};

use crate::camera::PixelScale;
use crate::geometry::ViewGeometry;
use crate::grid::{Grid, Pixel};
use crate::misc::{get_pixel_as_vector3, vector3_to_rgb, Vector3};
use crate::optimize::votes::{VoteBuffer, Votes};
use crate::optimize::OptimizeParams;
use crate::view::{ViewId, ViewIndex, ViewMap};

/// Geometry of the current level and the mapping of its pixels into it.
pub struct BlendContext<'a> {
    pub views: &'a ViewIndex,
    pub geometry: &'a ViewGeometry,
    pub scale: PixelScale,
}

impl<'a> BlendContext<'a> {
    /// Colors of `images` at the surface point seen by view `t` at `p`.
    fn visit_observations<F>(
        &self,
        t: ViewId,
        p: Pixel,
        images: &ViewMap<RgbImage>,
        mut f: F,
    ) where
        F: FnMut(ViewId, Pixel, Vector3),
    {
        let gp = self.scale.scale_to_img(p);
        for &u in self.views.ids() {
            let q = match *self.geometry.correspondence(t, u).get(gp) {
                Some(q) => q,
                None => continue,
            };
            let r = if u == t { p } else { self.scale.img_to_scale(q) };
            f(u, q, get_pixel_as_vector3(&images[&u], r.x, r.y));
        }
    }

    /// Mean texture color over the views sharing the surface point, if view
    /// `t` sees a surface at `p`.
    pub fn consistency_average(
        &self,
        t: ViewId,
        p: Pixel,
        textures: &ViewMap<RgbImage>,
    ) -> Option<Vector3> {
        let gp = self.scale.scale_to_img(p);
        self.geometry.correspondence(t, t).get(gp).as_ref()?;

        let mut observations = Votes::empty();
        self.visit_observations(t, p, textures, |_, _, color| {
            observations += Votes::single(color);
        });
        Some(observations.sum / observations.count)
    }

    pub fn regenerate_target(
        &self,
        t: ViewId,
        params: &OptimizeParams,
        s2t: Option<&VoteBuffer>,
        t2s: Option<&VoteBuffer>,
        previous: &RgbImage,
        textures: &ViewMap<RgbImage>,
    ) -> RgbImage {
        let (width, height) = previous.dimensions();
        let area = (params.patch_width * params.patch_width) as f64;
        let weights = &self.geometry.weights[&t];

        let pixels = Grid::par_from_fn(width, height, |p| {
            let mut votes = Votes::empty();
            if let Some(s2t) = s2t {
                votes += s2t.get(p).scaled(params.alpha_u / area);
            }
            if let Some(t2s) = t2s {
                votes += t2s.get(p).scaled(params.alpha_v / area);
            }

            if let Some(average) = self.consistency_average(t, p, textures) {
                let f2 = params.lambda * *weights.get(self.scale.scale_to_img(p)) as f64;
                votes += Votes {
                    count: f2,
                    sum: average * f2,
                };
            }

            if votes.count > 0.0 {
                vector3_to_rgb(&(votes.sum / votes.count))
            } else {
                *previous.get_pixel(p.x, p.y)
            }
        });
        grid_to_image(&pixels)
    }

    /// Weighted mean of the targets sharing each surface point, together
    /// with the weighted squared deviation of those targets from it.
    pub fn regenerate_texture(
        &self,
        t: ViewId,
        targets: &ViewMap<RgbImage>,
        previous: &RgbImage,
    ) -> (RgbImage, f64) {
        let (width, height) = previous.dimensions();

        let pixels = Grid::par_from_fn(width, height, |p| {
            let mut blend = Votes::empty();
            self.visit_observations(t, p, targets, |u, q, color| {
                let weight = *self.geometry.weights[&u].get(q) as f64;
                blend += Votes::single(color).scaled(weight);
            });

            let color = if blend.count > 0.0 {
                vector3_to_rgb(&(blend.sum / blend.count))
            } else {
                *previous.get_pixel(p.x, p.y)
            };

            let texel = Vector3::new(color[0] as f64, color[1] as f64, color[2] as f64);
            let mut deviation = 0.0;
            let mut num_observations = 0;
            self.visit_observations(t, p, targets, |u, q, c| {
                let weight = *self.geometry.weights[&u].get(q) as f64;
                deviation += weight * (c - texel).norm_squared();
                num_observations += 1;
            });
            if num_observations > 0 {
                deviation /= num_observations as f64;
            }

            (color, deviation)
        });

        let image = RgbImage::from_fn(width, height, |x, y| pixels.get(Pixel::new(x, y)).0);
        let energy = pixels.cells().iter().map(|(_, e)| e).sum::<f64>();
        (image, energy)
    }
}

fn grid_to_image(pixels: &Grid<Rgb<u8>>) -> RgbImage {
    let (width, height) = pixels.dimensions();
    RgbImage::from_fn(width, height, |x, y| *pixels.get(Pixel::new(x, y)))
}
