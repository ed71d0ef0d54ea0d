use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use base::defs::{Error, ErrorKind::*, Result};

use crate::grid::{Grid, Pixel};
use crate::oracle::{pack_position, PatchField, PatchOracle};

/// Randomized PatchMatch over w x w RGB patches with an SSD cost.
pub struct PatchMatch {
    pub iterations: usize,
    pub seed: u64,
}

struct Search<'a> {
    query: &'a RgbImage,
    reference: &'a RgbImage,
    width: u32,
    max_query: (u32, u32),
    max_reference: (u32, u32),
}

impl<'a> Search<'a> {
    /// Patch distance, abandoned as soon as it reaches `bound`.
    fn distance(&self, q: Pixel, r: Pixel, bound: i64) -> i64 {
        let mut sum = 0;
        for dy in 0..self.width {
            for dx in 0..self.width {
                let a = self.query.get_pixel(q.x + dx, q.y + dy);
                let b = self.reference.get_pixel(r.x + dx, r.y + dy);
                for c in 0..3 {
                    let d = a[c] as i64 - b[c] as i64;
                    sum += d * d;
                }
            }
            if sum >= bound {
                return sum;
            }
        }
        sum
    }

    fn clamp(&self, x: i64, y: i64) -> Pixel {
        Pixel::new(
            x.clamp(0, self.max_reference.0 as i64) as u32,
            y.clamp(0, self.max_reference.1 as i64) as u32,
        )
    }

    fn improve(
        &self,
        q: Pixel,
        candidate: Pixel,
        nnf: &mut Grid<Pixel>,
        costs: &mut Grid<i64>,
    ) {
        let best = *costs.get(q);
        let cost = self.distance(q, candidate, best);
        if cost < best {
            nnf.set(q, candidate);
            costs.set(q, cost);
        }
    }
}

impl PatchMatch {
    fn search(
        &self,
        query: &RgbImage,
        reference: &RgbImage,
        patch_width: u32,
    ) -> Result<PatchField> {
        let (qw, qh) = query.dimensions();
        let (rw, rh) = reference.dimensions();
        if patch_width == 0
            || qw < patch_width
            || qh < patch_width
            || rw < patch_width
            || rh < patch_width
        {
            let desc = format!(
                "images {}x{} and {}x{} are smaller than patch width {}",
                qw, qh, rw, rh, patch_width
            );
            return Err(Error::new(OracleError, desc));
        }

        let search = Search {
            query,
            reference,
            width: patch_width,
            max_query: (qw - patch_width, qh - patch_width),
            max_reference: (rw - patch_width, rh - patch_width),
        };
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut nnf = Grid::par_from_fn(qw, qh, |p| {
            Pixel::new(p.x.min(rw - 1), p.y.min(rh - 1))
        });
        let mut costs = Grid::new(qw, qh, 0i64);
        for y in 0..=search.max_query.1 {
            for x in 0..=search.max_query.0 {
                let q = Pixel::new(x, y);
                let r = Pixel::new(
                    rng.gen_range(0..=search.max_reference.0),
                    rng.gen_range(0..=search.max_reference.1),
                );
                nnf.set(q, r);
                costs.set(q, search.distance(q, r, i64::MAX));
            }
        }

        let radius = rw.max(rh) as i64;
        for iteration in 0..self.iterations {
            let forward = iteration % 2 == 0;
            let step: i64 = if forward { 1 } else { -1 };
            let ys: Vec<u32> = if forward {
                (0..=search.max_query.1).collect()
            } else {
                (0..=search.max_query.1).rev().collect()
            };
            let xs: Vec<u32> = if forward {
                (0..=search.max_query.0).collect()
            } else {
                (0..=search.max_query.0).rev().collect()
            };

            for &y in &ys {
                for &x in &xs {
                    let q = Pixel::new(x, y);

                    // Propagation from the already visited neighbors.
                    let (nx, ny) = (x as i64 - step, y as i64 - step);
                    if nx >= 0 && nx <= search.max_query.0 as i64 {
                        let n = *nnf.get(Pixel::new(nx as u32, y));
                        let candidate = search.clamp(n.x as i64 + step, n.y as i64);
                        search.improve(q, candidate, &mut nnf, &mut costs);
                    }
                    if ny >= 0 && ny <= search.max_query.1 as i64 {
                        let n = *nnf.get(Pixel::new(x, ny as u32));
                        let candidate = search.clamp(n.x as i64, n.y as i64 + step);
                        search.improve(q, candidate, &mut nnf, &mut costs);
                    }

                    // Random search around the current best.
                    let mut r = radius;
                    while r >= 1 {
                        let best = *nnf.get(q);
                        let candidate = search.clamp(
                            best.x as i64 + rng.gen_range(-r..=r),
                            best.y as i64 + rng.gen_range(-r..=r),
                        );
                        search.improve(q, candidate, &mut nnf, &mut costs);
                        r /= 2;
                    }
                }
            }
        }

        let positions = Grid::par_from_fn(qw, qh, |p| pack_position(*nnf.get(p)));
        let costs = Grid::par_from_fn(qw, qh, |p| {
            (*costs.get(p)).min(i32::MAX as i64) as i32
        });
        Ok(PatchField { positions, costs })
    }
}

impl PatchOracle for PatchMatch {
    fn compute(
        &self,
        query: &RgbImage,
        reference: &RgbImage,
        patch_width: u32,
        _label: &str,
    ) -> Result<PatchField> {
        self.search(query, reference, patch_width)
    }
}
