use derive_more::{Add, AddAssign};
use image::RgbImage;

use crate::grid::{Grid, Pixel};
use crate::misc::{get_pixel_as_vector3, Vector3};
use crate::oracle::PatchField;

/// Colors proposed for a target pixel by overlapping patches.
#[derive(Add, AddAssign, Clone, Copy, Debug, PartialEq)]
pub struct Votes {
    pub count: f64,
    pub sum: Vector3,
}

impl Votes {
    pub fn empty() -> Self {
        Self {
            count: 0.0,
            sum: Vector3::zeros(),
        }
    }

    pub fn single(color: Vector3) -> Self {
        Self {
            count: 1.0,
            sum: color,
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            count: self.count * factor,
            sum: self.sum * factor,
        }
    }
}

pub type VoteBuffer = Grid<Votes>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchDirection {
    /// Source patches matched into the target.
    SourceToTarget,
    /// Target patches matched into the source.
    TargetToSource,
}

impl MatchDirection {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SourceToTarget => "s2t",
            Self::TargetToSource => "t2s",
        }
    }
}

/// Whether a patch at the query origin hangs over the right or bottom border.
/// Such patches shrink to the origin pixel and vote in place.
fn at_border(origin: Pixel, size: (u32, u32), patch_width: u32) -> bool {
    origin.x + patch_width > size.0 || origin.y + patch_width > size.1
}

/// Accumulates source colors at target pixels through a patch field.
pub fn accumulate_votes(
    source: &RgbImage,
    target_size: (u32, u32),
    field: &PatchField,
    direction: MatchDirection,
    patch_width: u32,
) -> VoteBuffer {
    let (width, height) = target_size;
    let mut votes = Grid::new(width, height, Votes::empty());
    let query_size = field.positions.dimensions();

    for (origin, _) in field.positions.pixels() {
        let (matched, extent) = if at_border(origin, query_size, patch_width) {
            (origin, 1)
        } else {
            (field.position(origin), patch_width)
        };

        for dy in 0..extent {
            for dx in 0..extent {
                let (from, to) = match direction {
                    MatchDirection::SourceToTarget => (
                        (origin.x + dx, origin.y + dy),
                        (matched.x + dx, matched.y + dy),
                    ),
                    MatchDirection::TargetToSource => (
                        (matched.x + dx, matched.y + dy),
                        (origin.x + dx, origin.y + dy),
                    ),
                };
                if from.0 >= source.width() || from.1 >= source.height() {
                    continue;
                }
                if to.0 >= width || to.1 >= height {
                    continue;
                }
                let color = get_pixel_as_vector3(source, from.0, from.1);
                *votes.get_mut(Pixel::new(to.0, to.1)) += Votes::single(color);
            }
        }
    }

    votes
}
