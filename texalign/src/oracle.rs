use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use image::RgbImage;
use log::debug;

use base::defs::{Error, ErrorKind::*, Result};
use base::util::fs;

use crate::grid::{Grid, Pixel};
use crate::misc::save_rgb_image;

pub const POSITION_BITS: u32 = 12;
pub const MAX_IMAGE_SIZE: u32 = 1 << POSITION_BITS;
const POSITION_MASK: u32 = MAX_IMAGE_SIZE - 1;

pub fn pack_position(p: Pixel) -> u32 {
    (p.y << POSITION_BITS) | (p.x & POSITION_MASK)
}

pub fn unpack_position(value: u32) -> Pixel {
    Pixel::new(value & POSITION_MASK, value >> POSITION_BITS)
}

/// Approximate nearest-neighbor field: for every query pixel the packed
/// position of the best matching reference patch and its cost.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchField {
    pub positions: Grid<u32>,
    pub costs: Grid<i32>,
}

impl PatchField {
    pub fn position(&self, p: Pixel) -> Pixel {
        unpack_position(*self.positions.get(p))
    }

    pub fn total_cost(&self) -> f64 {
        self.costs.cells().iter().map(|&c| c as f64).sum()
    }
}

pub trait PatchOracle: Sync {
    /// `label` names the call uniquely among concurrent ones.
    fn compute(
        &self,
        query: &RgbImage,
        reference: &RgbImage,
        patch_width: u32,
        label: &str,
    ) -> Result<PatchField>;
}

/// Runs a patch matching executable as
/// `<binary> <query> <reference> <ann> <annd> <patch width>` and reads back
/// the whitespace separated position and cost grids it writes.
pub struct ExternalOracle {
    binary: PathBuf,
    work_dir: PathBuf,
}

impl ExternalOracle {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        binary: P,
        work_dir: Q,
    ) -> Result<Self> {
        fs::create_dir(work_dir.as_ref())?;
        Ok(Self {
            binary: binary.as_ref().to_path_buf(),
            work_dir: work_dir.as_ref().to_path_buf(),
        })
    }
}

impl PatchOracle for ExternalOracle {
    fn compute(
        &self,
        query: &RgbImage,
        reference: &RgbImage,
        patch_width: u32,
        label: &str,
    ) -> Result<PatchField> {
        let query_path = self.work_dir.join(format!("{}_query.png", label));
        let reference_path =
            self.work_dir.join(format!("{}_reference.png", label));
        let ann_path = self.work_dir.join(format!("{}_ann.txt", label));
        let annd_path = self.work_dir.join(format!("{}_annd.txt", label));

        save_rgb_image(query, &query_path)?;
        save_rgb_image(reference, &reference_path)?;

        debug!("running {} for {}", self.binary.display(), label);
        let status = Command::new(&self.binary)
            .arg(&query_path)
            .arg(&reference_path)
            .arg(&ann_path)
            .arg(&annd_path)
            .arg(patch_width.to_string())
            .status()
            .map_err(|e| {
                let desc =
                    format!("failed to run '{}'", self.binary.display());
                Error::with_source(OracleError, desc, e)
            })?;
        if !status.success() {
            let desc = format!(
                "'{}' exited with {} for {}",
                self.binary.display(),
                status,
                label
            );
            return Err(Error::new(OracleError, desc));
        }

        let (width, height) = query.dimensions();
        let positions =
            parse_grid(&fs::read_file_to_string(&ann_path)?, width, height)?;
        let costs =
            parse_grid(&fs::read_file_to_string(&annd_path)?, width, height)?;
        Ok(PatchField { positions, costs })
    }
}

pub fn parse_grid<T: FromStr>(text: &str, width: u32, height: u32) -> Result<Grid<T>> {
    let values = text
        .split_whitespace()
        .map(|token| {
            token.parse::<T>().map_err(|_| {
                let desc = format!("malformed patch field value '{}'", token);
                Error::new(OracleError, desc)
            })
        })
        .collect::<Result<Vec<T>>>()?;

    let len = values.len();
    Grid::from_cells(width, height, values).ok_or_else(|| {
        let desc = format!(
            "patch field has {} values, {}x{} expected",
            len, width, height
        );
        Error::new(OracleError, desc)
    })
}
