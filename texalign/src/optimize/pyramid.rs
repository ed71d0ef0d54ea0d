use serde::Serialize;

use base::defs::{Error, ErrorKind::*, Result};

use crate::optimize::OptimizeParams;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LevelSchedule {
    pub index: usize,
    /// Source resolution divided by the level resolution.
    pub factor: f64,
    pub size: (u32, u32),
    pub iterations: usize,
}

/// Levels from the coarsest to the source resolution.
pub fn level_schedule(
    params: &OptimizeParams,
    origin_size: (u32, u32),
) -> Result<Vec<LevelSchedule>> {
    params.validate()?;

    (0..params.levels)
        .map(|index| {
            let exponent = (params.levels - 1 - index) as i32;
            let factor = params.scale_factor.powi(exponent);
            let scale = |v: u32| ((v as f64 / factor).round() as u32).max(1);
            let size = (scale(origin_size.0), scale(origin_size.1));
            if size.0 < params.patch_width || size.1 < params.patch_width {
                let desc = format!(
                    "level {} of size {}x{} is smaller than patch width {}",
                    index, size.0, size.1, params.patch_width
                );
                return Err(Error::new(InvalidConfig, desc));
            }

            let decrement = index * params.iteration_decrement;
            let iterations = params.initial_iterations.saturating_sub(decrement).max(1);

            Ok(LevelSchedule {
                index,
                factor,
                size,
                iterations,
            })
        })
        .collect()
}
