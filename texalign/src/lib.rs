// This file makes `texalign` into a rust library crate.

// The file `main.rs` still exists to make `texalign` into an executable.

pub mod align;
pub mod camera;
pub mod color_projection;
pub mod correspondence;
pub mod geometry;
pub mod grid;
pub mod import_obj;
pub mod mesh;
pub mod misc;
pub mod optimize;
pub mod oracle;
pub mod patch_match;
pub mod ply;
pub mod point_cloud;
pub mod raster;
pub mod trajectory;
pub mod view;
pub mod weighting;

#[cfg(test)]
mod fixtures;

pub use base;
