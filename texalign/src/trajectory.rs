use std::path::Path;

use base::defs::{Error, ErrorKind::*, Result};
use base::util::fs;

use crate::misc::Matrix4;

const TRAJECTORY_IDS: usize = 3;
const TRAJECTORY_BLOCK: usize = TRAJECTORY_IDS + 16;
const POSE_VALUES: usize = 12;

fn parse_number<T: std::str::FromStr>(token: &str, what: &str) -> Result<T> {
    token.parse::<T>().map_err(|_| {
        let desc = format!("malformed {} '{}'", what, token);
        Error::new(MalformedData, desc)
    })
}

/// Parses blocks of three integer ids followed by a row-major 4x4 matrix.
pub fn parse_trajectory(text: &str) -> Result<Vec<Matrix4>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(Error::new(MalformedData, "trajectory has no poses"));
    }
    if tokens.len() % TRAJECTORY_BLOCK != 0 {
        let desc = format!(
            "incomplete pose block {} in trajectory",
            tokens.len() / TRAJECTORY_BLOCK
        );
        return Err(Error::new(MalformedData, desc));
    }

    let mut poses = Vec::with_capacity(tokens.len() / TRAJECTORY_BLOCK);
    for block in tokens.chunks(TRAJECTORY_BLOCK) {
        for id in &block[..TRAJECTORY_IDS] {
            parse_number::<i64>(id, "trajectory id")?;
        }
        let mut values = [0.0; 16];
        for (value, token) in values.iter_mut().zip(&block[TRAJECTORY_IDS..]) {
            *value = parse_number(token, "pose value")?;
        }
        poses.push(Matrix4::from_row_slice(&values));
    }

    Ok(poses)
}

/// Parses a translation followed by a row-major 3x3 rotation.
pub fn parse_pose(text: &str) -> Result<Matrix4> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != POSE_VALUES {
        let desc = format!(
            "pose must have {} values, found {}",
            POSE_VALUES,
            tokens.len()
        );
        return Err(Error::new(MalformedData, desc));
    }

    let mut values = [0.0; POSE_VALUES];
    for (value, token) in values.iter_mut().zip(&tokens) {
        *value = parse_number(token, "pose value")?;
    }

    let mut pose = Matrix4::identity();
    for row in 0..3 {
        pose[(row, 3)] = values[row];
        for col in 0..3 {
            pose[(row, col)] = values[3 + row * 3 + col];
        }
    }
    Ok(pose)
}

fn with_path(err: Error, path: &Path) -> Error {
    let desc = format!("{} in '{}'", err.description, path.display());
    Error::new(err.kind, desc)
}

pub fn read_trajectory<P: AsRef<Path>>(path: P) -> Result<Vec<Matrix4>> {
    let path = path.as_ref();
    parse_trajectory(&fs::read_file_to_string(path)?)
        .map_err(|e| with_path(e, path))
}

pub fn read_pose_file<P: AsRef<Path>>(path: P) -> Result<Matrix4> {
    let path = path.as_ref();
    parse_pose(&fs::read_file_to_string(path)?).map_err(|e| with_path(e, path))
}

pub fn to_world_to_camera(
    poses: Vec<Matrix4>,
    camera_to_world: bool,
) -> Result<Vec<Matrix4>> {
    if !camera_to_world {
        return Ok(poses);
    }

    poses
        .into_iter()
        .enumerate()
        .map(|(i, pose)| {
            pose.try_inverse().ok_or_else(|| {
                let desc = format!("pose {} is not invertible", i);
                Error::new(MalformedData, desc)
            })
        })
        .collect()
}
