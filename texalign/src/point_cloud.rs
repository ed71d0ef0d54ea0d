use std::fmt::Debug;

use kiddo::distance::squared_euclidean;
use kiddo::KdTree;
use nalgebra::SymmetricEigen;
use rayon::prelude::*;

use base::defs::{Error, ErrorKind::*, Result};

use crate::misc::{Matrix3, Point3, Vector3};

fn kdtree_error<E: Debug>(err: E) -> Error {
    Error::new(InconsistentState, format!("k-d tree failure: {:?}", err))
}

pub fn build_kdtree(points: &[Point3]) -> Result<KdTree<f64, usize, 3>> {
    let mut kdtree = KdTree::new();
    for (i, point) in points.iter().enumerate() {
        kdtree.add(&[point.x, point.y, point.z], i).map_err(kdtree_error)?;
    }
    Ok(kdtree)
}

/// Normal of the plane best fitting the given points, zero when the points
/// don't span a plane.
pub fn fit_plane_normal(points: &[Point3]) -> Vector3 {
    if points.len() < 3 {
        return Vector3::zeros();
    }

    let centroid = points.iter().map(|p| p.coords).sum::<Vector3>()
        / points.len() as f64;
    let mut covariance = Matrix3::zeros();
    for p in points {
        let d = p.coords - centroid;
        covariance += d * d.transpose();
    }

    let eigen = SymmetricEigen::new(covariance);
    let (smallest, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(k, min), (i, &v)| {
            if v < min {
                (i, v)
            } else {
                (k, min)
            }
        });

    let normal = eigen.eigenvectors.column(smallest).into_owned();
    let norm = normal.norm();
    if norm > 0.0 {
        normal / norm
    } else {
        Vector3::zeros()
    }
}

/// Estimates unit normals from each point's `num_neighbors` nearest
/// neighbors. Orientation is arbitrary.
pub fn estimate_normals(
    points: &[Point3],
    num_neighbors: usize,
) -> Result<Vec<Vector3>> {
    if points.is_empty() {
        return Ok(vec![]);
    }

    let kdtree = build_kdtree(points)?;
    points
        .par_iter()
        .map(|point| {
            let neighbors = kdtree
                .nearest(
                    &[point.x, point.y, point.z],
                    num_neighbors.max(3),
                    &squared_euclidean,
                )
                .map_err(kdtree_error)?;
            let neighborhood: Vec<Point3> =
                neighbors.iter().map(|(_, &i)| points[i]).collect();
            Ok(fit_plane_normal(&neighborhood))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    use base::assert_eq_f32;

    #[test]
    fn test_fit_plane_normal() {
        let points = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let normal = fit_plane_normal(&points);
        assert_eq_f32!(normal.z.abs(), 1.0);
        assert_eq_f32!(normal.x, 0.0);

        assert_eq!(fit_plane_normal(&points[..2]), Vector3::zeros());
    }

    #[test]
    fn test_estimate_normals_on_tilted_plane() {
        let mut points = vec![];
        for i in 0..6 {
            for j in 0..6 {
                let (x, y) = (i as f64 * 0.1, j as f64 * 0.1);
                points.push(Point3::new(x, y, x));
            }
        }

        let normals = estimate_normals(&points, 8).unwrap();
        assert_eq!(normals.len(), points.len());
        let expected = Vector3::new(-1.0, 0.0, 1.0).normalize();
        for normal in normals {
            assert_eq_f32!(normal.dot(&expected).abs(), 1.0);
        }
    }

    #[test]
    fn test_estimate_normals_of_nothing() {
        assert!(estimate_normals(&[], 20).unwrap().is_empty());
    }
}
