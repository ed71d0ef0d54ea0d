use std::io::BufWriter;
use std::path::Path;

use base::defs::{Error, ErrorKind::*, Result};
use base::util::fs;

use crate::import_obj::read_obj;
use crate::misc::{Point3, Vector3};
use crate::ply::{read_ply, write_ply};

pub type VertexColor = [u8; 3];

/// Triangle mesh. `normals` and `colors` are either empty or hold one entry
/// per vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Point3>,
    pub normals: Vec<Vector3>,
    pub colors: Vec<VertexColor>,
    pub faces: Vec<[usize; 3]>,
}

impl Mesh {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Mesh> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let mesh = match ext.as_str() {
            "ply" => read_ply(fs::open_file(path)?),
            "obj" => read_obj(fs::open_file(path)?),
            _ => {
                let desc = format!(
                    "unsupported mesh file extension in '{}'",
                    path.display()
                );
                return Err(Error::new(UnsupportedFeature, desc));
            }
        }
        .map_err(|err| {
            let desc = format!("{} in '{}'", err.description, path.display());
            Error::new(err.kind, desc)
        })?;

        mesh.validate()?;
        Ok(mesh)
    }

    pub fn save_ply<P: AsRef<Path>>(
        &self,
        path: P,
        colors: &[VertexColor],
    ) -> Result<()> {
        let mut writer = BufWriter::new(fs::create_file(path)?);
        write_ply(&mut writer, self, colors)
    }

    pub fn validate(&self) -> Result<()> {
        let num_vertices = self.vertices.len();
        if !self.normals.is_empty() && self.normals.len() != num_vertices {
            let desc = format!(
                "mesh has {} normals for {} vertices",
                self.normals.len(),
                num_vertices
            );
            return Err(Error::new(InconsistentState, desc));
        }
        if !self.colors.is_empty() && self.colors.len() != num_vertices {
            let desc = format!(
                "mesh has {} colors for {} vertices",
                self.colors.len(),
                num_vertices
            );
            return Err(Error::new(InconsistentState, desc));
        }
        for (i, face) in self.faces.iter().enumerate() {
            if face.iter().any(|&v| v >= num_vertices) {
                let desc = format!(
                    "face {} references unknown vertex ({:?})",
                    i, face
                );
                return Err(Error::new(InconsistentState, desc));
            }
        }
        Ok(())
    }

    pub fn has_normals(&self) -> bool {
        !self.vertices.is_empty() && self.normals.len() == self.vertices.len()
    }

    pub fn vertex_color(&self, index: usize) -> VertexColor {
        self.colors.get(index).cloned().unwrap_or_default()
    }
}

/// Splits a convex polygon into triangles sharing its first vertex.
pub fn fan_triangulate(polygon: &[usize], faces: &mut Vec<[usize; 3]>) {
    for i in 1..polygon.len().saturating_sub(1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validate() {
        let mut mesh = Mesh {
            vertices: vec![Point3::origin(); 3],
            faces: vec![[0, 1, 2]],
            ..Mesh::default()
        };
        assert!(mesh.validate().is_ok());
        assert!(!mesh.has_normals());
        assert_eq!(mesh.vertex_color(1), [0, 0, 0]);

        mesh.faces.push([0, 1, 3]);
        assert_eq!(mesh.validate().unwrap_err().kind, InconsistentState);

        mesh.faces.pop();
        mesh.colors = vec![[1, 2, 3]];
        assert_eq!(mesh.validate().unwrap_err().kind, InconsistentState);
    }

    #[test]
    fn test_fan_triangulate() {
        let mut faces = vec![];
        fan_triangulate(&[4, 5, 6, 7], &mut faces);
        assert_eq!(faces, vec![[4, 5, 6], [4, 6, 7]]);
        fan_triangulate(&[1, 2], &mut faces);
        assert_eq!(faces.len(), 2);
    }

    #[test]
    fn test_load_unsupported_extension() {
        let err = Mesh::load("scene.stl").unwrap_err();
        assert_eq!(err.kind, UnsupportedFeature);
    }
}
