use std::io::{BufReader, Read, Write};

use ply_rs::parser::Parser;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef,
    PropertyType, ScalarType,
};
use ply_rs::writer::Writer;

use base::defs::{Error, ErrorKind::*, Result};

use crate::mesh::{fan_triangulate, Mesh, VertexColor};
use crate::misc::{Point3, Vector3};

fn scalar(element: &DefaultElement, key: &str) -> Option<f64> {
    Some(match element.get(key)? {
        Property::Char(v) => *v as f64,
        Property::UChar(v) => *v as f64,
        Property::Short(v) => *v as f64,
        Property::UShort(v) => *v as f64,
        Property::Int(v) => *v as f64,
        Property::UInt(v) => *v as f64,
        Property::Float(v) => *v as f64,
        Property::Double(v) => *v,
        _ => return None,
    })
}

fn color_channel(element: &DefaultElement, key: &str) -> Option<u8> {
    match element.get(key)? {
        Property::UChar(v) => Some(*v),
        Property::Float(v) => Some((*v * 255.0).round().clamp(0.0, 255.0) as u8),
        Property::Double(v) => {
            Some((*v * 255.0).round().clamp(0.0, 255.0) as u8)
        }
        _ => scalar(element, key).map(|v| v.clamp(0.0, 255.0) as u8),
    }
}

fn index_list(element: &DefaultElement) -> Option<Vec<i64>> {
    let property = element
        .get("vertex_indices")
        .or_else(|| element.get("vertex_index"))?;
    Some(match property {
        Property::ListChar(v) => v.iter().map(|&i| i as i64).collect(),
        Property::ListUChar(v) => v.iter().map(|&i| i as i64).collect(),
        Property::ListShort(v) => v.iter().map(|&i| i as i64).collect(),
        Property::ListUShort(v) => v.iter().map(|&i| i as i64).collect(),
        Property::ListInt(v) => v.iter().map(|&i| i as i64).collect(),
        Property::ListUInt(v) => v.iter().map(|&i| i as i64).collect(),
        _ => return None,
    })
}

pub fn read_ply<R: Read>(reader: R) -> Result<Mesh> {
    let mut reader = BufReader::new(reader);
    let parser = Parser::<DefaultElement>::new();
    let header = parser.read_header(&mut reader).map_err(|e| {
        Error::with_source(MalformedData, "malformed .ply header", e)
    })?;
    let payload = parser.read_payload(&mut reader, &header).map_err(|e| {
        Error::with_source(MalformedData, "malformed .ply payload", e)
    })?;

    let mut mesh = Mesh::default();
    let empty = vec![];
    let vertices = payload.get("vertex").unwrap_or(&empty);

    let mut has_normals = !vertices.is_empty();
    let mut has_colors = !vertices.is_empty();
    for (i, element) in vertices.iter().enumerate() {
        let coord = |key: &str| {
            scalar(element, key).ok_or_else(|| {
                let desc = format!("vertex {} has no '{}' coordinate", i, key);
                Error::new(MalformedData, desc)
            })
        };
        mesh.vertices
            .push(Point3::new(coord("x")?, coord("y")?, coord("z")?));

        if let (Some(nx), Some(ny), Some(nz)) = (
            scalar(element, "nx"),
            scalar(element, "ny"),
            scalar(element, "nz"),
        ) {
            mesh.normals.push(Vector3::new(nx, ny, nz));
        } else {
            has_normals = false;
        }

        if let (Some(r), Some(g), Some(b)) = (
            color_channel(element, "red"),
            color_channel(element, "green"),
            color_channel(element, "blue"),
        ) {
            mesh.colors.push([r, g, b]);
        } else {
            has_colors = false;
        }
    }
    if !has_normals {
        mesh.normals.clear();
    }
    if !has_colors {
        mesh.colors.clear();
    }

    for (i, element) in payload.get("face").unwrap_or(&empty).iter().enumerate()
    {
        let indices = index_list(element).ok_or_else(|| {
            let desc = format!("face {} has no vertex indices", i);
            Error::new(MalformedData, desc)
        })?;
        if indices.len() < 3 || indices.iter().any(|&v| v < 0) {
            let desc = format!("face {} has malformed vertex indices", i);
            return Err(Error::new(MalformedData, desc));
        }
        let polygon: Vec<usize> = indices.iter().map(|&v| v as usize).collect();
        fan_triangulate(&polygon, &mut mesh.faces);
    }

    Ok(mesh)
}

fn scalar_def(name: &str, scalar_type: ScalarType) -> PropertyDef {
    PropertyDef::new(name.to_string(), PropertyType::Scalar(scalar_type))
}

/// Writes an ascii .ply with per-vertex colors (empty `colors` omits them).
pub fn write_ply<W: Write>(
    writer: &mut W,
    mesh: &Mesh,
    colors: &[VertexColor],
) -> Result<()> {
    let with_colors = !colors.is_empty();
    if with_colors && colors.len() != mesh.vertices.len() {
        let desc = format!(
            "{} colors given for {} vertices",
            colors.len(),
            mesh.vertices.len()
        );
        return Err(Error::new(InconsistentState, desc));
    }

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for name in ["x", "y", "z"] {
        vertex_def.properties.add(scalar_def(name, ScalarType::Float));
    }
    if with_colors {
        for name in ["red", "green", "blue"] {
            vertex_def.properties.add(scalar_def(name, ScalarType::UChar));
        }
    }
    vertex_def.count = mesh.vertices.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    face_def.count = mesh.faces.len();
    ply.header.elements.add(face_def);

    let mut vertices = Vec::with_capacity(mesh.vertices.len());
    for (i, v) in mesh.vertices.iter().enumerate() {
        let mut element = DefaultElement::new();
        element.insert("x".to_string(), Property::Float(v.x as f32));
        element.insert("y".to_string(), Property::Float(v.y as f32));
        element.insert("z".to_string(), Property::Float(v.z as f32));
        if with_colors {
            let [r, g, b] = colors[i];
            element.insert("red".to_string(), Property::UChar(r));
            element.insert("green".to_string(), Property::UChar(g));
            element.insert("blue".to_string(), Property::UChar(b));
        }
        vertices.push(element);
    }
    ply.payload.insert("vertex".to_string(), vertices);

    let mut faces = Vec::with_capacity(mesh.faces.len());
    for face in &mesh.faces {
        let mut element = DefaultElement::new();
        let indices = face.iter().map(|&v| v as i32).collect();
        element.insert("vertex_indices".to_string(), Property::ListInt(indices));
        faces.push(element);
    }
    ply.payload.insert("face".to_string(), faces);

    Writer::new()
        .write_ply(writer, &mut ply)
        .map_err(|e| Error::with_source(IoError, "failed to write .ply", e))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const QUAD: &str = "ply
format ascii 1.0
element vertex 4
property float x
property float y
property float z
property float nx
property float ny
property float nz
property uchar red
property uchar green
property uchar blue
element face 1
property list uchar int vertex_indices
end_header
0 0 0 0 0 1 255 0 0
1 0 0 0 0 1 0 255 0
1 1 0 0 0 1 0 0 255
0 1 0 0 0 1 10 20 30
4 0 1 2 3
";

    #[test]
    fn test_read_ply() {
        let mesh = read_ply(QUAD.as_bytes()).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.vertices[2], Point3::new(1.0, 1.0, 0.0));
        assert_eq!(mesh.normals[3], Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(mesh.colors[3], [10, 20, 30]);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_read_ply_without_optional_properties() {
        let text = "ply
format ascii 1.0
element vertex 3
property double x
property double y
property double z
element face 1
property list uchar uint vertex_index
end_header
0 0 0
1 0 0
0 1 0
3 0 1 2
";
        let mesh = read_ply(text.as_bytes()).unwrap();
        assert!(mesh.normals.is_empty());
        assert!(mesh.colors.is_empty());
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn test_read_malformed_ply() {
        let err = read_ply("not a ply".as_bytes()).unwrap_err();
        assert_eq!(err.kind, MalformedData);
    }

    #[test]
    fn test_write_then_read_ply() {
        let mesh = read_ply(QUAD.as_bytes()).unwrap();
        let colors = vec![[1, 2, 3], [4, 5, 6], [7, 8, 9], [10, 11, 12]];

        let mut buffer = Vec::new();
        write_ply(&mut buffer, &mesh, &colors).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.contains("property uchar red"));

        let loaded = read_ply(buffer.as_slice()).unwrap();
        assert_eq!(loaded.vertices, mesh.vertices);
        assert_eq!(loaded.faces, mesh.faces);
        assert_eq!(loaded.colors, colors);

        assert!(write_ply(&mut Vec::new(), &mesh, &colors[..2]).is_err());
    }
}
