use std::io::{BufRead, BufReader, Read};

use base::defs::{Error, ErrorKind::*, Result};

use crate::mesh::{fan_triangulate, Mesh};
use crate::misc::{Point3, Vector3};

const MAX_NUM_FACE_VERTICES: usize = 10;

#[derive(Default)]
struct ImportState {
    line: usize,
    mesh: Mesh,
    normals: Vec<Vector3>,
    vertex_normals: Vec<Option<Vector3>>,
}

/// Reads vertices, normals and faces of a Wavefront .obj stream. Texture
/// coordinates and materials are ignored.
pub fn read_obj<R: Read>(obj_reader: R) -> Result<Mesh> {
    let mut state = ImportState::default();

    for line_res in BufReader::new(obj_reader).lines() {
        let line = line_res?;
        state.line += 1;

        let parts: Vec<&str> = line.split_whitespace().collect();
        if !parts.is_empty() {
            match parts[0] {
                "f" => import_f(&mut state, &parts)?,
                "v" => import_v(&mut state, &parts)?,
                "vn" => import_vn(&mut state, &parts)?,
                _ => (),
            }
        }
    }

    let mut mesh = state.mesh;
    let normals: Option<Vec<Vector3>> =
        state.vertex_normals.into_iter().collect();
    match normals {
        Some(normals) if normals.len() == mesh.vertices.len() => {
            mesh.normals = normals
        }
        _ => (),
    }

    Ok(mesh)
}

fn import_f(state: &mut ImportState, parts: &[&str]) -> Result<()> {
    let num_vertices_err_res = |kind, prop| {
        let msg = "number of vertices in f-statement at line";
        Err(Error::new(kind, format!("{} {} {}", prop, msg, state.line)))
    };
    if parts.len() < 4 {
        return num_vertices_err_res(MalformedData, "bad");
    } else if parts.len() > MAX_NUM_FACE_VERTICES + 1 {
        return num_vertices_err_res(UnsupportedFeature, "unsupported");
    }

    let mut polygon = Vec::with_capacity(parts.len() - 1);
    for (i, part) in parts[1..].iter().enumerate() {
        let mut iter = part.split('/');
        let vertex = parse_f_component(state.line, iter.next(), i + 1, false)?;
        parse_f_component(state.line, iter.next(), i + 1, true)?;
        let normal = parse_f_component(state.line, iter.next(), i + 1, true)?;
        if iter.next().is_some() {
            let desc = format!(
                "malformed vertex {} in f-statement at line {}",
                i + 1,
                state.line
            );
            return Err(Error::new(MalformedData, desc));
        }

        let vi = vertex - 1;
        if vi >= state.mesh.vertices.len() {
            let desc = format!(
                "reference to unknown vertex {} in f-statement at line {}",
                vertex, state.line
            );
            return Err(Error::new(InconsistentState, desc));
        }
        if normal != 0 {
            add_normal(state, vi, normal)?;
        }
        polygon.push(vi);
    }

    fan_triangulate(&polygon, &mut state.mesh.faces);
    Ok(())
}

fn parse_f_component(
    line: usize,
    component: Option<&str>,
    vnum: usize,
    optional: bool,
) -> Result<usize> {
    let component = component.unwrap_or_default();
    if component.is_empty() && optional {
        return Ok(0);
    }

    let num = component.parse::<usize>().unwrap_or_default();
    if num != 0 {
        Ok(num)
    } else {
        let desc = format!(
            "malformed vertex {} in f-statement at line {}",
            vnum, line
        );
        Err(Error::new(MalformedData, desc))
    }
}

fn add_normal(state: &mut ImportState, vi: usize, normal: usize) -> Result<()> {
    let normal = state.normals.get(normal - 1).cloned().ok_or_else(|| {
        let desc = format!(
            "reference to unknown normal {} in f-statement at line {}",
            normal, state.line
        );
        Error::new(InconsistentState, desc)
    })?;

    let slot = &mut state.vertex_normals[vi];
    match slot {
        None => *slot = Some(normal),
        Some(existing) if *existing != normal => {
            let desc = format!(
                "multiple normals for vertex {} in f-statement at line {}",
                vi + 1,
                state.line
            );
            return Err(Error::new(InconsistentState, desc));
        }
        _ => (),
    }

    Ok(())
}

fn import_v(state: &mut ImportState, parts: &[&str]) -> Result<()> {
    if parts.len() < 4 || parts.len() > 7 {
        return Err(Error::new(
            MalformedData,
            format!("malformed v-statement at line {}", state.line),
        ));
    }

    let x = parse_coord("x-coordinate of v-statement", state.line, parts[1])?;
    let y = parse_coord("y-coordinate of v-statement", state.line, parts[2])?;
    let z = parse_coord("z-coordinate of v-statement", state.line, parts[3])?;

    state.mesh.vertices.push(Point3::new(x, y, z));
    state.vertex_normals.push(None);

    Ok(())
}

fn import_vn(state: &mut ImportState, parts: &[&str]) -> Result<()> {
    if parts.len() != 4 {
        return Err(Error::new(
            MalformedData,
            format!("malformed vn-statement at line {}", state.line),
        ));
    }

    let x = parse_coord("x-coordinate of vn-statement", state.line, parts[1])?;
    let y = parse_coord("y-coordinate of vn-statement", state.line, parts[2])?;
    let z = parse_coord("z-coordinate of vn-statement", state.line, parts[3])?;

    state.normals.push(Vector3::new(x, y, z));

    Ok(())
}

fn parse_coord(what: &str, line: usize, str: &str) -> Result<f64> {
    match str.parse::<f64>() {
        Ok(val) => Ok(val),
        Err(_) => Err(Error::new(
            MalformedData,
            format!("failed to parse {} at line {}", what, line),
        )),
    }
}
