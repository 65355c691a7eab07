use std::collections::HashMap;
use std::fmt::Write as _;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};

use crate::entity::MeshData;

/// Parses an OBJ file from memory into a [`MeshData`].
///
/// Faces with more than three corners are fan-triangulated. When every face
/// corner references texture coordinates at the same index as its position
/// (the layout this tool writes), positions and UVs are taken verbatim so a
/// load/export cycle preserves counts exactly; mismatched references fall
/// back to rebuilding a unified vertex list.
pub fn load_obj_from_str(data: &str) -> Result<MeshData> {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut faces: Vec<[FaceIndex; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vt" => uvs.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                triangulate_face(&polygon, &mut faces);
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }
    if faces.is_empty() {
        return Err(anyhow!("OBJ file does not define any faces"));
    }

    let resolved = resolve_faces(&faces, positions.len(), uvs.len())?;
    let mesh = if is_aligned(&resolved) {
        let triangles = resolved
            .iter()
            .map(|face| face.map(|corner| corner.position as u32))
            .collect();
        let uvs = (!uvs.is_empty() && uses_uvs(&resolved)).then(|| uvs.clone());
        MeshData::new(positions, triangles, uvs)
    } else {
        build_remapped(&positions, &uvs, &resolved)
    };
    mesh.ok_or_else(|| anyhow!("OBJ file does not define any usable geometry"))
}

/// Serializes a mesh as OBJ text: `v` lines, `vt` lines when UVs exist, and
/// 1-based `f` lines.
pub fn write_obj(mesh: &MeshData) -> String {
    let mut out = String::new();
    for position in mesh.positions() {
        let _ = writeln!(out, "v {} {} {}", position.x, position.y, position.z);
    }
    let uv_count = mesh.uv_count();
    if let Some(uvs) = mesh.uvs() {
        for uv in uvs {
            let _ = writeln!(out, "vt {} {}", uv.x, uv.y);
        }
    }
    for triangle in mesh.triangles() {
        out.push('f');
        for index in triangle {
            let one_based = index + 1;
            if (*index as usize) < uv_count {
                let _ = write!(out, " {one_based}/{one_based}");
            } else {
                let _ = write!(out, " {one_based}");
            }
        }
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
}

#[derive(Debug, Clone, Copy)]
struct ResolvedIndex {
    position: usize,
    uv: Option<usize>,
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = next_float(&mut parts)?;
    let y = next_float(&mut parts)?;
    let z = next_float(&mut parts)?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = next_float(&mut parts)?;
    let v = next_float(&mut parts)?;
    Ok(Vec2::new(u, v))
}

fn next_float<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<f32> {
    Ok(parts
        .next()
        .ok_or_else(|| anyhow!("missing component"))?
        .parse::<f32>()?)
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vt = segments
            .next()
            .map(|s| if s.is_empty() { 0 } else { s.parse::<i32>().unwrap_or(0) })
            .unwrap_or(0);
        indices.push(FaceIndex { v, vt });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    if polygon.len() < 3 {
        return;
    }
    for i in 1..(polygon.len() - 1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

fn resolve_faces(
    faces: &[[FaceIndex; 3]],
    position_count: usize,
    uv_count: usize,
) -> Result<Vec<[ResolvedIndex; 3]>> {
    faces
        .iter()
        .map(|face| {
            let mut resolved = [ResolvedIndex {
                position: 0,
                uv: None,
            }; 3];
            for (slot, index) in resolved.iter_mut().zip(face) {
                slot.position = fix_index(index.v, position_count)
                    .ok_or_else(|| anyhow!("invalid vertex index {}", index.v))?;
                slot.uv = fix_index(index.vt, uv_count);
            }
            Ok(resolved)
        })
        .collect()
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = (-index) as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

fn uses_uvs(faces: &[[ResolvedIndex; 3]]) -> bool {
    faces
        .iter()
        .any(|face| face.iter().any(|corner| corner.uv.is_some()))
}

fn is_aligned(faces: &[[ResolvedIndex; 3]]) -> bool {
    faces.iter().all(|face| {
        face.iter()
            .all(|corner| corner.uv.map_or(true, |uv| uv == corner.position))
    })
}

fn build_remapped(
    positions: &[Vec3],
    uvs: &[Vec2],
    faces: &[[ResolvedIndex; 3]],
) -> Option<MeshData> {
    let mut lookup: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    let mut out_positions = Vec::new();
    let mut out_uvs = Vec::new();
    let mut triangles = Vec::new();
    let has_uvs = uses_uvs(faces);

    for face in faces {
        let mut triangle = [0u32; 3];
        for (slot, corner) in triangle.iter_mut().zip(face) {
            let key = (corner.position, corner.uv);
            let next_index = out_positions.len() as u32;
            let entry = lookup.entry(key).or_insert_with(|| {
                out_positions.push(positions[corner.position]);
                if has_uvs {
                    out_uvs.push(corner.uv.map(|uv| uvs[uv]).unwrap_or(Vec2::ZERO));
                }
                next_index
            });
            *slot = *entry;
        }
        triangles.push(triangle);
    }

    MeshData::new(out_positions, triangles, has_uvs.then_some(out_uvs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangles(), &[[0, 1, 2]]);
        assert!(mesh.uvs().is_none());
    }

    #[test]
    fn quads_are_fan_triangulated() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.triangles(), &[[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn negative_indices_resolve_from_the_end() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.triangles(), &[[0, 1, 2]]);
    }

    #[test]
    fn aligned_uv_references_keep_arrays_verbatim() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nf 1/1 2/2 3/3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.uv_count(), 3);
        assert_eq!(mesh.uv(1), Some(Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn mismatched_uv_references_rebuild_the_vertex_list() {
        // Corner 1 and corner 2 share a position but disagree on UV.
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 1\nf 1/1 2/1 3/2\nf 1/2 2/1 3/2\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.uv_count(), 4);
    }

    #[test]
    fn export_then_load_preserves_counts() {
        let mesh = MeshData::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
            vec![[0, 1, 2], [0, 2, 3]],
            Some(vec![
                Vec2::ZERO,
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(0.25, 0.75),
            ]),
        )
        .unwrap();
        let text = write_obj(&mesh);
        let reloaded = load_obj_from_str(&text).unwrap();
        assert_eq!(reloaded.vertex_count(), mesh.vertex_count());
        assert_eq!(reloaded.triangle_count(), mesh.triangle_count());
        assert_eq!(reloaded.uv_count(), mesh.uv_count());
        assert_eq!(reloaded.positions(), mesh.positions());
        assert_eq!(reloaded.uvs(), mesh.uvs());
    }

    #[test]
    fn round_trip_without_uvs() {
        let mesh = MeshData::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![[0, 1, 2]],
            None,
        )
        .unwrap();
        let reloaded = load_obj_from_str(&write_obj(&mesh)).unwrap();
        assert_eq!(reloaded, mesh);
    }

    #[test]
    fn missing_faces_is_an_error() {
        assert!(load_obj_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\n").is_err());
    }
}
