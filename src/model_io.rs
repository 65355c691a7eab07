use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::entity::{ImageData, MeshData, RenderableEntity};
use crate::error::InspectError;
use crate::obj;

/// Loads a generic model file into a renderable entity.
///
/// Supported: `.obj` (own parser) and `.gltf`/`.glb` (the `gltf` importer).
/// Anything else, `.fbx` included, fails with an external-load error and
/// creates no entity.
pub fn load_model(path: &Path) -> Result<RenderableEntity, InspectError> {
    let load_err = |reason: String| InspectError::ExternalLoad {
        path: path.to_path_buf(),
        reason,
    };
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_lowercase)
        .unwrap_or_default();

    let (mesh, image) = match extension.as_str() {
        "obj" => {
            let text = fs::read_to_string(path).map_err(|err| load_err(err.to_string()))?;
            let mesh = obj::load_obj_from_str(&text).map_err(|err| load_err(format!("{err:#}")))?;
            (mesh, None)
        }
        "gltf" | "glb" => load_gltf(path).map_err(load_err)?,
        "" => return Err(load_err("file has no extension".to_string())),
        other => return Err(load_err(format!("unsupported model format .{other}"))),
    };

    let name = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("model")
        .to_string();
    Ok(RenderableEntity::mesh(name, mesh, image.map(Arc::new), None))
}

/// Writes a mesh to an OBJ-compatible file.
pub fn export_obj(mesh: &MeshData, path: &Path) -> Result<(), InspectError> {
    fs::write(path, obj::write_obj(mesh)).map_err(|err| InspectError::Export {
        name: path.display().to_string(),
        reason: err.to_string(),
    })
}

fn load_gltf(path: &Path) -> Result<(MeshData, Option<ImageData>), String> {
    let (document, buffers, images) = gltf::import(path).map_err(|err| err.to_string())?;

    let mut positions: Vec<Vec3> = Vec::new();
    let mut uvs: Vec<Vec2> = Vec::new();
    let mut triangles: Vec<[u32; 3]> = Vec::new();
    let mut has_uv = false;

    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &**data));
            let Some(position_reader) = reader.read_positions() else {
                continue;
            };
            let base = positions.len() as u32;
            positions.extend(position_reader.map(Vec3::from));
            let added = positions.len() - base as usize;

            match reader.read_tex_coords(0) {
                Some(coords) => {
                    has_uv = true;
                    uvs.extend(coords.into_f32().map(Vec2::from));
                }
                None => uvs.extend(std::iter::repeat(Vec2::ZERO).take(added)),
            }

            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..added as u32).collect(),
            };
            triangles.extend(
                indices
                    .chunks_exact(3)
                    .map(|chunk| [chunk[0] + base, chunk[1] + base, chunk[2] + base]),
            );
        }
    }

    let image = base_color_image(&document, &images);
    let mesh = MeshData::new(positions, triangles, has_uv.then_some(uvs))
        .ok_or_else(|| "file contains no triangle geometry".to_string())?;
    Ok((mesh, image))
}

/// Best-effort texture pickup: the base-color image of the first textured
/// primitive, when it uses an 8-bit RGB(A) encoding.
fn base_color_image(
    document: &gltf::Document,
    images: &[gltf::image::Data],
) -> Option<ImageData> {
    let info = document
        .meshes()
        .flat_map(|mesh| mesh.primitives())
        .find_map(|primitive| {
            primitive
                .material()
                .pbr_metallic_roughness()
                .base_color_texture()
        })?;
    let data = images.get(info.texture().source().index())?;
    convert_pixels(data.format, data.width, data.height, &data.pixels)
}

fn convert_pixels(
    format: gltf::image::Format,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Option<ImageData> {
    use gltf::image::Format;
    let pixels = match format {
        Format::R8G8B8A8 => pixels.to_vec(),
        Format::R8G8B8 => pixels
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
        _ => return None,
    };
    Some(ImageData {
        width,
        height,
        pixels,
    })
}
