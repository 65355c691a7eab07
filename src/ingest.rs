use std::sync::Arc;

use log::warn;

use crate::archive::{ArchiveObject, AssetArchive, MeshPayload, ObjectContent, Triangles, TypeTag};
use crate::entity::{ImageData, MeshData, RenderableEntity};

/// Counts reported to the user after a bundle load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub textures: usize,
    pub meshes: usize,
}

struct MeshCandidate {
    name: String,
    mesh: MeshData,
    raw: Arc<ArchiveObject>,
}

/// Walks every object the archive yields and reconstructs renderable
/// entities.
///
/// Two explicit passes: the first emits texture and text entities inline (in
/// the reader's enumeration order) while collecting the texture name table
/// and deferring mesh candidates; the second resolves texture association
/// and emits the meshes. Per-object failures are logged and skipped; they
/// never abort the scan.
pub fn ingest_archive(archive: &dyn AssetArchive) -> (Vec<RenderableEntity>, LoadSummary) {
    let mut entities = Vec::new();
    let mut texture_table: Vec<(String, Arc<ImageData>)> = Vec::new();
    let mut candidates: Vec<MeshCandidate> = Vec::new();

    for object in archive.objects() {
        match object.tag() {
            TypeTag::Texture2D => match object.read() {
                Ok(ObjectContent::Image(image)) => {
                    let name = object
                        .name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("texture_{}", object.id()));
                    let image = Arc::new(image);
                    texture_table.push((name.clone(), Arc::clone(&image)));
                    entities.push(RenderableEntity::texture(
                        name,
                        image,
                        Some(Arc::clone(&object)),
                    ));
                }
                Ok(_) => warn!(
                    "object {} declared Texture2D but decoded to another payload; skipping",
                    object.id()
                ),
                Err(err) => warn!("{err}"),
            },
            TypeTag::Mesh => match object.read() {
                Ok(ObjectContent::Geometry(payload)) => {
                    let name = object
                        .name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("mesh_{}", object.id()));
                    // Missing vertices, an empty triangle list, a flat index
                    // run that is not a multiple of 3, or an out-of-range
                    // index all discard the candidate.
                    if let Some(mesh) = build_mesh(payload) {
                        candidates.push(MeshCandidate {
                            name,
                            mesh,
                            raw: Arc::clone(&object),
                        });
                    }
                }
                Ok(_) => warn!(
                    "object {} declared Mesh but decoded to another payload; skipping",
                    object.id()
                ),
                Err(err) => warn!("{err}"),
            },
            TypeTag::TextAsset | TypeTag::MonoBehaviour => {
                let name = object
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("text_{}", object.id()));
                entities.push(RenderableEntity::script(name, Arc::clone(&object)));
            }
            TypeTag::Unknown => {}
        }
    }

    let summary = LoadSummary {
        textures: texture_table.len(),
        meshes: candidates.len(),
    };
    for candidate in candidates {
        let image = associate(&texture_table, &candidate.name);
        entities.push(RenderableEntity::mesh(
            candidate.name,
            candidate.mesh,
            image,
            Some(candidate.raw),
        ));
    }
    (entities, summary)
}

fn build_mesh(payload: MeshPayload) -> Option<MeshData> {
    let triangles = normalize_triangles(payload.triangles)?;
    MeshData::new(payload.vertices, triangles, payload.uvs)
}

/// Normalizes the two archive index forms to triples. A flat sequence whose
/// length is not a multiple of 3 is invalid and yields `None`.
pub fn normalize_triangles(triangles: Triangles) -> Option<Vec<[u32; 3]>> {
    match triangles {
        Triangles::Grouped(triples) => Some(triples),
        Triangles::Flat(flat) => {
            if flat.len() % 3 != 0 {
                return None;
            }
            Some(
                flat.chunks_exact(3)
                    .map(|chunk| [chunk[0], chunk[1], chunk[2]])
                    .collect(),
            )
        }
    }
}

/// Best-effort texture lookup for a mesh name: the first table entry (in
/// insertion order) whose name contains the mesh name case-insensitively, or
/// vice versa. Ties break purely on table order; no match is a valid
/// outcome.
pub fn associate(table: &[(String, Arc<ImageData>)], mesh_name: &str) -> Option<Arc<ImageData>> {
    let mesh_lower = mesh_name.to_lowercase();
    table
        .iter()
        .find(|(texture_name, _)| {
            let texture_lower = texture_name.to_lowercase();
            mesh_lower.contains(&texture_lower) || texture_lower.contains(&mesh_lower)
        })
        .map(|(_, image)| Arc::clone(image))
}
