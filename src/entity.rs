use std::sync::Arc;

use glam::{Vec2, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::archive::ArchiveObject;
use crate::texture::GpuTexture;

/// Decoded RGBA8 pixel data. Source of truth for an entity's image; any GPU
/// texture built from it is a derived cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Triangle mesh with validated indices and optional per-vertex UVs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    uvs: Option<Vec<Vec2>>,
}

impl MeshData {
    /// Builds a mesh, rejecting empty geometry and out-of-range indices.
    ///
    /// The UV array is allowed to be shorter than the vertex list; lookups
    /// past its end are treated as absent (see [`MeshData::uv`]).
    pub fn new(
        positions: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
        uvs: Option<Vec<Vec2>>,
    ) -> Option<Self> {
        if positions.is_empty() || triangles.is_empty() {
            return None;
        }
        let limit = positions.len() as u32;
        if triangles
            .iter()
            .any(|tri| tri.iter().any(|index| *index >= limit))
        {
            return None;
        }
        let uvs = uvs.filter(|list| !list.is_empty());
        Some(Self {
            positions,
            triangles,
            uvs,
        })
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn uvs(&self) -> Option<&[Vec2]> {
        self.uvs.as_deref()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn uv_count(&self) -> usize {
        self.uvs.as_ref().map_or(0, Vec::len)
    }

    /// Per-vertex UV lookup; `None` when the array is absent or too short.
    pub fn uv(&self, index: usize) -> Option<Vec2> {
        self.uvs.as_ref().and_then(|list| list.get(index)).copied()
    }

    /// Mean of the vertex positions.
    pub fn centroid(&self) -> Vec3 {
        let sum: Vec3 = self.positions.iter().copied().sum();
        sum / self.positions.len() as f32
    }

    /// Axis-aligned bounding-box dimensions.
    pub fn extents(&self) -> Vec3 {
        let mut min = self.positions[0];
        let mut max = self.positions[0];
        for position in &self.positions[1..] {
            min = min.min(*position);
            max = max.max(*position);
        }
        max - min
    }
}

/// Presentation category shown in front of the entity name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Model,
    Texture,
    Script,
}

impl EntityKind {
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Model => "[M]",
            EntityKind::Texture => "[T]",
            EntityKind::Script => "[S]",
        }
    }
}

/// The unit of loaded content: an optional mesh, an optional image, and
/// display metadata. Created only by the ingestion engine and the model
/// loader.
#[derive(Debug, Clone)]
pub struct RenderableEntity {
    pub name: String,
    pub kind: EntityKind,
    pub mesh: Option<MeshData>,
    pub texture_image: Option<Arc<ImageData>>,
    /// Derived GPU cache; recreated whenever the context generation changes.
    pub gpu_texture: Option<GpuTexture>,
    /// Back-reference for deferred extraction at export time only.
    pub raw_source: Option<Arc<ArchiveObject>>,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl RenderableEntity {
    fn bare(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            mesh: None,
            texture_image: None,
            gpu_texture: None,
            raw_source: None,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }

    pub fn texture(
        name: impl Into<String>,
        image: Arc<ImageData>,
        raw_source: Option<Arc<ArchiveObject>>,
    ) -> Self {
        Self {
            texture_image: Some(image),
            raw_source,
            ..Self::bare(name, EntityKind::Texture)
        }
    }

    pub fn mesh(
        name: impl Into<String>,
        mesh: MeshData,
        image: Option<Arc<ImageData>>,
        raw_source: Option<Arc<ArchiveObject>>,
    ) -> Self {
        Self {
            mesh: Some(mesh),
            texture_image: image,
            raw_source,
            ..Self::bare(name, EntityKind::Model)
        }
    }

    pub fn script(name: impl Into<String>, raw_source: Arc<ArchiveObject>) -> Self {
        Self {
            raw_source: Some(raw_source),
            ..Self::bare(name, EntityKind::Script)
        }
    }

    /// Name with the category tag, as shown in listings.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.kind.tag(), self.name)
    }
}

/// Process-wide ordered entity collection; insertion order doubles as the
/// display order and the selection index.
#[derive(Debug, Default)]
pub struct EntityStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Debug, Default)]
struct StoreInner {
    entities: Vec<RenderableEntity>,
    revision: u64,
}

impl Clone for EntityStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entities.is_empty()
    }

    /// Appends a batch in order. Entities are never removed individually.
    pub fn append_batch(&self, batch: Vec<RenderableEntity>) {
        self.inner.write().entities.extend(batch);
    }

    /// Clears the collection and bumps the revision so renderer-side caches
    /// keyed by entity index drop with it.
    pub fn reset(&self) {
        let mut guard = self.inner.write();
        guard.entities.clear();
        guard.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    pub fn display_names(&self) -> Vec<String> {
        self.inner
            .read()
            .entities
            .iter()
            .map(RenderableEntity::display_name)
            .collect()
    }

    /// Applies a mutation to the entity at `index`.
    pub fn with_entity_mut<F, R>(&self, index: usize, f: F) -> Option<R>
    where
        F: FnOnce(&mut RenderableEntity) -> R,
    {
        let mut guard = self.inner.write();
        guard.entities.get_mut(index).map(f)
    }

    pub fn with_all<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[RenderableEntity]) -> R,
    {
        f(&self.inner.read().entities)
    }

    pub fn with_all_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut [RenderableEntity]) -> R,
    {
        f(&mut self.inner.write().entities)
    }
}
