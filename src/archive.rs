use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::entity::ImageData;
use crate::error::InspectError;

/// Declared object types recognized by the ingestion engine. Everything else
/// is carried as [`TypeTag::Unknown`] and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Texture2D,
    Mesh,
    TextAsset,
    MonoBehaviour,
    Unknown,
}

impl TypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Texture2D => "Texture2D",
            TypeTag::Mesh => "Mesh",
            TypeTag::TextAsset => "TextAsset",
            TypeTag::MonoBehaviour => "MonoBehaviour",
            TypeTag::Unknown => "Unknown",
        }
    }

    /// True for the tags whose payload is opaque text-like content.
    pub fn is_text(self) -> bool {
        matches!(self, TypeTag::TextAsset | TypeTag::MonoBehaviour)
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => TypeTag::Texture2D,
            2 => TypeTag::Mesh,
            3 => TypeTag::TextAsset,
            4 => TypeTag::MonoBehaviour,
            _ => TypeTag::Unknown,
        }
    }
}

/// Triangle indices as stored in the archive: either a flat sequence to be
/// grouped into consecutive triples, or pre-grouped triples.
#[derive(Debug, Clone, PartialEq)]
pub enum Triangles {
    Flat(Vec<u32>),
    Grouped(Vec<[u32; 3]>),
}

/// Raw geometry extracted from a mesh-typed object, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPayload {
    pub vertices: Vec<Vec3>,
    pub triangles: Triangles,
    pub uvs: Option<Vec<Vec2>>,
}

/// Decoded content of one archive object; the variant matches the type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectContent {
    Image(ImageData),
    Geometry(MeshPayload),
    Text(String),
}

type ObjectReader = dyn Fn() -> Result<ObjectContent, InspectError> + Send + Sync;

/// One object yielded by an archive. Decoding is deferred behind [`read`]
/// so text payloads can be extracted lazily at export time.
///
/// [`read`]: ArchiveObject::read
pub struct ArchiveObject {
    id: i64,
    tag: TypeTag,
    name: Option<String>,
    reader: Box<ObjectReader>,
}

impl ArchiveObject {
    pub fn new<F>(id: i64, tag: TypeTag, name: Option<String>, reader: F) -> Self
    where
        F: Fn() -> Result<ObjectContent, InspectError> + Send + Sync + 'static,
    {
        Self {
            id,
            tag,
            name: name.filter(|n| !n.is_empty()),
            reader: Box::new(reader),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Embedded name, if the object carried a non-empty one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Decodes the object's payload. May be called more than once.
    pub fn read(&self) -> Result<ObjectContent, InspectError> {
        (self.reader)()
    }
}

impl fmt::Debug for ArchiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveObject")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The archive-reader boundary: anything that can enumerate typed objects in
/// its native order. [`BundleArchive`] is the shipped backend; tests provide
/// in-memory fakes.
pub trait AssetArchive {
    fn objects(&self) -> Vec<Arc<ArchiveObject>>;
}

const MAGIC: &[u8; 4] = b"UAB1";
const HEADER_LEN: usize = 20;
const FLAG_ENCRYPTED: u32 = 1;

#[derive(Debug, Clone)]
struct BundleEntry {
    id: i64,
    tag: TypeTag,
    name: Option<String>,
    offset: u64,
    size: u64,
}

/// In-memory reader for `.assets`/`.bundle`/`.unity3d` containers.
///
/// The container is a TOC-indexed blob store: a fixed header, payload blobs,
/// and a trailing table of typed entries. Encrypted containers are refused
/// at open time; nothing here attempts to decrypt or validate payloads.
#[derive(Debug, Clone)]
pub struct BundleArchive {
    data: Arc<[u8]>,
    entries: Vec<BundleEntry>,
}

impl BundleArchive {
    /// Opens a bundle from disk, reading it fully into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, InspectError> {
        let path = path.as_ref();
        let open_err = |reason: String| InspectError::ArchiveOpen {
            path: path.to_path_buf(),
            reason,
        };
        let mut file = File::open(path).map_err(|err| open_err(err.to_string()))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|err| open_err(err.to_string()))?;
        Self::from_bytes(path.to_path_buf(), data)
    }

    /// Creates a bundle from bytes already resident in memory.
    pub fn from_bytes(label: PathBuf, data: Vec<u8>) -> Result<Self, InspectError> {
        let entries = parse_bundle(&data).map_err(|reason| InspectError::ArchiveOpen {
            path: label,
            reason,
        })?;
        Ok(Self {
            data: Arc::from(data.into_boxed_slice()),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AssetArchive for BundleArchive {
    fn objects(&self) -> Vec<Arc<ArchiveObject>> {
        self.entries
            .iter()
            .map(|entry| {
                let data = Arc::clone(&self.data);
                let entry = entry.clone();
                let (id, tag, name) = (entry.id, entry.tag, entry.name.clone());
                Arc::new(ArchiveObject::new(id, tag, name, move || {
                    let start = entry.offset as usize;
                    let end = start + entry.size as usize;
                    decode_payload(tag, id, &data[start..end])
                }))
            })
            .collect()
    }
}

fn parse_bundle(data: &[u8]) -> Result<Vec<BundleEntry>, String> {
    if data.len() < HEADER_LEN {
        return Err(format!("file too small to be a bundle (len={})", data.len()));
    }
    if &data[..4] != MAGIC {
        return Err("unrecognized bundle magic".to_string());
    }
    let flags = u32::from_le_bytes(data[8..12].try_into().expect("slice length verified"));
    if flags & FLAG_ENCRYPTED != 0 {
        return Err("bundle reports itself encrypted".to_string());
    }
    let toc_offset = u64::from_le_bytes(data[12..20].try_into().expect("slice length verified"));
    let mut cursor =
        usize::try_from(toc_offset).map_err(|_| "TOC offset out of range".to_string())?;
    if cursor < HEADER_LEN || cursor >= data.len() {
        return Err(format!("TOC offset {toc_offset} is outside file bounds"));
    }

    let count = read_u32(data, &mut cursor)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = read_u64(data, &mut cursor)? as i64;
        let kind = read_u8(data, &mut cursor)?;
        let name_len = read_u32(data, &mut cursor)? as usize;
        let name_end = cursor
            .checked_add(name_len)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| "entry name extends past file bounds".to_string())?;
        let name = String::from_utf8(data[cursor..name_end].to_vec())
            .map_err(|err| format!("invalid UTF-8 in entry name: {err}"))?;
        cursor = name_end;
        let offset = read_u64(data, &mut cursor)?;
        let size = read_u64(data, &mut cursor)?;
        if offset
            .checked_add(size)
            .filter(|end| *end <= data.len() as u64)
            .is_none()
        {
            return Err(format!(
                "entry {name} points outside file bounds (offset={offset}, size={size})"
            ));
        }
        entries.push(BundleEntry {
            id,
            tag: TypeTag::from_code(kind),
            name: Some(name).filter(|n| !n.is_empty()),
            offset,
            size,
        });
    }
    Ok(entries)
}

fn read_u8(data: &[u8], cursor: &mut usize) -> Result<u8, String> {
    let value = *data
        .get(*cursor)
        .ok_or_else(|| "unexpected end of bundle while reading byte".to_string())?;
    *cursor += 1;
    Ok(value)
}

fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32, String> {
    let end = *cursor + 4;
    if end > data.len() {
        return Err("unexpected end of bundle while reading 32-bit value".to_string());
    }
    let value = u32::from_le_bytes(data[*cursor..end].try_into().expect("slice length verified"));
    *cursor = end;
    Ok(value)
}

fn read_u64(data: &[u8], cursor: &mut usize) -> Result<u64, String> {
    let end = *cursor + 8;
    if end > data.len() {
        return Err("unexpected end of bundle while reading 64-bit value".to_string());
    }
    let value = u64::from_le_bytes(data[*cursor..end].try_into().expect("slice length verified"));
    *cursor = end;
    Ok(value)
}

fn decode_payload(tag: TypeTag, id: i64, bytes: &[u8]) -> Result<ObjectContent, InspectError> {
    let decode_err = |reason: String| InspectError::ObjectDecode {
        id,
        tag: tag.as_str(),
        reason,
    };
    match tag {
        TypeTag::Texture2D => {
            let image =
                image::load_from_memory(bytes).map_err(|err| decode_err(err.to_string()))?;
            let rgba = image.to_rgba8();
            Ok(ObjectContent::Image(ImageData {
                width: rgba.width(),
                height: rgba.height(),
                pixels: rgba.into_raw(),
            }))
        }
        TypeTag::Mesh => decode_geometry(bytes)
            .map(ObjectContent::Geometry)
            .map_err(decode_err),
        TypeTag::TextAsset | TypeTag::MonoBehaviour => Ok(ObjectContent::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        TypeTag::Unknown => Err(decode_err("unknown object type".to_string())),
    }
}

fn decode_geometry(bytes: &[u8]) -> Result<MeshPayload, String> {
    let mut cursor = 0usize;
    let vertex_count = read_u32(bytes, &mut cursor)? as usize;
    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        let x = read_f32(bytes, &mut cursor)?;
        let y = read_f32(bytes, &mut cursor)?;
        let z = read_f32(bytes, &mut cursor)?;
        vertices.push(Vec3::new(x, y, z));
    }

    let mode = read_u8(bytes, &mut cursor)?;
    let index_count = read_u32(bytes, &mut cursor)? as usize;
    let mut indices = Vec::with_capacity(index_count);
    for _ in 0..index_count {
        indices.push(read_u32(bytes, &mut cursor)?);
    }
    // Flat sequences are passed through untouched; grouping them (and
    // rejecting stray lengths) is the ingestion engine's call.
    let triangles = match mode {
        0 => Triangles::Flat(indices),
        1 => {
            if indices.len() % 3 != 0 {
                return Err("grouped index list length is not a multiple of 3".to_string());
            }
            Triangles::Grouped(
                indices
                    .chunks_exact(3)
                    .map(|chunk| [chunk[0], chunk[1], chunk[2]])
                    .collect(),
            )
        }
        other => return Err(format!("unknown triangle encoding {other}")),
    };

    let uvs = if read_u8(bytes, &mut cursor)? != 0 {
        let uv_count = read_u32(bytes, &mut cursor)? as usize;
        let mut uvs = Vec::with_capacity(uv_count);
        for _ in 0..uv_count {
            let u = read_f32(bytes, &mut cursor)?;
            let v = read_f32(bytes, &mut cursor)?;
            uvs.push(Vec2::new(u, v));
        }
        Some(uvs)
    } else {
        None
    };

    Ok(MeshPayload {
        vertices,
        triangles,
        uvs,
    })
}

fn read_f32(data: &[u8], cursor: &mut usize) -> Result<f32, String> {
    let end = *cursor + 4;
    if end > data.len() {
        return Err("unexpected end of bundle while reading float".to_string());
    }
    let value = f32::from_le_bytes(data[*cursor..end].try_into().expect("slice length verified"));
    *cursor = end;
    Ok(value)
}


#[cfg(test)]
mod tests {
    use super::test_support::{geometry_payload, png_bytes, BundleBuilder};
    use super::*;

    #[test]
    fn open_bundle_lists_typed_objects() {
        let bytes = BundleBuilder::new()
            .object(1, 1, "skin_01", png_bytes(2, 2))
            .object(2, 3, "readme", b"hello".to_vec())
            .build();
        let bundle = BundleArchive::from_bytes(PathBuf::from("test.bundle"), bytes).unwrap();
        let objects = bundle.objects();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].tag(), TypeTag::Texture2D);
        assert_eq!(objects[0].name(), Some("skin_01"));
        assert_eq!(objects[1].tag(), TypeTag::TextAsset);
    }

    #[test]
    fn encrypted_bundle_is_refused_at_open() {
        let bytes = BundleBuilder::new()
            .object(1, 3, "readme", b"hello".to_vec())
            .encrypted()
            .build();
        let err = BundleArchive::from_bytes(PathBuf::from("locked.bundle"), bytes).unwrap_err();
        assert!(matches!(err, InspectError::ArchiveOpen { .. }));
        assert!(err.to_string().contains("encrypted"));
    }

    #[test]
    fn bad_magic_is_refused() {
        let err =
            BundleArchive::from_bytes(PathBuf::from("junk.bundle"), vec![0u8; 64]).unwrap_err();
        assert!(matches!(err, InspectError::ArchiveOpen { .. }));
    }

    #[test]
    fn truncated_toc_is_refused() {
        let mut bytes = BundleBuilder::new()
            .object(1, 3, "readme", b"hello".to_vec())
            .build();
        bytes.truncate(bytes.len() - 4);
        assert!(BundleArchive::from_bytes(PathBuf::from("cut.bundle"), bytes).is_err());
    }

    #[test]
    fn geometry_payload_round_trips_both_index_forms() {
        let vertices = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let flat = geometry_payload(&vertices, Some(&[0, 1, 2]), None, None);
        let grouped = geometry_payload(&vertices, None, Some(&[[0, 1, 2]]), Some(&[[0.0, 1.0]]));

        match decode_geometry(&flat).unwrap().triangles {
            Triangles::Flat(indices) => assert_eq!(indices, vec![0, 1, 2]),
            other => panic!("expected flat indices, got {other:?}"),
        }
        let payload = decode_geometry(&grouped).unwrap();
        assert_eq!(payload.triangles, Triangles::Grouped(vec![[0, 1, 2]]));
        assert_eq!(payload.uvs, Some(vec![Vec2::new(0.0, 1.0)]));
    }

    #[test]
    fn texture_payload_decodes_to_rgba() {
        let bytes = BundleBuilder::new().object(9, 1, "", png_bytes(4, 2)).build();
        let bundle = BundleArchive::from_bytes(PathBuf::from("tex.bundle"), bytes).unwrap();
        let object = &bundle.objects()[0];
        assert_eq!(object.name(), None);
        match object.read().unwrap() {
            ObjectContent::Image(image) => {
                assert_eq!((image.width, image.height), (4, 2));
                assert_eq!(image.pixels.len(), 4 * 2 * 4);
            }
            other => panic!("expected image content, got {other:?}"),
        }
    }

    #[test]
    fn broken_texture_payload_fails_read_not_open() {
        let bytes = BundleBuilder::new().object(9, 1, "junk", vec![0u8; 16]).build();
        let bundle = BundleArchive::from_bytes(PathBuf::from("tex.bundle"), bytes).unwrap();
        let err = bundle.objects()[0].read().unwrap_err();
        assert!(matches!(err, InspectError::ObjectDecode { .. }));
    }
}
