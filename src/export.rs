use std::fs;
use std::path::Path;

use log::warn;

use crate::archive::ObjectContent;
use crate::entity::{ImageData, RenderableEntity};
use crate::error::InspectError;
use crate::model_io;

/// Writes every entity's recoverable content into `dir`: loose images as
/// PNG, meshes as OBJ, and text payloads (extracted lazily from the archive
/// back-reference) as TXT. Failures are logged per entity and never abort
/// the batch. Returns the number of files written.
pub fn export_all(entities: &[RenderableEntity], dir: &Path) -> usize {
    entities
        .iter()
        .map(|entity| export_entity(entity, dir))
        .sum()
}

fn export_entity(entity: &RenderableEntity, dir: &Path) -> usize {
    let mut written = 0;

    if entity.mesh.is_none() {
        if let Some(image) = entity.texture_image.as_ref() {
            let path = dir.join(format!("{}.png", entity.name));
            match write_png(&entity.name, image, &path) {
                Ok(()) => written += 1,
                Err(err) => warn!("{err}"),
            }
        }
    }

    if let Some(mesh) = entity.mesh.as_ref() {
        let stem = entity.name.replace(' ', "_");
        match model_io::export_obj(mesh, &dir.join(format!("{stem}.obj"))) {
            Ok(()) => written += 1,
            Err(err) => warn!("{err}"),
        }
    }

    if let Some(raw) = entity.raw_source.as_ref() {
        if raw.tag().is_text() {
            let path = dir.join(format!("{}.txt", entity.name));
            match write_text(entity, &path) {
                Ok(()) => written += 1,
                Err(err) => warn!("{err}"),
            }
        }
    }

    written
}

fn write_png(name: &str, image: &ImageData, path: &Path) -> Result<(), InspectError> {
    image::save_buffer(
        path,
        &image.pixels,
        image.width,
        image.height,
        image::ColorType::Rgba8,
    )
    .map_err(|err| InspectError::Export {
        name: name.to_string(),
        reason: err.to_string(),
    })
}

fn write_text(entity: &RenderableEntity, path: &Path) -> Result<(), InspectError> {
    let export_err = |reason: String| InspectError::Export {
        name: entity.name.clone(),
        reason,
    };
    let raw = entity
        .raw_source
        .as_ref()
        .ok_or_else(|| export_err("entity has no archive back-reference".to_string()))?;
    // Deferred extraction: the payload is only decoded now, at export time.
    let content = match raw.read().map_err(|err| export_err(err.to_string()))? {
        ObjectContent::Text(text) => text,
        other => return Err(export_err(format!("expected text payload, found {other:?}"))),
    };
    fs::write(path, content).map_err(|err| export_err(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveObject, TypeTag};
    use crate::entity::MeshData;
    use glam::Vec3;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn image() -> Arc<ImageData> {
        Arc::new(ImageData {
            width: 2,
            height: 2,
            pixels: vec![9; 16],
        })
    }

    fn mesh() -> MeshData {
        MeshData::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![[0, 1, 2]], None).unwrap()
    }

    fn text_source(content: &str) -> Arc<ArchiveObject> {
        let content = content.to_string();
        Arc::new(ArchiveObject::new(
            1,
            TypeTag::TextAsset,
            None,
            move || Ok(ObjectContent::Text(content.clone())),
        ))
    }

    #[test]
    fn loose_textures_export_as_png() {
        let dir = TempDir::new().unwrap();
        let entities = vec![RenderableEntity::texture("skin_01", image(), None)];
        assert_eq!(export_all(&entities, dir.path()), 1);
        let reloaded = image::open(dir.path().join("skin_01.png")).unwrap();
        assert_eq!(reloaded.width(), 2);
    }

    #[test]
    fn mesh_names_swap_spaces_for_underscores() {
        let dir = TempDir::new().unwrap();
        let entities = vec![RenderableEntity::mesh(
            "broken sword",
            mesh(),
            Some(image()),
            None,
        )];
        assert_eq!(export_all(&entities, dir.path()), 1);
        assert!(dir.path().join("broken_sword.obj").exists());
        // A textured mesh exports only its geometry, not a PNG.
        assert!(!dir.path().join("broken sword.png").exists());
    }

    #[test]
    fn text_payloads_extract_lazily() {
        let dir = TempDir::new().unwrap();
        let entities = vec![RenderableEntity::script("notes", text_source("do later"))];
        assert_eq!(export_all(&entities, dir.path()), 1);
        let content = fs::read_to_string(dir.path().join("notes.txt")).unwrap();
        assert_eq!(content, "do later");
    }

    #[test]
    fn one_failing_entity_does_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        let failing = Arc::new(ArchiveObject::new(2, TypeTag::TextAsset, None, || {
            Err(InspectError::ObjectDecode {
                id: 2,
                tag: "TextAsset",
                reason: "forced failure".to_string(),
            })
        }));
        let entities = vec![
            RenderableEntity::script("bad", failing),
            RenderableEntity::texture("good", image(), None),
        ];
        assert_eq!(export_all(&entities, dir.path()), 1);
        assert!(dir.path().join("good.png").exists());
    }
}
