//! Core modules for the asset inspector.
//!
//! The crate exposes the ingestion engine, the entity data model, and the
//! viewport building blocks as a library so the pieces stay testable and
//! easy to embed in headless tooling; the binary in `main.rs` wires them to
//! a window and the filesystem.

pub mod archive;
pub mod camera;
pub mod entity;
pub mod error;
pub mod export;
pub mod ingest;
pub mod model_io;
pub mod obj;
pub mod render;
pub mod texture;

pub use archive::{
    ArchiveObject, AssetArchive, BundleArchive, MeshPayload, ObjectContent, Triangles, TypeTag,
};
pub use camera::{FlyCamera, NavKey};
pub use entity::{EntityKind, EntityStore, ImageData, MeshData, RenderableEntity};
pub use error::InspectError;
pub use export::export_all;
pub use ingest::{ingest_archive, LoadSummary};
pub use model_io::{export_obj, load_model};
pub use obj::{load_obj_from_str, write_obj};
pub use render::Renderer;
pub use texture::{GpuTexture, TextureManager};
