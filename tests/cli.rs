use assert_cmd::prelude::*;
use once_cell::sync::Lazy;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

const FLAG_ENCRYPTED: u32 = 1;

/// Builds a bundle container byte-for-byte: header, payload blobs, TOC.
fn build_bundle(flags: u32, objects: &[(i64, u8, &str, Vec<u8>)]) -> Vec<u8> {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(b"UAB1");
    buffer.extend_from_slice(&1u32.to_le_bytes());
    buffer.extend_from_slice(&flags.to_le_bytes());
    buffer.extend_from_slice(&0u64.to_le_bytes());

    let mut located = Vec::new();
    for (id, kind, name, payload) in objects {
        located.push((*id, *kind, *name, buffer.len() as u64, payload.len() as u64));
        buffer.extend_from_slice(payload);
    }

    let toc_offset = buffer.len() as u64;
    buffer.extend_from_slice(&(located.len() as u32).to_le_bytes());
    for (id, kind, name, offset, size) in located {
        buffer.extend_from_slice(&(id as u64).to_le_bytes());
        buffer.push(kind);
        buffer.extend_from_slice(&(name.len() as u32).to_le_bytes());
        buffer.extend_from_slice(name.as_bytes());
        buffer.extend_from_slice(&offset.to_le_bytes());
        buffer.extend_from_slice(&size.to_le_bytes());
    }
    buffer[12..20].copy_from_slice(&toc_offset.to_le_bytes());
    buffer
}

fn png_bytes() -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([180, 60, 20, 255]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

fn geometry_payload() -> Vec<u8> {
    let vertices: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let uvs: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    let mut payload = Vec::new();
    payload.extend_from_slice(&3u32.to_le_bytes());
    for vertex in vertices {
        for component in vertex {
            payload.extend_from_slice(&component.to_le_bytes());
        }
    }
    payload.push(1); // grouped triples
    payload.extend_from_slice(&3u32.to_le_bytes());
    for index in [0u32, 1, 2] {
        payload.extend_from_slice(&index.to_le_bytes());
    }
    payload.push(1); // uvs present
    payload.extend_from_slice(&3u32.to_le_bytes());
    for uv in uvs {
        payload.extend_from_slice(&uv[0].to_le_bytes());
        payload.extend_from_slice(&uv[1].to_le_bytes());
    }
    payload
}

static SAMPLE_BUNDLE: Lazy<Vec<u8>> = Lazy::new(|| {
    build_bundle(
        0,
        &[
            (1, 1, "skin_01", png_bytes()),
            (2, 2, "char_skin_01_body", geometry_payload()),
            (3, 3, "notes", b"session log".to_vec()),
        ],
    )
});

fn write_bundle(bytes: &[u8]) -> NamedTempFile {
    let mut tmp = tempfile::Builder::new()
        .suffix(".bundle")
        .tempfile()
        .expect("temp bundle");
    tmp.write_all(bytes).expect("write bundle");
    tmp
}

#[test]
fn cli_lists_ingested_entities_in_order() {
    let bundle = write_bundle(&SAMPLE_BUNDLE);
    let mut cmd = Command::cargo_bin("asset-inspector").expect("binary exists");
    cmd.arg(bundle.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded bundle: 1 textures, 1 meshes"))
        .stdout(contains("Loaded 3 entities:"))
        .stdout(contains(" - [T] skin_01"))
        .stdout(contains(" - [S] notes"))
        .stdout(contains(" - [M] char_skin_01_body"));
}

#[test]
fn cli_exports_the_whole_batch() {
    let bundle = write_bundle(&SAMPLE_BUNDLE);
    let out_dir = TempDir::new().expect("temp dir");
    let mut cmd = Command::cargo_bin("asset-inspector").expect("binary exists");
    cmd.arg(bundle.path())
        .arg("--summary-only")
        .arg("--export-dir")
        .arg(out_dir.path());
    cmd.assert()
        .success()
        .stdout(contains("Exported 3 file(s)"));

    assert!(out_dir.path().join("skin_01.png").exists());
    assert!(out_dir.path().join("char_skin_01_body.obj").exists());
    let notes = std::fs::read_to_string(out_dir.path().join("notes.txt")).expect("notes.txt");
    assert_eq!(notes, "session log");
}

#[test]
fn cli_refuses_encrypted_bundles() {
    let bytes = build_bundle(FLAG_ENCRYPTED, &[(1, 3, "notes", b"secret".to_vec())]);
    let bundle = write_bundle(&bytes);
    let mut cmd = Command::cargo_bin("asset-inspector").expect("binary exists");
    cmd.arg(bundle.path()).arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("encrypted"));
}

#[test]
fn cli_loads_generic_obj_files() {
    let mut obj = tempfile::Builder::new()
        .suffix(".obj")
        .tempfile()
        .expect("temp obj");
    obj.write_all(b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n")
        .expect("write obj");
    let mut cmd = Command::cargo_bin("asset-inspector").expect("binary exists");
    cmd.arg(obj.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded 1 entities:"))
        .stdout(contains(" - [M] "));
}

#[test]
fn cli_rejects_unsupported_model_formats() {
    let mut file = tempfile::Builder::new()
        .suffix(".fbx")
        .tempfile()
        .expect("temp fbx");
    file.write_all(b"not a real model").expect("write file");
    let mut cmd = Command::cargo_bin("asset-inspector").expect("binary exists");
    cmd.arg(file.path()).arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("unsupported model format"));
}
