use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn glb_chunks(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut json_bytes = json.as_bytes().to_vec();
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }
    let mut bin_bytes = bin.to_vec();
    while bin_bytes.len() % 4 != 0 {
        bin_bytes.push(0);
    }
    let total = 12 + 8 + json_bytes.len() + 8 + bin_bytes.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&0x4654_6C67u32.to_le_bytes()); // "glTF"
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x4E4F_534Au32.to_le_bytes()); // "JSON"
    out.extend_from_slice(&json_bytes);
    out.extend_from_slice(&(bin_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x004E_4942u32.to_le_bytes()); // "BIN"
    out.extend_from_slice(&bin_bytes);
    out
}

fn tiny_glb() -> Vec<u8> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let indices: [u32; 3] = [0, 1, 2];
    let mut bin = Vec::new();
    for value in positions {
        bin.extend_from_slice(&value.to_le_bytes());
    }
    for value in indices {
        bin.extend_from_slice(&value.to_le_bytes());
    }
    let json = serde_json::json!({
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [{"mesh": 0, "name": "patty"}],
        "meshes": [{
            "name": "patty",
            "primitives": [{"attributes": {"POSITION": 0}, "indices": 1}]
        }],
        "buffers": [{"byteLength": bin.len()}],
        "bufferViews": [
            {"buffer": 0, "byteOffset": 0, "byteLength": 36},
            {"buffer": 0, "byteOffset": 36, "byteLength": 12}
        ],
        "accessors": [
            {
                "bufferView": 0,
                "componentType": 5126,
                "count": 3,
                "type": "VEC3",
                "min": [0.0, 0.0, 0.0],
                "max": [1.0, 1.0, 0.0]
            },
            {"bufferView": 1, "componentType": 5125, "count": 3, "type": "SCALAR"}
        ]
    })
    .to_string();
    glb_chunks(&json, &bin)
}

fn write_cubemap(asset_dir: &Path) {
    let dir = asset_dir.join("textures").join("environment");
    fs::create_dir_all(&dir).expect("environment dir");
    for face in ["px", "nx", "py", "ny", "pz", "nz"] {
        image::RgbaImage::from_pixel(2, 2, image::Rgba([90, 120, 200, 255]))
            .save(dir.join(format!("{face}.png")))
            .expect("face image");
    }
}

fn write_model(asset_dir: &Path, compressed: bool) {
    let dir = asset_dir.join("models");
    fs::create_dir_all(&dir).expect("models dir");
    let glb = tiny_glb();
    if compressed {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            writer.write_all(&glb).expect("compress model");
        }
        fs::write(dir.join("scene.glb.br"), out).expect("write model");
    } else {
        fs::write(dir.join("scene.glb"), glb).expect("write model");
    }
}

#[test]
fn headless_run_reports_the_loaded_scene() {
    let assets = TempDir::new().expect("temp asset dir");
    write_cubemap(assets.path());
    write_model(assets.path(), false);

    let settings = assets.path().join("settings.json");
    fs::write(
        &settings,
        r#"{"env_map_intensity": 2.5, "tone_mapping": "Reinhard"}"#,
    )
    .expect("settings file");

    let mut cmd = Command::cargo_bin("pbr-viewer").expect("binary exists");
    cmd.arg(assets.path())
        .arg("--headless")
        .arg("--settings")
        .arg(&settings);
    cmd.assert()
        .success()
        .stdout(contains("Loaded model with 1 meshes"))
        .stdout(contains("environment loaded"))
        .stdout(contains("toneMapping=Reinhard"))
        .stdout(contains("envMapIntensity=2.50"))
        .stdout(contains(" - patty env=2.50 castShadow=true receiveShadow=true"));
}

#[test]
fn headless_run_accepts_a_compressed_model() {
    let assets = TempDir::new().expect("temp asset dir");
    write_cubemap(assets.path());
    write_model(assets.path(), true);

    let mut cmd = Command::cargo_bin("pbr-viewer").expect("binary exists");
    cmd.arg(assets.path()).arg("--headless");
    cmd.assert()
        .success()
        .stdout(contains("Loaded model with 1 meshes"))
        .stdout(contains("Scene: 6 nodes (1 meshes, 1 lights)"));
}

#[test]
fn missing_assets_are_reported_without_aborting() {
    let assets = TempDir::new().expect("temp asset dir");

    let mut cmd = Command::cargo_bin("pbr-viewer").expect("binary exists");
    cmd.arg(assets.path()).arg("--headless");
    cmd.assert()
        .success()
        .stdout(contains("model failed to load"))
        .stdout(contains("environment failed to load"))
        .stdout(contains("Scene: 3 nodes (0 meshes, 1 lights), environment missing"));
}

#[test]
fn rejects_unknown_arguments() {
    let mut cmd = Command::cargo_bin("pbr-viewer").expect("binary exists");
    cmd.arg("assets").arg("--frobnicate");
    cmd.assert().failure().stderr(contains("Unknown argument"));
}
