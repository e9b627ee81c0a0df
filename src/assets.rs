use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use glam::{Quat, Vec3, Vec4};
use thiserror::Error;

use crate::scene::{
    EnvironmentMap, Geometry, Node, NodeId, Scene, StandardMaterial, Transform,
};

/// Name of the group node the loaded model is grafted under; the debug
/// panel looks the model up by this name.
pub const MODEL_ROOT: &str = "model";

/// Cubemap face basenames, ordered +X -X +Y -Y +Z -Z.
pub const CUBEMAP_FACES: [&str; 6] = ["px", "nx", "py", "ny", "pz", "nz"];

/// Failures produced by the asset loaders.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("model decompression failed: {0}")]
    Decompress(std::io::Error),

    #[error("failed to parse model: {0}")]
    Model(#[from] gltf::Error),

    #[error("model defines no mesh primitives")]
    EmptyModel,

    #[error("mesh primitive is missing vertex positions")]
    MissingPositions,

    #[error("cubemap face {face}: {source}")]
    Face {
        face: &'static str,
        source: image::ImageError,
    },

    #[error("cubemap face {face} is {width}x{height}, faces must be square")]
    FaceNotSquare {
        face: &'static str,
        width: u32,
        height: u32,
    },

    #[error("cubemap face {face} is {size}px, other faces are {expected}px")]
    FaceSizeMismatch {
        face: &'static str,
        size: u32,
        expected: u32,
    },
}

/// One imported mesh primitive: geometry plus its material.
#[derive(Debug, Clone)]
pub struct ImportedMesh {
    pub name: String,
    pub geometry: Arc<Geometry>,
    pub material: StandardMaterial,
}

/// One imported model node with its subtree.
#[derive(Debug, Clone)]
pub struct ModelNode {
    pub name: String,
    pub transform: Transform,
    pub meshes: Vec<ImportedMesh>,
    pub children: Vec<ModelNode>,
}

/// Fully decoded model, detached from any scene until grafted.
#[derive(Debug, Clone)]
pub struct ModelData {
    pub roots: Vec<ModelNode>,
    pub mesh_count: usize,
}

/// Resolves the six cubemap face paths under `<dir>/textures/environment`,
/// preferring `.jpg` and falling back to `.png`.
pub fn cubemap_paths(asset_dir: &Path) -> [PathBuf; 6] {
    let base = asset_dir.join("textures").join("environment");
    CUBEMAP_FACES.map(|face| {
        let jpg = base.join(format!("{face}.jpg"));
        if jpg.exists() {
            jpg
        } else {
            base.join(format!("{face}.png"))
        }
    })
}

/// Resolves the model path under `<dir>/models`, preferring the
/// Brotli-compressed container when present.
pub fn model_path(asset_dir: &Path) -> PathBuf {
    let base = asset_dir.join("models");
    let compressed = base.join("scene.glb.br");
    if compressed.exists() {
        compressed
    } else {
        base.join("scene.glb")
    }
}

/// Loads and validates the six cubemap faces into one environment map.
pub fn load_cubemap(paths: &[PathBuf; 6]) -> Result<EnvironmentMap, AssetError> {
    let mut size = 0u32;
    let mut faces: Vec<Vec<u8>> = Vec::with_capacity(6);
    for (index, path) in paths.iter().enumerate() {
        let face = CUBEMAP_FACES[index];
        let pixels = image::open(path)
            .map_err(|source| AssetError::Face { face, source })?
            .to_rgba8();
        let (width, height) = pixels.dimensions();
        if width != height {
            return Err(AssetError::FaceNotSquare {
                face,
                width,
                height,
            });
        }
        if index == 0 {
            size = width;
        } else if width != size {
            return Err(AssetError::FaceSizeMismatch {
                face,
                size: width,
                expected: size,
            });
        }
        faces.push(pixels.into_raw());
    }
    let faces: [Vec<u8>; 6] = faces.try_into().expect("six faces collected");
    Ok(EnvironmentMap { size, faces })
}

/// Reads and decodes a model file from disk.
pub fn load_model(path: &Path) -> Result<ModelData, AssetError> {
    let bytes = fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_model(&bytes)
}

/// Decodes model bytes: a GLB (or JSON glTF) payload, optionally wrapped
/// in a Brotli stream. The wrapper is detected by the missing glTF magic.
pub fn decode_model(bytes: &[u8]) -> Result<ModelData, AssetError> {
    let decompressed;
    let payload = if is_gltf_payload(bytes) {
        bytes
    } else {
        let mut out = Vec::new();
        brotli::Decompressor::new(bytes, 4096)
            .read_to_end(&mut out)
            .map_err(AssetError::Decompress)?;
        decompressed = out;
        &decompressed
    };

    let (document, buffers, _images) = gltf::import_slice(payload)?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(AssetError::EmptyModel)?;

    let mut roots = Vec::new();
    for node in scene.nodes() {
        roots.push(import_node(&node, &buffers)?);
    }

    let mesh_count = count_meshes(&roots);
    if mesh_count == 0 {
        return Err(AssetError::EmptyModel);
    }

    Ok(ModelData { roots, mesh_count })
}

/// Grafts a decoded model under `parent` as a single group named
/// [`MODEL_ROOT`] carrying `root_transform`. Nothing is inserted before
/// this call, so a failed load leaves the scene untouched.
pub fn apply_model(
    scene: &mut Scene,
    parent: NodeId,
    data: &ModelData,
    root_transform: Transform,
) -> NodeId {
    let root = scene.add_node(parent, Node::group(MODEL_ROOT).with_transform(root_transform));
    for node in &data.roots {
        graft_node(scene, root, node);
    }
    root
}

fn graft_node(scene: &mut Scene, parent: NodeId, node: &ModelNode) {
    let id = scene.add_node(
        parent,
        Node::group(node.name.clone()).with_transform(node.transform),
    );
    for mesh in &node.meshes {
        scene.add_node(
            id,
            Node::mesh(
                mesh.name.clone(),
                Arc::clone(&mesh.geometry),
                mesh.material.clone(),
            ),
        );
    }
    for child in &node.children {
        graft_node(scene, id, child);
    }
}

fn is_gltf_payload(bytes: &[u8]) -> bool {
    bytes.starts_with(b"glTF")
        || bytes
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'{')
}

fn count_meshes(nodes: &[ModelNode]) -> usize {
    nodes
        .iter()
        .map(|node| node.meshes.len() + count_meshes(&node.children))
        .sum()
}

fn import_node(
    node: &gltf::Node<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<ModelNode, AssetError> {
    let (translation, rotation, scale) = node.transform().decomposed();
    let transform = Transform {
        position: Vec3::from(translation),
        rotation: quat_to_euler(rotation),
        scale: Vec3::from(scale),
    };

    let mut meshes = Vec::new();
    if let Some(mesh) = node.mesh() {
        let base = mesh.name().unwrap_or("mesh").to_string();
        for (index, primitive) in mesh.primitives().enumerate() {
            let geometry = import_primitive(&primitive, buffers)?;
            let material = import_material(&primitive.material());
            let name = if index == 0 {
                base.clone()
            } else {
                format!("{base}.{index}")
            };
            meshes.push(ImportedMesh {
                name,
                geometry: Arc::new(geometry),
                material,
            });
        }
    }

    let mut children = Vec::new();
    for child in node.children() {
        children.push(import_node(&child, buffers)?);
    }

    Ok(ModelNode {
        name: node.name().unwrap_or("node").to_string(),
        transform,
        meshes,
        children,
    })
}

fn import_primitive(
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<Geometry, AssetError> {
    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or(AssetError::MissingPositions)?
        .collect();

    let normals: Vec<[f32; 3]> = reader
        .read_normals()
        .map(|iter| iter.collect())
        .unwrap_or_else(|| vec![[0.0; 3]; positions.len()]);

    let indices: Vec<u32> = reader
        .read_indices()
        .map(|iter| iter.into_u32().collect())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());

    let mut vertices = Vec::with_capacity(positions.len() * 6);
    for (position, normal) in positions.iter().zip(normals.iter()) {
        vertices.extend_from_slice(position);
        vertices.extend_from_slice(normal);
    }

    Ok(Geometry::new(vertices, indices))
}

fn import_material(material: &gltf::Material<'_>) -> StandardMaterial {
    let pbr = material.pbr_metallic_roughness();
    StandardMaterial {
        base_color: Vec4::from(pbr.base_color_factor()),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        ..StandardMaterial::default()
    }
}

fn quat_to_euler(q: [f32; 4]) -> Vec3 {
    let quat = Quat::from_xyzw(q[0], q[1], q[2], q[3]);
    // Transform::matrix composes Rz * Ry * Rx, so decompose in ZYX order.
    let (z, y, x) = quat.to_euler(glam::EulerRot::ZYX);
    Vec3::new(x, y, z)
}

/// Events delivered by background loads, drained by the event loop
/// between frames.
#[derive(Debug)]
pub enum AssetEvent {
    ModelProgress { bytes: u64 },
    ModelLoaded(ModelData),
    ModelFailed(AssetError),
    CubemapLoaded(EnvironmentMap),
    CubemapFailed(AssetError),
}

/// Spawns asset loads on worker threads and funnels their outcomes back
/// to the event-loop thread over a channel. Loads are never cancelled;
/// abandoning the hub drops the channel and any late result with it.
pub struct AssetHub {
    sender: Sender<AssetEvent>,
    events: Receiver<AssetEvent>,
}

impl Default for AssetHub {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetHub {
    pub fn new() -> Self {
        let (sender, events) = channel();
        Self { sender, events }
    }

    /// Starts a model load; completion arrives as one
    /// [`AssetEvent::ModelLoaded`] or exactly one [`AssetEvent::ModelFailed`].
    pub fn spawn_model_load(&self, path: PathBuf) {
        let sender = self.sender.clone();
        thread::spawn(move || {
            let event = match fs::read(&path) {
                Ok(bytes) => {
                    let _ = sender.send(AssetEvent::ModelProgress {
                        bytes: bytes.len() as u64,
                    });
                    match decode_model(&bytes) {
                        Ok(model) => AssetEvent::ModelLoaded(model),
                        Err(err) => AssetEvent::ModelFailed(err),
                    }
                }
                Err(source) => AssetEvent::ModelFailed(AssetError::Io { path, source }),
            };
            let _ = sender.send(event);
        });
    }

    /// Starts a cubemap load; completion arrives as one event.
    pub fn spawn_cubemap_load(&self, paths: [PathBuf; 6]) {
        let sender = self.sender.clone();
        thread::spawn(move || {
            let event = match load_cubemap(&paths) {
                Ok(map) => AssetEvent::CubemapLoaded(map),
                Err(err) => AssetEvent::CubemapFailed(err),
            };
            let _ = sender.send(event);
        });
    }

    /// Collects every event that arrived since the last drain, without
    /// blocking.
    pub fn drain(&mut self) -> Vec<AssetEvent> {
        self.events.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

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
                "primitives": [{
                    "attributes": {"POSITION": 0},
                    "indices": 1,
                    "material": 0
                }]
            }],
            "materials": [{
                "name": "beef",
                "pbrMetallicRoughness": {
                    "baseColorFactor": [0.8, 0.4, 0.2, 1.0],
                    "metallicFactor": 0.1,
                    "roughnessFactor": 0.9
                }
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

    #[test]
    fn decodes_a_plain_glb() {
        let model = decode_model(&tiny_glb()).unwrap();
        assert_eq!(model.mesh_count, 1);
        let node = &model.roots[0];
        assert_eq!(node.meshes.len(), 1);
        let mesh = &node.meshes[0];
        assert_eq!(mesh.name, "patty");
        assert_eq!(mesh.geometry.vertex_count(), 3);
        assert!((mesh.material.base_color.x - 0.8).abs() < 1e-6);
        assert!((mesh.material.metallic - 0.1).abs() < 1e-6);
    }

    #[test]
    fn decodes_a_brotli_wrapped_glb() {
        let plain = tiny_glb();
        let mut compressed = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
            writer.write_all(&plain).unwrap();
        }
        assert!(!is_gltf_payload(&compressed));
        let model = decode_model(&compressed).unwrap();
        assert_eq!(model.mesh_count, 1);
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(decode_model(&[0xde, 0xad, 0xbe, 0xef, 0x00]).is_err());
    }

    #[test]
    fn grafts_model_under_a_single_group() {
        let model = decode_model(&tiny_glb()).unwrap();
        let mut scene = Scene::new();
        let transform = Transform {
            position: Vec3::new(0.0, -4.0, 0.0),
            rotation: Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0),
            scale: Vec3::splat(0.4),
        };
        let parent = scene.root();
        let root = apply_model(&mut scene, parent, &model, transform);
        assert_eq!(scene.node(root).name, MODEL_ROOT);
        assert_eq!(scene.node(root).transform, transform);
        assert_eq!(scene.mesh_count(), 1);
        assert!(scene.find("patty").is_some());
    }

    #[test]
    fn failed_load_reports_once_and_leaves_scene_untouched() {
        let scene = Scene::new();
        let nodes_before = scene.len();

        let hub = AssetHub::new();
        hub.spawn_model_load(PathBuf::from("/nonexistent/scene.glb"));
        let first = hub
            .events
            .recv_timeout(Duration::from_secs(5))
            .expect("failure event arrives");
        assert!(matches!(first, AssetEvent::ModelFailed(AssetError::Io { .. })));
        assert!(hub
            .events
            .recv_timeout(Duration::from_millis(200))
            .is_err());

        // nothing was grafted
        assert_eq!(scene.len(), nodes_before);
    }

    #[test]
    fn background_load_delivers_progress_then_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.glb");
        fs::write(&path, tiny_glb()).unwrap();

        let hub = AssetHub::new();
        hub.spawn_model_load(path);
        let first = hub.events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, AssetEvent::ModelProgress { bytes } if bytes > 0));
        let second = hub.events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(second, AssetEvent::ModelLoaded(_)));
    }

    #[test]
    fn loads_a_six_face_cubemap() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for face in CUBEMAP_FACES {
            let path = dir.path().join(format!("{face}.png"));
            image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]))
                .save(&path)
                .unwrap();
            paths.push(path);
        }
        let paths: [PathBuf; 6] = paths.try_into().unwrap();
        let map = load_cubemap(&paths).unwrap();
        assert_eq!(map.size, 2);
        assert!(map.faces.iter().all(|face| face.len() == 2 * 2 * 4));
    }

    #[test]
    fn rejects_mismatched_cubemap_faces() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (index, face) in CUBEMAP_FACES.iter().enumerate() {
            let size = if index == 3 { 4 } else { 2 };
            let path = dir.path().join(format!("{face}.png"));
            image::RgbaImage::from_pixel(size, size, image::Rgba([0, 0, 0, 255]))
                .save(&path)
                .unwrap();
            paths.push(path);
        }
        let paths: [PathBuf; 6] = paths.try_into().unwrap();
        let err = load_cubemap(&paths).unwrap_err();
        assert!(matches!(err, AssetError::FaceSizeMismatch { face: "ny", .. }));
    }

    #[test]
    fn prefers_compressed_model_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let models = dir.path().join("models");
        fs::create_dir_all(&models).unwrap();
        fs::write(models.join("scene.glb"), b"x").unwrap();
        assert!(model_path(dir.path()).ends_with("models/scene.glb"));
        fs::write(models.join("scene.glb.br"), b"x").unwrap();
        assert!(model_path(dir.path()).ends_with("models/scene.glb.br"));
    }
}
