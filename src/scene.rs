use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use crate::camera::PerspectiveCamera;

/// Identifier of a node stored in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Local translation/rotation/scale of a node. Rotation is Euler XYZ in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Composes the local matrix as translation * rotation(ZYX) * scale.
    pub fn matrix(&self) -> Mat4 {
        let translation = Mat4::from_translation(self.position);
        let rotation = Mat4::from_rotation_z(self.rotation.z)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_x(self.rotation.x);
        let scale = Mat4::from_scale(self.scale);
        translation * rotation * scale
    }
}

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(0);

/// Immutable GPU-ready vertex data shared between mesh nodes.
///
/// Vertices are laid out as `position.xyz` followed by `normal.xyz`,
/// six floats per vertex. Geometries carry a process-unique id so the
/// renderer can cache uploaded buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    id: u64,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl Geometry {
    /// Wraps interleaved vertex data, computing smooth normals when the
    /// source left them zeroed.
    pub fn new(vertices: Vec<f32>, indices: Vec<u32>) -> Self {
        let mut geometry = Self {
            id: NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed),
            vertices,
            indices,
        };
        if geometry.needs_normals() {
            geometry.compute_normals();
        }
        geometry
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 6
    }

    fn needs_normals(&self) -> bool {
        self.vertices
            .chunks_exact(6)
            .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
    }

    fn compute_normals(&mut self) {
        let vertex_count = self.vertices.len() / 6;
        let mut accum = vec![Vec3::ZERO; vertex_count];

        for triangle in self.indices.chunks_exact(3) {
            let i0 = triangle[0] as usize;
            let i1 = triangle[1] as usize;
            let i2 = triangle[2] as usize;
            let p0 = Vec3::from_slice(&self.vertices[i0 * 6..i0 * 6 + 3]);
            let p1 = Vec3::from_slice(&self.vertices[i1 * 6..i1 * 6 + 3]);
            let p2 = Vec3::from_slice(&self.vertices[i2 * 6..i2 * 6 + 3]);
            let normal = (p1 - p0).cross(p2 - p0);
            if normal.length_squared() > f32::EPSILON {
                let normal = normal.normalize();
                accum[i0] += normal;
                accum[i1] += normal;
                accum[i2] += normal;
            }
        }

        for (i, normal) in accum.into_iter().enumerate() {
            let normal = normal.normalize_or_zero();
            self.vertices[i * 6 + 3] = normal.x;
            self.vertices[i * 6 + 4] = normal.y;
            self.vertices[i * 6 + 5] = normal.z;
        }
    }
}

/// Physically-based surface parameters attached to a mesh node.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardMaterial {
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    /// Scale applied to the environment-map contribution.
    pub env_map_intensity: f32,
    /// Set whenever a lighting-relevant field changes; the renderer
    /// re-uploads the material and clears the flag before drawing.
    pub needs_upload: bool,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 1.0,
            env_map_intensity: 1.0,
            needs_upload: true,
        }
    }
}

/// Mesh payload of a node: shared geometry, material and shadow flags.
#[derive(Debug, Clone)]
pub struct MeshNode {
    pub geometry: Arc<Geometry>,
    pub material: StandardMaterial,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

/// Shadow-map parameters carried by the directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    pub map_size: u32,
    pub far: f32,
    pub normal_bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            map_size: 1024,
            far: 15.0,
            normal_bias: 0.05,
        }
    }
}

/// The single directional light of the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub shadow: ShadowSettings,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            shadow: ShadowSettings::default(),
        }
    }
}

/// Closed set of node payloads.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(MeshNode),
    Light(DirectionalLight),
    Camera(PerspectiveCamera),
}

/// A spatial node in the scene tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::Group)
    }

    pub fn mesh(
        name: impl Into<String>,
        geometry: Arc<Geometry>,
        material: StandardMaterial,
    ) -> Self {
        Self::with_kind(
            name,
            NodeKind::Mesh(MeshNode {
                geometry,
                material,
                cast_shadow: false,
                receive_shadow: false,
            }),
        )
    }

    pub fn light(name: impl Into<String>, light: DirectionalLight) -> Self {
        Self::with_kind(name, NodeKind::Light(light))
    }

    pub fn camera(name: impl Into<String>, camera: PerspectiveCamera) -> Self {
        Self::with_kind(name, NodeKind::Camera(camera))
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            kind,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Six RGBA8 faces of the environment cubemap, ordered +X -X +Y -Y +Z -Z.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    pub size: u32,
    pub faces: [Vec<u8>; 6],
}

/// Arena-backed tree of spatial nodes plus the environment texture.
///
/// The tree is only ever grown; nodes live for the remainder of the
/// process once added.
#[derive(Debug)]
pub struct Scene {
    nodes: Vec<Node>,
    root: NodeId,
    environment: Option<Arc<EnvironmentMap>>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let root = Node::group("root");
        Self {
            nodes: vec![root],
            root: NodeId(0),
            environment: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Inserts a node under the given parent and returns its id.
    pub fn add_node(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finds the first node with the given name, in pre-order.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .find(|id| self.nodes[id.0].name == name)
    }

    /// First directional light in the tree, if any.
    pub fn directional_light(&self) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .find(|id| matches!(self.nodes[id.0].kind, NodeKind::Light(_)))
    }

    /// First camera in the tree, if any.
    pub fn camera(&self) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .find(|id| matches!(self.nodes[id.0].kind, NodeKind::Camera(_)))
    }

    pub fn mesh_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Mesh(_)))
            .count()
    }

    /// Visits every node in pre-order.
    pub fn traverse<F: FnMut(NodeId, &Node)>(&self, mut visit: F) {
        for id in self.preorder() {
            visit(id, &self.nodes[id.0]);
        }
    }

    /// Visits every node mutably in pre-order.
    pub fn traverse_mut<F: FnMut(&mut Node)>(&mut self, mut visit: F) {
        for id in self.preorder() {
            visit(&mut self.nodes[id.0]);
        }
    }

    /// World matrix of a node: the product of its ancestor chain.
    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            chain.push(node_id);
            current = self.nodes[node_id.0].parent;
        }
        chain
            .into_iter()
            .rev()
            .fold(Mat4::IDENTITY, |acc, node_id| {
                acc * self.nodes[node_id.0].transform.matrix()
            })
    }

    pub fn environment(&self) -> Option<&Arc<EnvironmentMap>> {
        self.environment.as_ref()
    }

    /// Installs the cubemap used for both background and ambient lighting.
    pub fn set_environment(&mut self, map: Arc<EnvironmentMap>) {
        self.environment = Some(map);
    }

    fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            for child in self.nodes[id.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        order
    }
}
