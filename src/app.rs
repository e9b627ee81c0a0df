use std::fmt::Write as _;

use glam::Vec3;
use parking_lot::RwLock;

use crate::camera::{OrbitControls, PerspectiveCamera};
use crate::render::{CameraParams, LightParams};
use crate::scene::{NodeKind, Scene};
use crate::settings::Settings;

/// Pixel-ratio cap applied on high-density displays to bound GPU cost.
pub const MAX_PIXEL_RATIO: f64 = 2.0;

/// Shared viewport state: physical size plus scale factor, updated from
/// resize events and read when sizing the render target.
#[derive(Debug)]
pub struct Viewport {
    state: RwLock<ViewportState>,
}

#[derive(Debug, Clone, Copy)]
struct ViewportState {
    width: u32,
    height: u32,
    scale_factor: f64,
}

impl Viewport {
    pub fn new(width: u32, height: u32, scale_factor: f64) -> Self {
        Self {
            state: RwLock::new(ViewportState {
                width: width.max(1),
                height: height.max(1),
                scale_factor: scale_factor.max(0.1),
            }),
        }
    }

    pub fn update_size(&self, width: u32, height: u32) {
        let mut state = self.state.write();
        state.width = width.max(1);
        state.height = height.max(1);
    }

    pub fn update_scale_factor(&self, scale_factor: f64) {
        self.state.write().scale_factor = scale_factor.max(0.1);
    }

    pub fn size(&self) -> (u32, u32) {
        let state = self.state.read();
        (state.width, state.height)
    }

    pub fn aspect(&self) -> f32 {
        let state = self.state.read();
        state.width as f32 / state.height as f32
    }

    /// Device pixel ratio capped at [`MAX_PIXEL_RATIO`].
    pub fn pixel_ratio(&self) -> f64 {
        self.state.read().scale_factor.min(MAX_PIXEL_RATIO)
    }

    /// Output size of the render target: the physical size scaled down
    /// when the display's pixel ratio exceeds the cap.
    pub fn render_size(&self) -> (u32, u32) {
        let state = self.state.read();
        let ratio = state.scale_factor.min(MAX_PIXEL_RATIO) / state.scale_factor;
        (
            ((state.width as f64 * ratio) as u32).max(1),
            ((state.height as f64 * ratio) as u32).max(1),
        )
    }
}

/// Derives the per-frame camera uniforms from the scene's camera node
/// and the orbit controls' current pose.
pub fn camera_params(scene: &Scene, controls: &OrbitControls, aspect: f32) -> CameraParams {
    let projection = scene
        .camera()
        .and_then(|id| match &scene.node(id).kind {
            NodeKind::Camera(camera) => Some(*camera),
            _ => None,
        })
        .unwrap_or_else(|| PerspectiveCamera::new(aspect));
    CameraParams {
        view: controls.view_matrix(),
        projection: projection.projection(),
        position: controls.eye(),
    }
}

/// Derives the per-frame light uniforms from the scene's directional
/// light, falling back to a neutral key light.
pub fn light_params(scene: &Scene) -> LightParams {
    scene
        .directional_light()
        .and_then(|id| {
            let node = scene.node(id);
            match &node.kind {
                NodeKind::Light(light) => Some(LightParams {
                    position: node.transform.position,
                    color: light.color,
                    intensity: light.intensity,
                    shadow_far: light.shadow.far,
                    normal_bias: light.shadow.normal_bias,
                }),
                _ => None,
            }
        })
        .unwrap_or(LightParams {
            position: Vec3::new(3.0, 5.0, -3.0),
            color: Vec3::ONE,
            intensity: 1.0,
            shadow_far: 15.0,
            normal_bias: 0.05,
        })
}

/// Human-readable scene state, printed by headless runs and on shutdown.
pub fn scene_summary(scene: &Scene, settings: &Settings) -> String {
    let mut lights = 0;
    let mut meshes = 0;
    scene.traverse(|_, node| match node.kind {
        NodeKind::Light(_) => lights += 1,
        NodeKind::Mesh(_) => meshes += 1,
        _ => {}
    });

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Scene: {} nodes ({} meshes, {} lights), environment {}",
        scene.len(),
        meshes,
        lights,
        if scene.environment().is_some() {
            "loaded"
        } else {
            "missing"
        }
    );
    let _ = writeln!(
        out,
        "Settings: toneMapping={} exposure={:.2} envMapIntensity={:.2}",
        settings.tone_mapping().label(),
        settings.tone_mapping_exposure(),
        settings.env_map_intensity()
    );
    scene.traverse(|_, node| {
        if let NodeKind::Mesh(mesh) = &node.kind {
            let _ = writeln!(
                out,
                " - {} env={:.2} castShadow={} receiveShadow={}",
                node.name,
                mesh.material.env_map_intensity,
                mesh.cast_shadow,
                mesh.receive_shadow
            );
        }
    });
    out
}
