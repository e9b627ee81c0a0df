//! GPU renderer: shadow pass, lit scene pass, cubemap sky pass and the
//! debug-panel overlay, all driven from a single command encoder per
//! frame.

mod mesh;
mod renderer;
mod shadow;

pub use renderer::Renderer;
pub use shadow::light_view_proj;

use glam::{Mat4, Vec3};

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Debug, Clone, Copy)]
pub struct CameraParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

/// Directional-light state consumed by the shadow and scene passes.
#[derive(Debug, Clone, Copy)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub shadow_far: f32,
    pub normal_bias: f32,
}
