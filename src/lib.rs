//! Building blocks of the single-scene PBR viewer.
//!
//! The crate exposes the scene graph, asset loaders, camera controls,
//! debug panel and renderer as reusable modules; the window/event-loop
//! program lives in the binary so everything here stays testable
//! headless.

pub mod app;
pub mod assets;
pub mod camera;
pub mod material;
pub mod panel;
pub mod render;
pub mod scene;
pub mod settings;

pub use app::{camera_params, light_params, scene_summary, Viewport};
pub use assets::{AssetEvent, AssetHub, ModelData, MODEL_ROOT};
pub use camera::{OrbitControls, PerspectiveCamera};
pub use material::update_all_materials;
pub use panel::{PanelFrame, PanelHost};
pub use render::{CameraParams, LightParams, Renderer};
pub use scene::{DirectionalLight, EnvironmentMap, Node, NodeId, NodeKind, Scene, Transform};
pub use settings::{SettingChange, Settings, ToneMapping};
