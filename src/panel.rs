use std::f32::consts::PI;

use winit::event::WindowEvent;
use winit::window::Window;

use crate::assets::MODEL_ROOT;
use crate::scene::{NodeKind, Scene};
use crate::settings::{Settings, ToneMapping};

/// Tessellated panel output handed to the renderer for compositing.
pub struct PanelFrame {
    pub primitives: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
    pub size_px: [u32; 2],
}

/// Owns the egui context and its winit state; produces one
/// [`PanelFrame`] per redraw.
pub struct PanelHost {
    context: egui::Context,
    winit_state: egui_winit::State,
}

impl PanelHost {
    pub fn new(window: &Window) -> Self {
        let context = egui::Context::default();
        let winit_state = egui_winit::State::new(
            context.clone(),
            egui::ViewportId::ROOT,
            window,
            None,
            None,
        );
        Self {
            context,
            winit_state,
        }
    }

    /// Feeds a window event to the panel; returns true when the panel
    /// consumed it and it must not reach the orbit controls.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    /// Whether the pointer currently hovers panel widgets.
    pub fn wants_pointer(&self) -> bool {
        self.context.wants_pointer_input()
    }

    /// Runs the panel UI against the live scene and settings. Control
    /// edits land synchronously, before the frame that follows renders.
    pub fn run(&mut self, window: &Window, scene: &mut Scene, settings: &mut Settings) -> PanelFrame {
        let raw_input = self.winit_state.take_egui_input(window);
        let full_output = self
            .context
            .run(raw_input, |ctx| draw_controls(ctx, scene, settings));
        self.winit_state
            .handle_platform_output(window, full_output.platform_output.clone());
        let pixels_per_point = self.context.pixels_per_point();
        let primitives = self
            .context
            .tessellate(full_output.shapes, pixels_per_point);
        let size = window.inner_size();
        PanelFrame {
            primitives,
            textures_delta: full_output.textures_delta,
            pixels_per_point,
            size_px: [size.width.max(1), size.height.max(1)],
        }
    }
}

fn draw_controls(ctx: &egui::Context, scene: &mut Scene, settings: &mut Settings) {
    egui::Window::new("Tuning")
        .default_width(260.0)
        .show(ctx, |ui| {
            // Only present once the async model load has grafted the group.
            if let Some(model) = scene.find(MODEL_ROOT) {
                let node = scene.node_mut(model);
                ui.add(
                    egui::Slider::new(&mut node.transform.rotation.y, -PI..=PI)
                        .step_by(0.001)
                        .text("Rotation"),
                );
            }

            if let Some(light_id) = scene.directional_light() {
                let node = scene.node_mut(light_id);
                if let NodeKind::Light(light) = &mut node.kind {
                    ui.add(
                        egui::Slider::new(&mut light.intensity, 0.0..=10.0)
                            .step_by(0.001)
                            .text("Light intensity"),
                    );
                }
                ui.add(
                    egui::Slider::new(&mut node.transform.position.x, -5.0..=5.0)
                        .step_by(0.001)
                        .text("Light x"),
                );
                ui.add(
                    egui::Slider::new(&mut node.transform.position.y, -5.0..=5.0)
                        .step_by(0.001)
                        .text("Light y"),
                );
                ui.add(
                    egui::Slider::new(&mut node.transform.position.z, -5.0..=5.0)
                        .step_by(0.001)
                        .text("Light z"),
                );
            }

            let mut env = settings.env_map_intensity();
            if ui
                .add(
                    egui::Slider::new(&mut env, 0.0..=10.0)
                        .step_by(0.001)
                        .text("envMapIntensity"),
                )
                .changed()
            {
                settings.set_env_map_intensity(env);
            }

            let mut tone = settings.tone_mapping();
            egui::ComboBox::from_label("toneMapping")
                .selected_text(tone.label())
                .show_ui(ui, |ui| {
                    for mode in ToneMapping::ALL {
                        ui.selectable_value(&mut tone, mode, mode.label());
                    }
                });
            if tone != settings.tone_mapping() {
                settings.set_tone_mapping(tone);
            }

            let mut exposure = settings.tone_mapping_exposure();
            if ui
                .add(
                    egui::Slider::new(&mut exposure, 0.0..=10.0)
                        .step_by(0.001)
                        .text("toneMappingExposure"),
                )
                .changed()
            {
                settings.set_tone_mapping_exposure(exposure);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::update_all_materials;
    use crate::scene::{DirectionalLight, Geometry, Node, StandardMaterial};
    use crate::settings::SettingChange;
    use std::sync::Arc;

    fn demo_scene() -> Scene {
        let mut scene = Scene::new();
        scene.add_node(
            scene.root(),
            Node::light("key-light", DirectionalLight::default()),
        );
        let model = scene.add_node(scene.root(), Node::group(MODEL_ROOT));
        let geometry = Arc::new(Geometry::new(
            vec![
                0.0, 0.0, 0.0, 0.0, 0.0, 1.0, //
                1.0, 0.0, 0.0, 0.0, 0.0, 1.0, //
                0.0, 1.0, 0.0, 0.0, 0.0, 1.0,
            ],
            vec![0, 1, 2],
        ));
        scene.add_node(
            model,
            Node::mesh("patty", geometry, StandardMaterial::default()),
        );
        scene
    }

    #[test]
    fn panel_renders_against_a_live_scene() {
        let ctx = egui::Context::default();
        let mut scene = demo_scene();
        let mut settings = Settings::default();
        let output = ctx.run(egui::RawInput::default(), |ctx| {
            draw_controls(ctx, &mut scene, &mut settings)
        });
        assert!(!output.shapes.is_empty());
        // rendering alone must not record spurious changes
        assert!(settings.drain_changes().is_empty());
    }

    #[test]
    fn tone_selection_updates_mode_and_refreshes_materials() {
        let mut scene = demo_scene();
        let mut settings = Settings::default();
        update_all_materials(&mut scene, &settings);
        scene.traverse_mut(|node| {
            if let NodeKind::Mesh(mesh) = &mut node.kind {
                mesh.material.needs_upload = false;
            }
        });

        settings.set_tone_mapping(ToneMapping::Cineon);
        let changes = settings.drain_changes();
        assert_eq!(changes, vec![SettingChange::ToneMapping(ToneMapping::Cineon)]);

        for change in &changes {
            if change.requires_material_update() {
                update_all_materials(&mut scene, &settings);
            }
        }

        assert_eq!(settings.tone_mapping(), ToneMapping::Cineon);
        scene.traverse(|_, node| {
            if let NodeKind::Mesh(mesh) = &node.kind {
                assert!(mesh.material.needs_upload);
            }
        });
    }

    #[test]
    fn exposure_changes_do_not_force_a_material_pass() {
        let mut settings = Settings::default();
        settings.set_tone_mapping_exposure(3.0);
        let changes = settings.drain_changes();
        assert!(changes.iter().all(|c| !c.requires_material_update()));
    }
}
