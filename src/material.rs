use crate::scene::{NodeKind, Scene};
use crate::settings::Settings;

/// Walks the whole scene and normalizes lighting state on every mesh:
/// the material's environment intensity is synced to the settings, the
/// material is flagged for GPU re-upload, and both shadow flags are
/// enabled.
///
/// Idempotent; must run once after model load and again whenever the
/// environment intensity or tone-mapping mode changes.
pub fn update_all_materials(scene: &mut Scene, settings: &Settings) {
    let intensity = settings.env_map_intensity();
    scene.traverse_mut(|node| {
        if let NodeKind::Mesh(mesh) = &mut node.kind {
            mesh.material.env_map_intensity = intensity;
            mesh.material.needs_upload = true;
            mesh.cast_shadow = true;
            mesh.receive_shadow = true;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Geometry, Node, NodeKind, Scene, StandardMaterial};
    use std::sync::Arc;

    fn scene_with_meshes(count: usize) -> Scene {
        let mut scene = Scene::new();
        let group = scene.add_node(scene.root(), Node::group("model"));
        let geometry = Arc::new(Geometry::new(
            vec![
                0.0, 0.0, 0.0, 0.0, 0.0, 1.0, //
                1.0, 0.0, 0.0, 0.0, 0.0, 1.0, //
                0.0, 1.0, 0.0, 0.0, 0.0, 1.0,
            ],
            vec![0, 1, 2],
        ));
        for i in 0..count {
            let mut material = StandardMaterial::default();
            material.needs_upload = false;
            scene.add_node(
                group,
                Node::mesh(format!("mesh-{i}"), Arc::clone(&geometry), material),
            );
        }
        scene
    }

    fn each_mesh<F: FnMut(&crate::scene::MeshNode)>(scene: &Scene, mut f: F) {
        scene.traverse(|_, node| {
            if let NodeKind::Mesh(mesh) = &node.kind {
                f(mesh);
            }
        });
    }

    #[test]
    fn enables_shadows_and_syncs_intensity_on_every_mesh() {
        let mut scene = scene_with_meshes(3);
        let settings = Settings::default();
        update_all_materials(&mut scene, &settings);
        let mut seen = 0;
        each_mesh(&scene, |mesh| {
            seen += 1;
            assert!(mesh.cast_shadow);
            assert!(mesh.receive_shadow);
            assert_eq!(
                mesh.material.env_map_intensity,
                settings.env_map_intensity()
            );
            assert!(mesh.material.needs_upload);
        });
        assert_eq!(seen, 3);
    }

    #[test]
    fn repeated_runs_with_unchanged_settings_are_idempotent() {
        let mut scene = scene_with_meshes(2);
        let settings = Settings::default();
        update_all_materials(&mut scene, &settings);
        let mut first = Vec::new();
        each_mesh(&scene, |mesh| first.push(mesh.material.clone()));
        update_all_materials(&mut scene, &settings);
        let mut second = Vec::new();
        each_mesh(&scene, |mesh| second.push(mesh.material.clone()));
        assert_eq!(first, second);
    }

    #[test]
    fn picks_up_new_intensity_values() {
        let mut scene = scene_with_meshes(1);
        let mut settings = Settings::default();
        settings.set_env_map_intensity(7.25);
        update_all_materials(&mut scene, &settings);
        each_mesh(&scene, |mesh| {
            assert_eq!(mesh.material.env_map_intensity, 7.25);
        });
    }

    #[test]
    fn ignores_non_mesh_nodes() {
        let mut scene = Scene::new();
        scene.add_node(
            scene.root(),
            Node::light("key-light", crate::scene::DirectionalLight::default()),
        );
        // must not panic or mutate anything
        update_all_materials(&mut scene, &Settings::default());
        assert_eq!(scene.mesh_count(), 0);
    }
}
