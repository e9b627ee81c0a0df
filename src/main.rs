use std::env;
use std::f32::consts::FRAC_PI_2;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use log::{error, info};
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::window::WindowBuilder;

use pbr_viewer::{
    assets, camera_params, light_params, scene_summary, update_all_materials, AssetEvent,
    AssetHub, DirectionalLight, Node, NodeKind, OrbitControls, PanelHost, PerspectiveCamera,
    Renderer, Scene, Settings, Transform, Viewport,
};

/// Placement of the loaded model in the scene.
const MODEL_TRANSFORM: Transform = Transform {
    position: Vec3::new(0.0, -4.0, 0.0),
    rotation: Vec3::new(0.0, FRAC_PI_2, 0.0),
    scale: Vec3::splat(0.4),
};

const INITIAL_EYE: Vec3 = Vec3::new(4.0, 1.0, -4.0);

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let settings = match &options.settings_path {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };

    if options.headless {
        return run_headless(&options, settings);
    }

    match run_interactive(&options, settings.clone()) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --headless mode (set DISPLAY or install GPU drivers to enable rendering)."
                );
                run_headless(&options, settings)
            } else {
                Err(err)
            }
        }
    }
}

fn build_scene(aspect: f32) -> Scene {
    let mut scene = Scene::new();
    let light = scene.add_node(
        scene.root(),
        Node::light(
            "key-light",
            DirectionalLight {
                intensity: 3.0,
                ..DirectionalLight::default()
            },
        ),
    );
    scene.node_mut(light).transform.position = Vec3::new(-2.0, 5.0, 4.0);
    let camera = scene.add_node(
        scene.root(),
        Node::camera("camera", PerspectiveCamera::new(aspect)),
    );
    scene.node_mut(camera).transform.position = INITIAL_EYE;
    scene
}

fn run_headless(options: &CliOptions, settings: Settings) -> Result<()> {
    let mut scene = build_scene(16.0 / 9.0);

    match assets::load_cubemap(&assets::cubemap_paths(&options.asset_dir)) {
        Ok(map) => scene.set_environment(Arc::new(map)),
        Err(err) => {
            error!("environment load failed: {err}");
            println!("environment failed to load: {err}");
        }
    }

    match assets::load_model(&assets::model_path(&options.asset_dir)) {
        Ok(model) => {
            println!("Loaded model with {} meshes", model.mesh_count);
            let root = scene.root();
            assets::apply_model(&mut scene, root, &model, MODEL_TRANSFORM);
            update_all_materials(&mut scene, &settings);
        }
        Err(err) => {
            error!("model load failed: {err}");
            println!("model failed to load: {err}");
        }
    }

    print!("{}", scene_summary(&scene, &settings));
    Ok(())
}

fn run_interactive(options: &CliOptions, settings: Settings) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| WindowInitError::from_error("event loop", err))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("PBR Viewer")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let size = window.inner_size();
    let viewport = Viewport::new(size.width, size.height, window.scale_factor());
    let (render_width, render_height) = viewport.render_size();
    let renderer = block_on(Renderer::new(
        Arc::clone(&window),
        render_width,
        render_height,
    ))
    .map_err(|err| WindowInitError::from_error("GPU renderer", err))?;

    let assets_hub = AssetHub::new();
    assets_hub.spawn_cubemap_load(assets::cubemap_paths(&options.asset_dir));
    assets_hub.spawn_model_load(assets::model_path(&options.asset_dir));

    let panel = PanelHost::new(&window);
    let scene = build_scene(viewport.aspect());

    let mut app = AppState {
        window,
        renderer,
        scene,
        settings,
        controls: OrbitControls::new(INITIAL_EYE, Vec3::ZERO),
        panel,
        viewport,
        assets: assets_hub,
        cursor: None,
        last_frame: Instant::now(),
        last_error: None,
    };

    event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        if let Err(err) = app.process_event(&event, elwt) {
            app.last_error = Some(err);
            elwt.exit();
        }
    })?;

    app.shutdown();

    if let Some(err) = app.last_error {
        return Err(err);
    }

    Ok(())
}

struct AppState {
    window: Arc<winit::window::Window>,
    renderer: Renderer,
    scene: Scene,
    settings: Settings,
    controls: OrbitControls,
    panel: PanelHost,
    viewport: Viewport,
    assets: AssetHub,
    cursor: Option<(f32, f32)>,
    last_frame: Instant,
    last_error: Option<anyhow::Error>,
}

impl AppState {
    fn process_event(
        &mut self,
        event: &Event<()>,
        elwt: &EventLoopWindowTarget<()>,
    ) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                let consumed = self.panel.on_window_event(&self.window, event);
                match event {
                    WindowEvent::CloseRequested => {
                        elwt.exit();
                    }
                    WindowEvent::Resized(size) => {
                        self.handle_resize(size.width, size.height);
                    }
                    WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                        self.viewport.update_scale_factor(*scale_factor);
                        let (width, height) = self.viewport.render_size();
                        self.renderer.resize(width, height);
                    }
                    WindowEvent::MouseInput {
                        state,
                        button: WinitMouseButton::Left,
                        ..
                    } => match state {
                        ElementState::Pressed if !consumed && !self.panel.wants_pointer() => {
                            self.controls.set_dragging(true);
                        }
                        ElementState::Released => {
                            self.controls.set_dragging(false);
                        }
                        _ => {}
                    },
                    WindowEvent::CursorMoved { position, .. } => {
                        let current = (position.x as f32, position.y as f32);
                        if let Some((last_x, last_y)) = self.cursor {
                            if !consumed {
                                self.controls
                                    .pointer_delta(current.0 - last_x, current.1 - last_y);
                            }
                        }
                        self.cursor = Some(current);
                    }
                    WindowEvent::MouseWheel { delta, .. } if !consumed => {
                        let step = match delta {
                            MouseScrollDelta::LineDelta(_, y) => *y,
                            MouseScrollDelta::PixelDelta(position) => (position.y / 120.0) as f32,
                        };
                        self.controls.scroll(step);
                    }
                    WindowEvent::RedrawRequested => {
                        self.redraw()?;
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                // One redraw request per tick; the redraw handler draws
                // exactly once, so no callback backlog can build up.
                self.renderer.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) {
        self.viewport.update_size(width, height);
        let aspect = self.viewport.aspect();
        if let Some(id) = self.scene.camera() {
            if let NodeKind::Camera(camera) = &mut self.scene.node_mut(id).kind {
                camera.set_aspect(aspect);
            }
        }
        let (render_width, render_height) = self.viewport.render_size();
        self.renderer.resize(render_width, render_height);
    }

    fn drain_asset_events(&mut self) {
        for event in self.assets.drain() {
            match event {
                AssetEvent::ModelProgress { bytes } => {
                    info!("model progress: {bytes} bytes read");
                }
                AssetEvent::ModelLoaded(model) => {
                    info!("model loaded with {} meshes", model.mesh_count);
                    let root = self.scene.root();
                    assets::apply_model(&mut self.scene, root, &model, MODEL_TRANSFORM);
                    update_all_materials(&mut self.scene, &self.settings);
                }
                AssetEvent::ModelFailed(err) => {
                    error!("model load failed: {err}");
                }
                AssetEvent::CubemapLoaded(map) => {
                    let map = Arc::new(map);
                    self.scene.set_environment(Arc::clone(&map));
                    self.renderer.set_environment(&map);
                }
                AssetEvent::CubemapFailed(err) => {
                    error!("environment load failed: {err}");
                }
            }
        }
    }

    fn redraw(&mut self) -> Result<()> {
        self.drain_asset_events();

        let frame = self
            .panel
            .run(&self.window, &mut self.scene, &mut self.settings);

        // Panel edits react before the draw below; no debouncing.
        for change in self.settings.drain_changes() {
            if change.requires_material_update() {
                update_all_materials(&mut self.scene, &self.settings);
            }
        }

        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32().min(0.1);
        self.last_frame = now;
        self.controls.update(dt);

        let camera = camera_params(&self.scene, &self.controls, self.viewport.aspect());
        let light = light_params(&self.scene);
        self.renderer.update_globals(&camera, &light, &self.settings);

        if let Err(err) = self.renderer.render(&mut self.scene, Some(frame)) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let (width, height) = self.viewport.render_size();
                    self.renderer.resize(width, height);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    info!("surface timeout; retrying next frame");
                }
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        print!("{}", scene_summary(&self.scene, &self.settings));
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

struct CliOptions {
    asset_dir: PathBuf,
    headless: bool,
    settings_path: Option<PathBuf>,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(asset_dir) = args.next() else {
            return Err(anyhow!(
                "Usage: pbr-viewer <asset-dir> [--headless] [--settings <file>]"
            ));
        };
        let mut headless = false;
        let mut settings_path = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => headless = true,
                "--settings" => {
                    let path = args
                        .next()
                        .context("--settings requires a file path argument")?;
                    settings_path = Some(PathBuf::from(path));
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --headless or --settings <file>"
                    ));
                }
            }
        }
        Ok(Self {
            asset_dir: PathBuf::from(asset_dir),
            headless,
            settings_path,
        })
    }
}
