use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4, Vec4};
use winit::window::{Window, WindowId};

use super::mesh::{MeshBuffers, ObjectGpu};
use super::shadow::{light_view_proj, ShadowMap};
use super::{CameraParams, LightParams};
use crate::panel::PanelFrame;
use crate::scene::{EnvironmentMap, NodeId, NodeKind, Scene, StandardMaterial};
use crate::settings::Settings;

/// GPU renderer backed by wgpu that draws the scene graph each frame.
///
/// Per frame it runs a shadow pass, the lit scene pass, a cubemap sky
/// pass and finally the debug-panel overlay.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: DepthBuffer,
    shadow: ShadowMap,
    scene_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    sky_pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_layout: wgpu::BindGroupLayout,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    mesh_cache: HashMap<u64, MeshBuffers>,
    object_cache: HashMap<NodeId, ObjectGpu>,
    env_sampler: wgpu::Sampler,
    env_view: wgpu::TextureView,
    env_loaded: bool,
    egui_renderer: egui_wgpu::Renderer,
}

impl Renderer {
    /// Initializes the GPU renderer for the provided window at the given
    /// output size (already pixel-ratio capped by the caller).
    pub async fn new(window: Arc<Window>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create rendering surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("viewer-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            // Fifo pins presentation to the display's vertical sync, one
            // frame per tick.
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);
        let shadow = ShadowMap::create(&device, 1024);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("viewer-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            std::num::NonZeroU64::new(std::mem::size_of::<GlobalUniform>() as u64)
                                .unwrap(),
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            std::num::NonZeroU64::new(std::mem::size_of::<ObjectUniform>() as u64)
                                .unwrap(),
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            std::num::NonZeroU64::new(
                                std::mem::size_of::<MaterialUniform>() as u64
                            )
                            .unwrap(),
                        ),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("viewer-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: (6 * std::mem::size_of::<f32>()) as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x3,
                    offset: 0,
                    shader_location: 0,
                },
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x3,
                    offset: (3 * std::mem::size_of::<f32>()) as u64,
                    shader_location: 1,
                },
            ],
        };

        let scene_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("scene-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[vertex_layout.clone()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_shadow",
                buffers: &[vertex_layout],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: ShadowMap::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: None,
            multiview: None,
        });

        let sky_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sky-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_sky",
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_sky",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let env_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("environment-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // 1px black placeholder until the real cubemap arrives.
        let env_view = create_cubemap(&device, &queue, None);

        let global_bind_group = create_global_bind_group(
            &device,
            &global_layout,
            &global_buffer,
            &shadow,
            &env_view,
            &env_sampler,
        );

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth,
            shadow,
            scene_pipeline,
            shadow_pipeline,
            sky_pipeline,
            global_buffer,
            global_layout,
            global_bind_group,
            object_layout,
            mesh_cache: HashMap::new(),
            object_cache: HashMap::new(),
            env_sampler,
            env_view,
            env_loaded: false,
            egui_renderer,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Resizes the swap chain and depth buffer to the new output size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, width, height);
    }

    /// Uploads the environment cubemap sampled for ambient lighting and
    /// the sky background.
    pub fn set_environment(&mut self, map: &EnvironmentMap) {
        self.env_view = create_cubemap(&self.device, &self.queue, Some(map));
        self.env_loaded = true;
        self.global_bind_group = create_global_bind_group(
            &self.device,
            &self.global_layout,
            &self.global_buffer,
            &self.shadow,
            &self.env_view,
            &self.env_sampler,
        );
    }

    /// Updates the camera, lighting and tone-mapping uniforms for the
    /// upcoming frame.
    pub fn update_globals(
        &self,
        camera: &CameraParams,
        light: &LightParams,
        settings: &Settings,
    ) {
        let mut view_rotation = camera.view;
        view_rotation.w_axis = Vec4::W;
        let uniform = GlobalUniform {
            view_proj: (camera.projection * camera.view).to_cols_array_2d(),
            light_view_proj: light_view_proj(light).to_cols_array_2d(),
            sky_view_proj_inv: (camera.projection * view_rotation)
                .inverse()
                .to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            light_direction: (-light.position)
                .normalize_or_zero()
                .extend(light.normal_bias)
                .into(),
            light_color: light.color.extend(light.intensity).into(),
            params: [
                settings.tone_mapping().shader_index() as f32,
                settings.tone_mapping_exposure(),
                if self.env_loaded { 1.0 } else { 0.0 },
                0.0,
            ],
        };
        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&uniform));
    }

    /// Draws one frame: shadow pass, scene pass, sky pass and the panel
    /// overlay. Materials flagged for re-upload are written to the GPU
    /// and their flags cleared.
    pub fn render(
        &mut self,
        scene: &mut Scene,
        panel: Option<PanelFrame>,
    ) -> Result<(), wgpu::SurfaceError> {
        let items = self.collect_draw_items(scene);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        if let Some(frame) = &panel {
            for (id, delta) in &frame.textures_delta.set {
                self.egui_renderer
                    .update_texture(&self.device, &self.queue, *id, delta);
            }
            for id in &frame.textures_delta.free {
                self.egui_renderer.free_texture(id);
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        let screen = panel.as_ref().map(|frame| egui_wgpu::ScreenDescriptor {
            size_in_pixels: frame.size_px,
            pixels_per_point: frame.pixels_per_point,
        });
        let user_commands = match (&panel, &screen) {
            (Some(frame), Some(screen)) => self.egui_renderer.update_buffers(
                &self.device,
                &self.queue,
                &mut encoder,
                &frame.primitives,
                screen,
            ),
            _ => Vec::new(),
        };

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow-pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.shadow_pipeline);
            pass.set_bind_group(0, &self.global_bind_group, &[]);
            for item in items.iter().filter(|item| item.cast_shadow) {
                let mesh = &self.mesh_cache[&item.geometry_id];
                let object = &self.object_cache[&item.node];
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.set_bind_group(1, &object.bind_group, &[]);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.03,
                            g: 0.03,
                            b: 0.05,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.scene_pipeline);
            pass.set_bind_group(0, &self.global_bind_group, &[]);
            for item in &items {
                let mesh = &self.mesh_cache[&item.geometry_id];
                let object = &self.object_cache[&item.node];
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.set_bind_group(1, &object.bind_group, &[]);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }

            // Background last, only where no mesh wrote depth.
            pass.set_pipeline(&self.sky_pipeline);
            pass.set_bind_group(0, &self.global_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        if let (Some(frame), Some(screen)) = (&panel, &screen) {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("panel-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.egui_renderer
                .render(&mut pass, &frame.primitives, screen);
        }

        self.queue
            .submit(user_commands.into_iter().chain(std::iter::once(encoder.finish())));
        output.present();
        Ok(())
    }

    /// Walks the scene, refreshes GPU caches and returns the frame's draw
    /// list. Clears `needs_upload` on every material it re-uploads.
    fn collect_draw_items(&mut self, scene: &mut Scene) -> Vec<DrawItem> {
        let mut mesh_ids = Vec::new();
        scene.traverse(|id, node| {
            if matches!(node.kind, NodeKind::Mesh(_)) {
                mesh_ids.push(id);
            }
        });

        let mut items = Vec::new();
        for id in mesh_ids {
            let world = scene.world_transform(id);
            if let NodeKind::Mesh(mesh) = &scene.node(id).kind {
                items.push(DrawItem {
                    node: id,
                    world,
                    geometry: Arc::clone(&mesh.geometry),
                    geometry_id: mesh.geometry.id(),
                    material: mesh.material.clone(),
                    cast_shadow: mesh.cast_shadow,
                    receive_shadow: mesh.receive_shadow,
                });
            }
        }

        for item in &items {
            self.mesh_cache.entry(item.geometry_id).or_insert_with(|| {
                MeshBuffers::from_geometry(
                    &self.device,
                    &item.geometry,
                    &format!("geometry-{}", item.geometry_id),
                )
            });

            let mut fresh = false;
            let object = self.object_cache.entry(item.node).or_insert_with(|| {
                fresh = true;
                ObjectGpu::new(
                    &self.device,
                    &self.object_layout,
                    std::mem::size_of::<ObjectUniform>() as u64,
                    std::mem::size_of::<MaterialUniform>() as u64,
                )
            });

            let normal = Mat3::from_mat4(item.world).inverse().transpose();
            let transform = ObjectUniform {
                model: item.world.to_cols_array_2d(),
                normal: mat3_to_3x4(normal),
            };
            self.queue
                .write_buffer(&object.transform_buffer, 0, bytes_of(&transform));

            if fresh || item.material.needs_upload {
                let material = MaterialUniform {
                    base_color: item.material.base_color.into(),
                    params: [
                        item.material.env_map_intensity,
                        item.material.metallic,
                        item.material.roughness,
                        if item.receive_shadow { 1.0 } else { 0.0 },
                    ],
                };
                self.queue
                    .write_buffer(&object.material_buffer, 0, bytes_of(&material));
            }
        }

        for item in &items {
            if item.material.needs_upload {
                if let NodeKind::Mesh(mesh) = &mut scene.node_mut(item.node).kind {
                    mesh.material.needs_upload = false;
                }
            }
        }

        items
    }
}

struct DrawItem {
    node: NodeId,
    world: Mat4,
    geometry: Arc<crate::scene::Geometry>,
    geometry_id: u64,
    material: StandardMaterial,
    cast_shadow: bool,
    receive_shadow: bool,
}

fn create_global_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    global_buffer: &wgpu::Buffer,
    shadow: &ShadowMap,
    env_view: &wgpu::TextureView,
    env_sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("global-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&shadow.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&shadow.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(env_view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::Sampler(env_sampler),
            },
        ],
    })
}

fn create_cubemap(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    map: Option<&EnvironmentMap>,
) -> wgpu::TextureView {
    let size = map.map_or(1, |map| map.size.max(1));
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("environment-cubemap"),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 6,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let black = vec![0u8; (size * size * 4) as usize];
    for face in 0..6u32 {
        let data = map.map_or(black.as_slice(), |map| map.faces[face as usize].as_slice());
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: face,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * size),
                rows_per_image: Some(size),
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
    }

    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("environment-cubemap-view"),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    })
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    light_view_proj: [[f32; 4]; 4],
    sky_view_proj_inv: [[f32; 4]; 4],
    camera_position: [f32; 4],
    light_direction: [f32; 4],
    light_color: [f32; 4],
    params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectUniform {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MaterialUniform {
    base_color: [f32; 4],
    params: [f32; 4],
}

const SHADER: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    light_view_proj: mat4x4<f32>,
    sky_view_proj_inv: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_direction: vec4<f32>,
    light_color: vec4<f32>,
    params: vec4<f32>,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
}

struct Material {
    base_color: vec4<f32>,
    params: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: Globals;
@group(0) @binding(1)
var shadow_map: texture_depth_2d;
@group(0) @binding(2)
var shadow_sampler: sampler_comparison;
@group(0) @binding(3)
var environment: texture_cube<f32>;
@group(0) @binding(4)
var environment_sampler: sampler;

@group(1) @binding(0)
var<uniform> object: ObjectUniform;
@group(1) @binding(1)
var<uniform> material: Material;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;

    out.normal = normalize(world_normal);
    return out;
}

@vertex
fn vs_shadow(input: VertexInput) -> @builtin(position) vec4<f32> {
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    return globals.light_view_proj * world_position;
}

fn shadow_factor(world_pos: vec3<f32>, normal: vec3<f32>) -> f32 {
    // Offset along the normal keeps contact surfaces out of self-shadow.
    let biased = world_pos + normal * globals.light_direction.w;
    let clip = globals.light_view_proj * vec4<f32>(biased, 1.0);
    let ndc = clip.xyz / clip.w;
    let uv = ndc.xy * vec2<f32>(0.5, -0.5) + vec2<f32>(0.5, 0.5);
    if (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 || ndc.z > 1.0) {
        return 1.0;
    }
    let texel = 1.0 / f32(textureDimensions(shadow_map).x);
    var sum = 0.0;
    for (var x = -1; x <= 1; x = x + 1) {
        for (var y = -1; y <= 1; y = y + 1) {
            let offset = vec2<f32>(f32(x), f32(y)) * texel;
            sum = sum + textureSampleCompareLevel(shadow_map, shadow_sampler, uv + offset, ndc.z);
        }
    }
    return sum / 9.0;
}

fn tone_map(color: vec3<f32>) -> vec3<f32> {
    let mode = u32(globals.params.x);
    let exposure = globals.params.y;
    let c = color * exposure;
    switch mode {
        case 1u: {
            return c;
        }
        case 2u: {
            return c / (vec3<f32>(1.0) + c);
        }
        case 3u: {
            let v = max(vec3<f32>(0.0), c - vec3<f32>(0.004));
            let r = (v * (6.2 * v + 0.5)) / (v * (6.2 * v + 1.7) + 0.06);
            return pow(r, vec3<f32>(2.2));
        }
        case 4u: {
            let r = (c * (2.51 * c + 0.03)) / (c * (2.43 * c + 0.59) + 0.14);
            return clamp(r, vec3<f32>(0.0), vec3<f32>(1.0));
        }
        default: {
            return color;
        }
    }
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let normal = normalize(input.normal);
    let light_dir = normalize(-globals.light_direction.xyz);
    let diffuse = max(dot(normal, light_dir), 0.0);

    var shadow = 1.0;
    if (material.params.w > 0.5) {
        shadow = shadow_factor(input.world_pos, normal);
    }

    let env_weight = globals.params.z;
    let irradiance = textureSample(environment, environment_sampler, normal).rgb;
    let ambient = mix(vec3<f32>(0.03), irradiance * material.params.x, env_weight);

    let view_dir = normalize(globals.camera_position.xyz - input.world_pos);
    let half_dir = normalize(light_dir + view_dir);
    let rough = clamp(material.params.z, 0.045, 1.0);
    let spec_power = 2.0 / (rough * rough);
    let spec_strength = mix(0.04, 1.0, material.params.y) * (1.0 - rough);
    let specular = pow(max(dot(normal, half_dir), 0.0), spec_power) * spec_strength;

    let direct = globals.light_color.rgb * globals.light_color.w * shadow;
    var color = material.base_color.rgb * (ambient + direct * diffuse);
    color = color + direct * specular;

    return vec4<f32>(tone_map(color), material.base_color.a);
}

struct SkyOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
}

@vertex
fn vs_sky(@builtin(vertex_index) index: u32) -> SkyOutput {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0)
    );
    let pos = positions[index];
    var out: SkyOutput;
    out.position = vec4<f32>(pos, 1.0, 1.0);
    out.ndc = pos;
    return out;
}

@fragment
fn fs_sky(input: SkyOutput) -> @location(0) vec4<f32> {
    let world = globals.sky_view_proj_inv * vec4<f32>(input.ndc, 1.0, 1.0);
    let direction = normalize(world.xyz / world.w);
    let sky = textureSample(environment, environment_sampler, direction).rgb;
    let color = mix(vec3<f32>(0.03, 0.03, 0.05), sky, globals.params.z);
    return vec4<f32>(tone_map(color), 1.0);
}
"#;
