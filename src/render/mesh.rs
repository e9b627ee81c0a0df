use wgpu::util::DeviceExt;

use crate::scene::Geometry;

/// GPU vertex/index buffers for one geometry.
pub(super) struct MeshBuffers {
    pub vertex: wgpu::Buffer,
    pub index: wgpu::Buffer,
    pub index_count: u32,
}

impl MeshBuffers {
    pub fn from_geometry(device: &wgpu::Device, geometry: &Geometry, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: geometry.indices.len() as u32,
        }
    }
}

/// Persistent per-node uniforms: the transform buffer is rewritten every
/// frame, the material buffer only when its dirty flag is set.
pub(super) struct ObjectGpu {
    pub transform_buffer: wgpu::Buffer,
    pub material_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl ObjectGpu {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        transform_size: u64,
        material_size: u64,
    ) -> Self {
        let transform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("object-transform"),
            size: transform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let material_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("object-material"),
            size: material_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("object-bind-group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: transform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: material_buffer.as_entire_binding(),
                },
            ],
        });
        Self {
            transform_buffer,
            material_buffer,
            bind_group,
        }
    }
}
