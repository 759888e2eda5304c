use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::Allocator;

use crate::renderer::core::transfer::TransferContext;
use crate::renderer::error::RenderError;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::mesh::Mesh;

/// Device-local vertex and index buffers for one uploaded mesh.
pub struct Model {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub index_count: u32,
}

impl Model {
    pub fn new(
        mesh: &Mesh,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer: &TransferContext,
    ) -> Result<Self, RenderError> {
        let vertex_buffer = Buffer::new_device_local(
            &mesh.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "model vertex buffer",
            memory_allocator.clone(),
            device.clone(),
            transfer,
        )?;
        let index_buffer = Buffer::new_device_local(
            &mesh.indices,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "model index buffer",
            memory_allocator,
            device,
            transfer,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        })
    }
}
