//! Per-draw uniform slots in one dynamic-offset buffer.
//!
//! Entity `i` always uses slot `i`; the outline and the skybox get the two
//! slots after the last entity. The whole buffer is staged on the CPU and
//! uploaded with a single write per frame.

use crate::uniforms::DrawUniform;

/// Dynamic offsets must be multiples of the device's uniform offset
/// alignment; 256 is the default limit.
pub const DRAW_SLOT_STRIDE: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawSlots {
    entity_capacity: usize,
}

impl DrawSlots {
    pub fn new(entity_capacity: usize) -> Self {
        Self { entity_capacity }
    }

    pub fn count(&self) -> usize {
        self.entity_capacity + 2
    }

    pub fn entity(&self, index: usize) -> usize {
        assert!(index < self.entity_capacity, "entity slot {index} out of range");
        index
    }

    pub fn outline(&self) -> usize {
        self.entity_capacity
    }

    pub fn skybox(&self) -> usize {
        self.entity_capacity + 1
    }

    pub fn offset(slot: usize) -> u32 {
        (slot as u64 * DRAW_SLOT_STRIDE) as u32
    }

    pub fn buffer_size(&self) -> u64 {
        self.count() as u64 * DRAW_SLOT_STRIDE
    }
}

pub struct DrawBuffer {
    pub slots: DrawSlots,
    staging: Vec<u8>,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl DrawBuffer {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, entity_capacity: usize) -> Self {
        let slots = DrawSlots::new(entity_capacity);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniforms"),
            size: slots.buffer_size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniform>() as u64),
                }),
            }],
        });
        Self {
            slots,
            staging: vec![0; slots.buffer_size() as usize],
            buffer,
            bind_group,
        }
    }

    pub fn write(&mut self, slot: usize, uniform: &DrawUniform) {
        let start = DrawSlots::offset(slot) as usize;
        let bytes = bytemuck::bytes_of(uniform);
        self.staging[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn upload(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.buffer, 0, &self.staging);
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn destroy(&self) {
        self.buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_fits_in_one_slot() {
        assert!(std::mem::size_of::<DrawUniform>() as u64 <= DRAW_SLOT_STRIDE);
    }

    #[test]
    fn special_slots_follow_entities() {
        let slots = DrawSlots::new(100);
        assert_eq!(slots.entity(99), 99);
        assert_eq!(slots.outline(), 100);
        assert_eq!(slots.skybox(), 101);
        assert_eq!(slots.count(), 102);
        assert_eq!(slots.buffer_size(), 102 * 256);
    }

    #[test]
    fn offsets_are_aligned() {
        for slot in 0..10 {
            assert_eq!(DrawSlots::offset(slot) % 256, 0);
        }
        assert_eq!(DrawSlots::offset(3), 768);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn entity_slot_beyond_capacity_panics() {
        DrawSlots::new(4).entity(4);
    }
}
