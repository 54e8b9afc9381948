//! Separable gaussian blur over the two ping-pong buffers.
//!
//! Pass `i` writes buffer `i % 2` and blurs horizontally on even passes,
//! vertically on odd ones. The first pass reads the bright attachment of the
//! scene target; every later pass reads the other ping-pong buffer.

use crate::hdr::HdrTarget;
use crate::uniforms::BlurParams;
use wgpu::util::DeviceExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurSource {
    Bright,
    PingPong(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurStep {
    pub source: BlurSource,
    pub target: usize,
    pub horizontal: bool,
}

pub fn blur_schedule(iterations: u32) -> Vec<BlurStep> {
    (0..iterations as usize)
        .map(|i| BlurStep {
            source: if i == 0 {
                BlurSource::Bright
            } else {
                BlurSource::PingPong((i + 1) % 2)
            },
            target: i % 2,
            horizontal: i % 2 == 0,
        })
        .collect()
}

/// Ping-pong buffer holding the final blur, or `None` when no pass runs.
pub fn final_output(iterations: u32) -> Option<usize> {
    iterations.checked_sub(1).map(|last| last as usize % 2)
}

/// Bind groups for the three source/direction pairs a schedule can use.
pub struct BloomChain {
    params: [wgpu::Buffer; 2],
    from_bright: wgpu::BindGroup,
    from_ping_pong: [wgpu::BindGroup; 2],
}

impl BloomChain {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        hdr: &HdrTarget,
    ) -> Self {
        let texel_size = hdr.texel_size();
        let params = [[1.0, 0.0], [0.0, 1.0]].map(|direction| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Blur Params"),
                contents: bytemuck::bytes_of(&BlurParams {
                    direction,
                    texel_size,
                }),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });
        let bind = |view: &wgpu::TextureView, params: &wgpu::Buffer, label: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        // Horizontal passes read ping-pong 1, vertical passes read ping-pong 0.
        let from_bright = bind(&hdr.bright.view, &params[0], "Blur from Bright");
        let from_ping_pong = [
            bind(&hdr.ping_pong[0].view, &params[1], "Blur from Ping-pong 0"),
            bind(&hdr.ping_pong[1].view, &params[0], "Blur from Ping-pong 1"),
        ];
        Self {
            params,
            from_bright,
            from_ping_pong,
        }
    }

    fn bind_group(&self, source: BlurSource) -> &wgpu::BindGroup {
        match source {
            BlurSource::Bright => &self.from_bright,
            BlurSource::PingPong(i) => &self.from_ping_pong[i],
        }
    }

    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        hdr: &HdrTarget,
        iterations: u32,
    ) {
        for step in blur_schedule(iterations) {
            let mut pass = hdr.begin_blur_pass(encoder, step.target);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, self.bind_group(step.source), &[]);
            pass.draw(0..3, 0..1);
        }
    }

    pub fn destroy(&self) {
        for p in &self.params {
            p.destroy();
        }
    }
}
