//! Final resolve of the HDR scene to the swapchain, with an optional inset
//! showing the shadow map.

use prism_core::settings::RenderSettings;
use wgpu::util::DeviceExt;

use crate::bloom::final_output;
use crate::hdr::HdrTarget;
use crate::shader::TextureSlots;
use crate::shadow_map::ShadowMap;
use crate::uniforms::CompositeParams;

/// Fraction of the window each side of the shadow-map inset covers.
const INSET_FRACTION: f32 = 0.25;

impl CompositeParams {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self {
            exposure: settings.exposure,
            bloom: u32::from(settings.bloom && settings.bloom_iterations > 0),
            tone_mapping: u32::from(settings.tone_mapping),
            gamma: u32::from(settings.gamma_correction),
        }
    }
}

/// Viewport of the debug inset in the bottom-left corner: x, y, w, h.
pub fn inset_viewport(width: u32, height: u32) -> [f32; 4] {
    let w = width as f32 * INSET_FRACTION;
    let h = height as f32 * INSET_FRACTION;
    [0.0, height as f32 - h, w, h]
}

pub struct CompositePass {
    params: wgpu::Buffer,
    /// Indexed by the ping-pong buffer holding the final blur.
    bind_groups: [wgpu::BindGroup; 2],
    depth_debug: wgpu::BindGroup,
}

impl CompositePass {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        depth_debug_layout: &wgpu::BindGroupLayout,
        slots: &TextureSlots,
        debug_slots: &TextureSlots,
        sampler: &wgpu::Sampler,
        hdr: &HdrTarget,
        shadow: &ShadowMap,
    ) -> Self {
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Composite Params"),
            contents: bytemuck::bytes_of(&CompositeParams::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind = |bloom: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Composite Bind Group"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: slots.binding("scene"),
                        resource: wgpu::BindingResource::TextureView(&hdr.scene.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: slots.binding("bloom_blur"),
                        resource: wgpu::BindingResource::TextureView(bloom),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [bind(&hdr.ping_pong[0].view), bind(&hdr.ping_pong[1].view)];
        let depth_debug = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Depth Debug Bind Group"),
            layout: depth_debug_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: debug_slots.binding("depth_map"),
                resource: wgpu::BindingResource::TextureView(&shadow.view),
            }],
        });
        Self {
            params,
            bind_groups,
            depth_debug,
        }
    }

    pub fn update(&self, queue: &wgpu::Queue, settings: &RenderSettings) {
        queue.write_buffer(
            &self.params,
            0,
            bytemuck::bytes_of(&CompositeParams::from_settings(settings)),
        );
    }

    /// The only pass that writes outside the HDR target.
    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
        surface_size: (u32, u32),
        composite: &wgpu::RenderPipeline,
        depth_debug: &wgpu::RenderPipeline,
        bloom_iterations: u32,
        show_shadow_map: bool,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: surface_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        let bloom_source = final_output(bloom_iterations).unwrap_or(0);
        pass.set_pipeline(composite);
        pass.set_bind_group(0, &self.bind_groups[bloom_source], &[]);
        pass.draw(0..3, 0..1);

        if show_shadow_map {
            let [x, y, w, h] = inset_viewport(surface_size.0, surface_size.1);
            pass.set_viewport(x, y, w, h, 0.0, 1.0);
            pass.set_pipeline(depth_debug);
            pass.set_bind_group(0, &self.depth_debug, &[]);
            pass.draw(0..3, 0..1);
        }
    }

    pub fn destroy(&self) {
        self.params.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_follow_toggles() {
        let mut settings = RenderSettings::default();
        settings.exposure = 2.0;
        settings.gamma_correction = false;
        let p = CompositeParams::from_settings(&settings);
        assert_eq!(p.exposure, 2.0);
        assert_eq!((p.bloom, p.tone_mapping, p.gamma), (1, 1, 0));
    }

    #[test]
    fn bloom_flag_off_without_iterations() {
        let settings = RenderSettings {
            bloom_iterations: 0,
            ..RenderSettings::default()
        };
        assert_eq!(CompositeParams::from_settings(&settings).bloom, 0);
    }

    #[test]
    fn inset_sits_in_bottom_left_quarter() {
        let [x, y, w, h] = inset_viewport(800, 600);
        assert_eq!((x, w, h), (0.0, 200.0, 150.0));
        assert_eq!(y + h, 600.0);
    }
}
