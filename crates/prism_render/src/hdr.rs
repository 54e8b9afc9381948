//! Off-screen HDR targets: the two-attachment scene buffer, its depth/stencil
//! buffer and the two ping-pong buffers used by the bloom blur.
//!
//! Every texture is released explicitly through [`HdrTarget::destroy`] before
//! a replacement is created, rather than waiting for the handles to drop.

use crate::gpu_context::create_logged;
use crate::pipelines::{DEPTH_STENCIL_FORMAT, HDR_FORMAT};

pub struct TargetTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl TargetTexture {
    fn new(
        device: &wgpu::Device,
        label: &str,
        (width, height): (u32, u32),
        format: wgpu::TextureFormat,
        sample_count: u32,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

const CLEAR_BLACK: wgpu::Color = wgpu::Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};

pub struct HdrTarget {
    pub size: (u32, u32),
    pub sample_count: u32,
    /// Linear scene color, sampled by the composite pass.
    pub scene: TargetTexture,
    /// Fragments above the bloom threshold, sampled by the first blur.
    pub bright: TargetTexture,
    /// Multisampled color attachments resolved into `scene` and `bright`.
    msaa: Option<[TargetTexture; 2]>,
    pub depth_stencil: TargetTexture,
    pub ping_pong: [TargetTexture; 2],
}

impl HdrTarget {
    pub fn create(device: &wgpu::Device, width: u32, height: u32, sample_count: u32) -> Self {
        let size = (width.max(1), height.max(1));
        let sampled = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let target = create_logged(device, "HDR framebuffer", || {
            let scene = TargetTexture::new(device, "HDR Scene", size, HDR_FORMAT, 1, sampled);
            let bright = TargetTexture::new(device, "HDR Bright", size, HDR_FORMAT, 1, sampled);
            let msaa = (sample_count > 1).then(|| {
                [
                    TargetTexture::new(
                        device,
                        "HDR Scene MSAA",
                        size,
                        HDR_FORMAT,
                        sample_count,
                        wgpu::TextureUsages::RENDER_ATTACHMENT,
                    ),
                    TargetTexture::new(
                        device,
                        "HDR Bright MSAA",
                        size,
                        HDR_FORMAT,
                        sample_count,
                        wgpu::TextureUsages::RENDER_ATTACHMENT,
                    ),
                ]
            });
            let depth_stencil = TargetTexture::new(
                device,
                "HDR Depth Stencil",
                size,
                DEPTH_STENCIL_FORMAT,
                sample_count,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            );
            (scene, bright, msaa, depth_stencil)
        });
        let ping_pong = create_logged(device, "Ping-pong framebuffers", || {
            [
                TargetTexture::new(device, "Ping-pong 0", size, HDR_FORMAT, 1, sampled),
                TargetTexture::new(device, "Ping-pong 1", size, HDR_FORMAT, 1, sampled),
            ]
        });
        let (scene, bright, msaa, depth_stencil) = target;
        log::debug!("HDR targets created: {}x{} x{sample_count}", size.0, size.1);
        Self {
            size,
            sample_count,
            scene,
            bright,
            msaa,
            depth_stencil,
            ping_pong,
        }
    }

    pub fn destroy(&self) {
        self.scene.destroy();
        self.bright.destroy();
        if let Some(msaa) = &self.msaa {
            for t in msaa {
                t.destroy();
            }
        }
        self.depth_stencil.destroy();
        for t in &self.ping_pong {
            t.destroy();
        }
    }

    fn color_attachment<'a>(
        &'a self,
        index: usize,
        resolved: &'a TargetTexture,
    ) -> Option<wgpu::RenderPassColorAttachment<'a>> {
        let (view, resolve_target) = match &self.msaa {
            Some(msaa) => (&msaa[index].view, Some(&resolved.view)),
            None => (&resolved.view, None),
        };
        Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(CLEAR_BLACK),
                store: wgpu::StoreOp::Store,
            },
        })
    }

    /// Main scene pass: clears both color attachments, depth and stencil.
    pub fn begin_main_pass<'e>(&self, encoder: &'e mut wgpu::CommandEncoder) -> wgpu::RenderPass<'e> {
        let attachments = [
            self.color_attachment(0, &self.scene),
            self.color_attachment(1, &self.bright),
        ];
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Main Pass"),
            color_attachments: &attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_stencil.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    /// Writes one ping-pong buffer.
    pub fn begin_blur_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        target: usize,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Blur Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.ping_pong[target].view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.size.0 as f32, 1.0 / self.size.1 as f32]
    }
}
