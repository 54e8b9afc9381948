//! Bind group layouts and per-program pipeline state.
//!
//! Scene programs share group 0 (static block + frame uniform) and group 1
//! (per-draw dynamic slot). Group 2 is the material for lit meshes or the
//! cube map for the skybox. Post-processing programs own a single group.

use std::num::NonZeroU64;

use prism_core::shader_kind::ShaderKind;

use crate::shadow_map::SHADOW_FORMAT;
use crate::uniforms::{BlurParams, CompositeParams, DrawUniform, FrameUniform, StaticBlock};
use crate::vertex::MeshVertex;

pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Value written into the stencil buffer by every scene fragment.
pub const STENCIL_STAMP: u32 = 1;

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, size: usize, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: NonZeroU64::new(size as u64),
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, kind: wgpu::SamplerBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(kind),
        count: None,
    }
}

const FLOAT_FILTERABLE: wgpu::TextureSampleType = wgpu::TextureSampleType::Float { filterable: true };
const D2: wgpu::TextureViewDimension = wgpu::TextureViewDimension::D2;

pub struct SharedLayouts {
    pub program: wgpu::BindGroupLayout,
    pub draw: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub skybox: wgpu::BindGroupLayout,
    pub blur: wgpu::BindGroupLayout,
    pub composite: wgpu::BindGroupLayout,
    pub depth_debug: wgpu::BindGroupLayout,
}

impl SharedLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let vf = wgpu::ShaderStages::VERTEX_FRAGMENT;
        let program = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Program Layout"),
            entries: &[
                uniform_entry(0, vf, std::mem::size_of::<StaticBlock>(), false),
                uniform_entry(1, vf, std::mem::size_of::<FrameUniform>(), false),
            ],
        });
        let draw = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Layout"),
            entries: &[uniform_entry(0, vf, std::mem::size_of::<DrawUniform>(), true)],
        });
        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Layout"),
            entries: &[
                texture_entry(0, FLOAT_FILTERABLE, D2),
                texture_entry(1, FLOAT_FILTERABLE, D2),
                texture_entry(2, FLOAT_FILTERABLE, D2),
                sampler_entry(3, wgpu::SamplerBindingType::Filtering),
                texture_entry(4, wgpu::TextureSampleType::Depth, D2),
                sampler_entry(5, wgpu::SamplerBindingType::Comparison),
            ],
        });
        let skybox = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Skybox Layout"),
            entries: &[
                texture_entry(0, FLOAT_FILTERABLE, wgpu::TextureViewDimension::Cube),
                sampler_entry(1, wgpu::SamplerBindingType::Filtering),
            ],
        });
        let blur = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blur Layout"),
            entries: &[
                texture_entry(0, FLOAT_FILTERABLE, D2),
                sampler_entry(1, wgpu::SamplerBindingType::Filtering),
                uniform_entry(
                    2,
                    wgpu::ShaderStages::FRAGMENT,
                    std::mem::size_of::<BlurParams>(),
                    false,
                ),
            ],
        });
        let composite = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite Layout"),
            entries: &[
                texture_entry(0, FLOAT_FILTERABLE, D2),
                texture_entry(1, FLOAT_FILTERABLE, D2),
                sampler_entry(2, wgpu::SamplerBindingType::Filtering),
                uniform_entry(
                    3,
                    wgpu::ShaderStages::FRAGMENT,
                    std::mem::size_of::<CompositeParams>(),
                    false,
                ),
            ],
        });
        let depth_debug = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Depth Debug Layout"),
            entries: &[texture_entry(0, wgpu::TextureSampleType::Depth, D2)],
        });
        Self {
            program,
            draw,
            material,
            skybox,
            blur,
            composite,
            depth_debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMode {
    None,
    /// Depth-only shadow target.
    Shadow,
    /// Opaque geometry: depth test and write, stamps the stencil.
    Opaque,
    /// Selection outline: no depth test, only where the stencil was not stamped.
    Outline,
    /// Skybox: drawn at the far plane behind everything else.
    Skybox,
}

/// Fixed-function state of one program's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSpec {
    pub color_targets: usize,
    pub target_format: Option<wgpu::TextureFormat>,
    pub depth: DepthMode,
    pub cull_back: bool,
    pub uses_vertex_buffer: bool,
    pub multisampled: bool,
}

impl PipelineSpec {
    pub fn for_kind(kind: ShaderKind, surface_format: wgpu::TextureFormat) -> Self {
        let scene = |depth, cull_back| Self {
            color_targets: 2,
            target_format: Some(HDR_FORMAT),
            depth,
            cull_back,
            uses_vertex_buffer: true,
            multisampled: true,
        };
        let post = |format| Self {
            color_targets: 1,
            target_format: Some(format),
            depth: DepthMode::None,
            cull_back: false,
            uses_vertex_buffer: false,
            multisampled: false,
        };
        match kind {
            ShaderKind::Lit | ShaderKind::Light => scene(DepthMode::Opaque, true),
            ShaderKind::Outline => scene(DepthMode::Outline, true),
            ShaderKind::Skybox => scene(DepthMode::Skybox, false),
            // Shadow casters may be single-sided.
            ShaderKind::Shadow => Self {
                color_targets: 0,
                target_format: None,
                depth: DepthMode::Shadow,
                cull_back: false,
                uses_vertex_buffer: true,
                multisampled: false,
            },
            ShaderKind::Blur => post(HDR_FORMAT),
            ShaderKind::Composite | ShaderKind::DepthDebug => post(surface_format),
        }
    }
}

fn stencil_face(compare: wgpu::CompareFunction, pass_op: wgpu::StencilOperation) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare,
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op,
    }
}

fn depth_stencil_state(mode: DepthMode) -> Option<wgpu::DepthStencilState> {
    let stencil = |compare, pass_op, write_mask| {
        let face = stencil_face(compare, pass_op);
        wgpu::StencilState {
            front: face,
            back: face,
            read_mask: 0xff,
            write_mask,
        }
    };
    match mode {
        DepthMode::None => None,
        DepthMode::Shadow => Some(wgpu::DepthStencilState {
            format: SHADOW_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            },
        }),
        DepthMode::Opaque => Some(wgpu::DepthStencilState {
            format: DEPTH_STENCIL_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: stencil(
                wgpu::CompareFunction::Always,
                wgpu::StencilOperation::Replace,
                0xff,
            ),
            bias: wgpu::DepthBiasState::default(),
        }),
        DepthMode::Outline => Some(wgpu::DepthStencilState {
            format: DEPTH_STENCIL_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: stencil(
                wgpu::CompareFunction::NotEqual,
                wgpu::StencilOperation::Keep,
                0x00,
            ),
            bias: wgpu::DepthBiasState::default(),
        }),
        DepthMode::Skybox => Some(wgpu::DepthStencilState {
            format: DEPTH_STENCIL_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: stencil(
                wgpu::CompareFunction::Always,
                wgpu::StencilOperation::Keep,
                0x00,
            ),
            bias: wgpu::DepthBiasState::default(),
        }),
    }
}

/// Everything needed to turn compiled modules into a pipeline.
pub struct PipelineFactory {
    pub layouts: SharedLayouts,
    pub surface_format: wgpu::TextureFormat,
    pub sample_count: u32,
}

impl PipelineFactory {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat, sample_count: u32) -> Self {
        Self {
            layouts: SharedLayouts::new(device),
            surface_format,
            sample_count,
        }
    }

    fn bind_group_layouts(&self, kind: ShaderKind) -> Vec<&wgpu::BindGroupLayout> {
        let l = &self.layouts;
        match kind {
            ShaderKind::Lit => vec![&l.program, &l.draw, &l.material],
            ShaderKind::Light | ShaderKind::Outline | ShaderKind::Shadow => vec![&l.program, &l.draw],
            ShaderKind::Skybox => vec![&l.program, &l.draw, &l.skybox],
            ShaderKind::Blur => vec![&l.blur],
            ShaderKind::Composite => vec![&l.composite],
            ShaderKind::DepthDebug => vec![&l.depth_debug],
        }
    }

    pub fn create(
        &self,
        device: &wgpu::Device,
        kind: ShaderKind,
        vertex: &wgpu::ShaderModule,
        fragment: Option<&wgpu::ShaderModule>,
    ) -> wgpu::RenderPipeline {
        let spec = PipelineSpec::for_kind(kind, self.surface_format);
        let label = format!("{kind} Pipeline");
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &self.bind_group_layouts(kind),
            push_constant_ranges: &[],
        });

        let vertex_buffers = [MeshVertex::layout()];
        let buffers: &[wgpu::VertexBufferLayout] = if spec.uses_vertex_buffer {
            &vertex_buffers
        } else {
            &[]
        };

        let targets: Vec<Option<wgpu::ColorTargetState>> = spec
            .target_format
            .map(|format| {
                (0..spec.color_targets)
                    .map(|_| {
                        Some(wgpu::ColorTargetState {
                            format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let fragment_state = fragment.map(|module| wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &targets,
            compilation_options: Default::default(),
        });

        let sample_count = if spec.multisampled { self.sample_count } else { 1 };

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: vertex,
                entry_point: Some("vs_main"),
                buffers,
                compilation_options: Default::default(),
            },
            fragment: fragment_state,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: spec.cull_back.then_some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: depth_stencil_state(spec.depth),
            multisample: wgpu::MultisampleState {
                count: sample_count,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

    #[test]
    fn scene_programs_write_both_hdr_attachments() {
        for &kind in ShaderKind::ALL.iter().filter(|k| k.is_scene_pass()) {
            let spec = PipelineSpec::for_kind(kind, SURFACE);
            assert_eq!(spec.color_targets, 2, "{kind}");
            assert_eq!(spec.target_format, Some(HDR_FORMAT));
            assert!(spec.multisampled);
        }
    }

    #[test]
    fn only_composite_passes_target_the_surface() {
        for &kind in ShaderKind::ALL {
            let spec = PipelineSpec::for_kind(kind, SURFACE);
            let to_surface = spec.target_format == Some(SURFACE);
            assert_eq!(
                to_surface,
                matches!(kind, ShaderKind::Composite | ShaderKind::DepthDebug),
                "{kind}"
            );
        }
    }

    #[test]
    fn shadow_pass_is_depth_only_without_culling() {
        let spec = PipelineSpec::for_kind(ShaderKind::Shadow, SURFACE);
        assert_eq!(spec.color_targets, 0);
        assert!(!spec.cull_back);
        let state = depth_stencil_state(spec.depth).unwrap();
        assert_eq!(state.format, SHADOW_FORMAT);
        assert!(state.bias.constant > 0);
    }

    #[test]
    fn outline_ignores_depth_and_tests_stencil() {
        let state = depth_stencil_state(DepthMode::Outline).unwrap();
        assert_eq!(state.depth_compare, wgpu::CompareFunction::Always);
        assert!(!state.depth_write_enabled);
        assert_eq!(state.stencil.front.compare, wgpu::CompareFunction::NotEqual);
        assert_eq!(state.stencil.write_mask, 0);
    }

    #[test]
    fn opaque_geometry_stamps_stencil() {
        let state = depth_stencil_state(DepthMode::Opaque).unwrap();
        assert_eq!(state.stencil.front.pass_op, wgpu::StencilOperation::Replace);
        assert_eq!(state.stencil.front.compare, wgpu::CompareFunction::Always);
        assert!(state.depth_write_enabled);
    }

    #[test]
    fn skybox_uses_less_equal_without_writes() {
        let state = depth_stencil_state(DepthMode::Skybox).unwrap();
        assert_eq!(state.depth_compare, wgpu::CompareFunction::LessEqual);
        assert!(!state.depth_write_enabled);
        assert_eq!(state.stencil.write_mask, 0);
    }
}
