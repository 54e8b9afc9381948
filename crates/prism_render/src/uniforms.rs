//! CPU mirrors of the uniform blocks declared in the WGSL sources.

use glam::{Mat4, Vec3};
use prism_core::shader_kind::ShaderKind;

/// Per-program constants that change only on setup, resize or settings edits.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StaticBlock {
    pub projection: [[f32; 4]; 4],
    pub light_space: [[f32; 4]; 4],
    pub dir_light_direction: [f32; 4],
    pub dir_light_ambient: [f32; 4],
    pub dir_light_diffuse: [f32; 4],
    pub dir_light_specular: [f32; 4],
    /// x: texel offset, y: PCF window side, z: depth bias.
    pub shadow_params: [f32; 4],
    /// x: brightness threshold for the bloom attachment.
    pub bloom_params: [f32; 4],
}

impl Default for StaticBlock {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY.to_cols_array_2d(),
            light_space: Mat4::IDENTITY.to_cols_array_2d(),
            dir_light_direction: [0.0, -1.0, 0.0, 0.0],
            dir_light_ambient: [0.0; 4],
            dir_light_diffuse: [0.0; 4],
            dir_light_specular: [0.0; 4],
            shadow_params: [0.0, 1.0, 0.0, 0.0],
            bloom_params: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticTag {
    Projection,
    LightSpace,
    DirectionalLight,
    ShadowFilter,
    BloomThreshold,
}

impl StaticTag {
    /// Programs whose static block carries this value.
    pub fn consumers(self) -> &'static [ShaderKind] {
        match self {
            Self::Projection | Self::BloomThreshold => &[
                ShaderKind::Lit,
                ShaderKind::Light,
                ShaderKind::Outline,
                ShaderKind::Skybox,
            ],
            Self::LightSpace => &[ShaderKind::Lit, ShaderKind::Shadow],
            Self::DirectionalLight | Self::ShadowFilter => &[ShaderKind::Lit],
        }
    }
}

/// One recorded write into a program's static block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StaticUniform {
    Projection(Mat4),
    LightSpace(Mat4),
    DirectionalLight {
        direction: Vec3,
        ambient: Vec3,
        diffuse: Vec3,
        specular: Vec3,
    },
    ShadowFilter {
        texel_offset: f32,
        window_side: u32,
        bias: f32,
    },
    BloomThreshold(f32),
}

impl StaticUniform {
    pub fn tag(&self) -> StaticTag {
        match self {
            Self::Projection(_) => StaticTag::Projection,
            Self::LightSpace(_) => StaticTag::LightSpace,
            Self::DirectionalLight { .. } => StaticTag::DirectionalLight,
            Self::ShadowFilter { .. } => StaticTag::ShadowFilter,
            Self::BloomThreshold(_) => StaticTag::BloomThreshold,
        }
    }

    pub fn apply(&self, block: &mut StaticBlock) {
        match *self {
            Self::Projection(m) => block.projection = m.to_cols_array_2d(),
            Self::LightSpace(m) => block.light_space = m.to_cols_array_2d(),
            Self::DirectionalLight {
                direction,
                ambient,
                diffuse,
                specular,
            } => {
                block.dir_light_direction = direction.normalize_or_zero().extend(0.0).to_array();
                block.dir_light_ambient = ambient.extend(0.0).to_array();
                block.dir_light_diffuse = diffuse.extend(0.0).to_array();
                block.dir_light_specular = specular.extend(0.0).to_array();
            }
            Self::ShadowFilter {
                texel_offset,
                window_side,
                bias,
            } => {
                block.shadow_params = [texel_offset, window_side.max(1) as f32, bias, 0.0];
            }
            Self::BloomThreshold(t) => block.bloom_params[0] = t,
        }
    }
}

/// The recorded static writes of one program, at most one per tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticUniforms {
    commands: Vec<StaticUniform>,
}

impl StaticUniforms {
    /// Records `command`, replacing any earlier one with the same tag.
    /// Returns whether anything changed.
    pub fn set(&mut self, command: StaticUniform) -> bool {
        let tag = command.tag();
        match self.commands.iter_mut().find(|c| c.tag() == tag) {
            Some(existing) if *existing == command => false,
            Some(existing) => {
                *existing = command;
                true
            }
            None => {
                self.commands.push(command);
                true
            }
        }
    }

    pub fn get(&self, tag: StaticTag) -> Option<&StaticUniform> {
        self.commands.iter().find(|c| c.tag() == tag)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Rebuilds the block from defaults by applying every command.
    pub fn replay(&self) -> StaticBlock {
        let mut block = StaticBlock::default();
        for command in &self.commands {
            command.apply(&mut block);
        }
        block
    }
}

pub const MAX_POINT_LIGHTS: usize = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointLightUniform {
    pub position: [f32; 4],
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// x: constant, y: linear, z: quadratic.
    pub attenuation: [f32; 4],
}

/// Per-frame values shared by every scene program.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniform {
    pub view: [[f32; 4]; 4],
    pub view_position: [f32; 4],
    pub point_lights: [PointLightUniform; MAX_POINT_LIGHTS],
    /// x: active point lights, y: normal mapping enabled.
    pub counts: [u32; 4],
}

/// Per-entity values, written into one dynamic-offset slot per draw.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniform {
    pub model: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub color: [f32; 4],
    /// x: shininess, y: mesh has a normal map.
    pub params: [f32; 4],
}

impl DrawUniform {
    pub fn new(model: Mat4, color: [f32; 4], shininess: f32, has_normal_map: bool) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: normal_matrix(model).to_cols_array_2d(),
            color,
            params: [shininess, if has_normal_map { 1.0 } else { 0.0 }, 0.0, 0.0],
        }
    }
}

/// Inverse transpose of the model matrix; identity for degenerate models.
pub fn normal_matrix(model: Mat4) -> Mat4 {
    if model.determinant().abs() < 1e-8 {
        return Mat4::IDENTITY;
    }
    model.inverse().transpose()
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlurParams {
    /// Unit step along the blur axis, in texels.
    pub direction: [f32; 2],
    pub texel_size: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CompositeParams {
    pub exposure: f32,
    pub bloom: u32,
    pub tone_mapping: u32,
    pub gamma: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<StaticBlock>(), 224);
        assert_eq!(std::mem::size_of::<PointLightUniform>(), 80);
        assert_eq!(std::mem::size_of::<FrameUniform>(), 64 + 16 + 320 + 16);
        assert_eq!(std::mem::size_of::<DrawUniform>(), 160);
        assert_eq!(std::mem::size_of::<CompositeParams>(), 16);
    }

    #[test]
    fn latest_value_per_tag_wins() {
        let mut statics = StaticUniforms::default();
        assert!(statics.set(StaticUniform::BloomThreshold(1.0)));
        assert!(statics.set(StaticUniform::Projection(Mat4::IDENTITY)));
        assert!(statics.set(StaticUniform::BloomThreshold(0.7)));
        assert_eq!(statics.len(), 2);
        assert_eq!(
            statics.get(StaticTag::BloomThreshold),
            Some(&StaticUniform::BloomThreshold(0.7))
        );
    }

    #[test]
    fn identical_value_reports_no_change() {
        let mut statics = StaticUniforms::default();
        statics.set(StaticUniform::BloomThreshold(1.0));
        assert!(!statics.set(StaticUniform::BloomThreshold(1.0)));
    }

    #[test]
    fn replay_restores_every_recorded_value() {
        let projection = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0);
        let light_space = Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.1, 10.0);
        let mut statics = StaticUniforms::default();
        statics.set(StaticUniform::Projection(projection));
        statics.set(StaticUniform::LightSpace(light_space));
        statics.set(StaticUniform::DirectionalLight {
            direction: Vec3::new(0.0, -2.0, 0.0),
            ambient: Vec3::splat(0.1),
            diffuse: Vec3::splat(0.5),
            specular: Vec3::ONE,
        });
        statics.set(StaticUniform::ShadowFilter {
            texel_offset: 0.001,
            window_side: 3,
            bias: 0.005,
        });

        let block = statics.replay();
        assert_eq!(block.projection, projection.to_cols_array_2d());
        assert_eq!(block.light_space, light_space.to_cols_array_2d());
        assert_eq!(block.dir_light_direction, [0.0, -1.0, 0.0, 0.0]);
        assert_eq!(block.shadow_params, [0.001, 3.0, 0.005, 0.0]);
        // Nothing recorded for bloom: default stays.
        assert_eq!(block.bloom_params[0], 1.0);
    }

    #[test]
    fn replay_is_independent_of_recording_order() {
        let mut a = StaticUniforms::default();
        a.set(StaticUniform::BloomThreshold(0.5));
        a.set(StaticUniform::LightSpace(Mat4::from_scale(Vec3::splat(2.0))));
        let mut b = StaticUniforms::default();
        b.set(StaticUniform::LightSpace(Mat4::from_scale(Vec3::splat(2.0))));
        b.set(StaticUniform::BloomThreshold(0.5));
        assert_eq!(a.replay(), b.replay());
    }

    #[test]
    fn shadow_window_side_is_at_least_one() {
        let mut block = StaticBlock::default();
        StaticUniform::ShadowFilter {
            texel_offset: 0.0,
            window_side: 0,
            bias: 0.0,
        }
        .apply(&mut block);
        assert_eq!(block.shadow_params[1], 1.0);
    }

    #[test]
    fn projection_reaches_every_scene_program() {
        for kind in [ShaderKind::Lit, ShaderKind::Light, ShaderKind::Outline, ShaderKind::Skybox] {
            assert!(StaticTag::Projection.consumers().contains(&kind));
        }
        assert!(StaticTag::LightSpace.consumers().contains(&ShaderKind::Shadow));
        assert!(!StaticTag::Projection.consumers().contains(&ShaderKind::Blur));
    }

    #[test]
    fn normal_matrix_handles_degenerate_scale() {
        assert_eq!(normal_matrix(Mat4::from_scale(Vec3::ZERO)), Mat4::IDENTITY);
        let m = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = normal_matrix(m);
        assert!((n.x_axis.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn draw_uniform_flags_normal_map() {
        let d = DrawUniform::new(Mat4::IDENTITY, [1.0; 4], 32.0, true);
        assert_eq!(d.params, [32.0, 1.0, 0.0, 0.0]);
    }
}
