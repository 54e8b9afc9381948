//! Scene lighting inputs: the single directional light and its shadow
//! projection, plus packing of point lights for the frame uniform.

use glam::{Mat4, Vec3};
use prism_core::entity::{ComponentMask, EntityStore, LightEmitter};

use crate::uniforms::{PointLightUniform, MAX_POINT_LIGHTS};

/// Distance from the origin the shadow camera is placed along `-direction`.
const LIGHT_DISTANCE: f32 = 30.0;
const LIGHT_NEAR: f32 = 0.1;
const LIGHT_FAR: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    /// Half-width of the orthographic shadow volume.
    pub shadow_extent: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.4, -1.0, -0.3),
            ambient: Vec3::splat(0.05),
            diffuse: Vec3::splat(0.4),
            specular: Vec3::splat(0.5),
            shadow_extent: 20.0,
        }
    }
}

impl DirectionalLight {
    /// Orthographic light-space transform looking at the origin.
    pub fn light_space_matrix(&self) -> Mat4 {
        let dir = self.direction.normalize();
        let light_pos = -dir * LIGHT_DISTANCE;
        let up = if dir.dot(Vec3::Y).abs() > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(light_pos, Vec3::ZERO, up);
        let e = self.shadow_extent;
        let proj = Mat4::orthographic_rh(-e, e, -e, e, LIGHT_NEAR, LIGHT_FAR);
        proj * view
    }
}

impl From<&LightEmitter> for PointLightUniform {
    fn from(light: &LightEmitter) -> Self {
        Self {
            position: light.position.extend(1.0).to_array(),
            ambient: light.ambient.extend(0.0).to_array(),
            diffuse: light.diffuse.extend(0.0).to_array(),
            specular: light.specular.extend(0.0).to_array(),
            attenuation: [light.constant, light.linear, light.quadratic, 0.0],
        }
    }
}

/// The first `MAX_POINT_LIGHTS` emitters by handle order. Returns the packed
/// array and how many entries are live.
pub fn pack_point_lights(store: &EntityStore) -> ([PointLightUniform; MAX_POINT_LIGHTS], u32) {
    let mut lights = [PointLightUniform::default(); MAX_POINT_LIGHTS];
    let mut count = 0;
    for handle in store.iter_with(ComponentMask::LIGHT_EMITTER) {
        let Some(light) = store.light_emitter(handle) else {
            continue;
        };
        if count == MAX_POINT_LIGHTS {
            log::trace!("Ignoring point light {handle}: limit is {MAX_POINT_LIGHTS}");
            continue;
        }
        lights[count] = PointLightUniform::from(light);
        count += 1;
    }
    (lights, count as u32)
}
