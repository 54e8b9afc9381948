//! Builders for the entity shapes the viewer places in a scene.

use glam::{Mat4, Vec3};

use crate::entity::{
    ComponentMask, EntityHandle, EntityStore, LightEmitter, MeshId, Renderable, Transform,
};
use crate::shader_kind::ShaderKind;

/// Lit, textured mesh (cube or plane). Texture coordinate scaling for planes
/// is baked into the mesh, so both shapes share this path.
pub fn spawn_textured_mesh(
    store: &mut EntityStore,
    mesh: MeshId,
    transform: Mat4,
    shininess: f32,
    shadow_caster: bool,
) -> Option<EntityHandle> {
    let mut mask = ComponentMask::TRANSFORM | ComponentMask::RENDERABLE;
    if shadow_caster {
        mask |= ComponentMask::SHADOW_CASTER;
    }
    let handle = store.create(mask)?;
    store.insert_transform(handle, Transform { matrix: transform });
    store.insert_renderable(
        handle,
        Renderable {
            mesh,
            shader: ShaderKind::Lit,
            shininess,
        },
    );
    Some(handle)
}

/// Point light drawn as a small cube at its position.
pub fn spawn_point_light(
    store: &mut EntityStore,
    mesh: MeshId,
    light: LightEmitter,
    marker_scale: f32,
) -> Option<EntityHandle> {
    let handle = store.create(
        ComponentMask::TRANSFORM | ComponentMask::RENDERABLE | ComponentMask::LIGHT_EMITTER,
    )?;
    store.insert_transform(
        handle,
        Transform::from_translation_scale(light.position, Vec3::splat(marker_scale)),
    );
    store.insert_renderable(
        handle,
        Renderable {
            mesh,
            shader: light.shader,
            shininess: 0.0,
        },
    );
    store.insert_light_emitter(handle, light);
    Some(handle)
}

/// Skybox: renderable only, it follows the camera so it has no transform.
pub fn spawn_skybox(store: &mut EntityStore, mesh: MeshId) -> Option<EntityHandle> {
    let handle = store.create(ComponentMask::RENDERABLE)?;
    store.insert_renderable(
        handle,
        Renderable {
            mesh,
            shader: ShaderKind::Skybox,
            shininess: 0.0,
        },
    );
    Some(handle)
}

/// Keeps a light's marker transform in step with its position after edits.
pub fn sync_light_marker(store: &mut EntityStore, handle: EntityHandle) {
    let Some(position) = store.light_emitter(handle).map(|l| l.position) else {
        return;
    };
    if let Some(transform) = store.transform_mut(handle) {
        let (scale, rotation, _) = transform.matrix.to_scale_rotation_translation();
        transform.matrix = Mat4::from_scale_rotation_translation(scale, rotation, position);
    }
}
