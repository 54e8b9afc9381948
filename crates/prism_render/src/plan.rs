//! What a frame draws and in which order, decided without touching the GPU.

use prism_core::entity::{ComponentMask, EntityHandle, EntityStore};
use prism_core::settings::{InspectorState, RenderSettings};
use prism_core::shader_kind::ShaderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Shadow,
    Main,
    Bloom { iterations: u32 },
    Composite { shadow_debug: bool },
    Overlay,
    Present,
}

/// Sub-steps of the main pass. They share the depth/stencil attachment, so
/// the order is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainStep {
    Lights,
    Renderables,
    Outline,
    Skybox,
}

/// Entities sorted into the draw lists of one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawLists {
    pub lights: Vec<EntityHandle>,
    pub opaque: Vec<EntityHandle>,
    pub shadow_casters: Vec<EntityHandle>,
    pub skybox: Option<EntityHandle>,
    pub outline: Option<EntityHandle>,
}

impl DrawLists {
    pub fn collect(store: &EntityStore, inspector: &InspectorState) -> Self {
        let drawable = ComponentMask::RENDERABLE | ComponentMask::TRANSFORM;
        let mut lists = Self::default();

        for handle in store.iter_with(ComponentMask::RENDERABLE) {
            let Some(mask) = store.mask(handle) else {
                continue;
            };
            let is_skybox = store
                .renderable(handle)
                .is_some_and(|r| r.shader == ShaderKind::Skybox);
            if is_skybox {
                if lists.skybox.is_none() {
                    lists.skybox = Some(handle);
                } else {
                    log::trace!("Ignoring extra skybox {handle}");
                }
                continue;
            }
            if !mask.contains(drawable) {
                continue;
            }
            if mask.contains(ComponentMask::LIGHT_EMITTER) {
                lists.lights.push(handle);
            } else {
                lists.opaque.push(handle);
            }
            if mask.contains(ComponentMask::SHADOW_CASTER) {
                lists.shadow_casters.push(handle);
            }
        }

        // A stale or invisible selection has nothing to outline.
        lists.outline = inspector.selected.filter(|&h| {
            store.has_all(h, drawable)
                && store
                    .renderable(h)
                    .is_some_and(|r| r.shader != ShaderKind::Skybox)
        });
        lists
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    pub passes: Vec<PassKind>,
    pub main_steps: Vec<MainStep>,
}

impl FramePlan {
    pub fn build(settings: &RenderSettings, lists: &DrawLists, overlay_visible: bool) -> Self {
        let mut passes = vec![PassKind::Shadow, PassKind::Main];
        let iterations = settings.effective_bloom_iterations();
        if iterations > 0 {
            passes.push(PassKind::Bloom { iterations });
        }
        passes.push(PassKind::Composite {
            shadow_debug: settings.shadow_map_debug,
        });
        if overlay_visible {
            passes.push(PassKind::Overlay);
        }
        passes.push(PassKind::Present);

        let mut main_steps = vec![MainStep::Lights, MainStep::Renderables];
        if lists.outline.is_some() {
            main_steps.push(MainStep::Outline);
        }
        if lists.skybox.is_some() {
            main_steps.push(MainStep::Skybox);
        }
        Self { passes, main_steps }
    }

    pub fn bloom_iterations(&self) -> u32 {
        self.passes
            .iter()
            .find_map(|p| match p {
                PassKind::Bloom { iterations } => Some(*iterations),
                _ => None,
            })
            .unwrap_or(0)
    }

    pub fn contains(&self, pass: PassKind) -> bool {
        self.passes.contains(&pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use prism_core::entity::{LightEmitter, MeshId};
    use prism_core::spawn::{spawn_point_light, spawn_skybox, spawn_textured_mesh};

    struct Scene {
        store: EntityStore,
        floor: EntityHandle,
        crate_box: EntityHandle,
        lamp: EntityHandle,
        sky: EntityHandle,
    }

    fn scene() -> Scene {
        let mut store = EntityStore::new();
        let floor = spawn_textured_mesh(&mut store, MeshId(1), Mat4::IDENTITY, 8.0, false).unwrap();
        let crate_box = spawn_textured_mesh(
            &mut store,
            MeshId(0),
            Mat4::from_translation(Vec3::Y),
            32.0,
            true,
        )
        .unwrap();
        let lamp = spawn_point_light(&mut store, MeshId(0), LightEmitter::default(), 0.2).unwrap();
        let sky = spawn_skybox(&mut store, MeshId(0)).unwrap();
        Scene {
            store,
            floor,
            crate_box,
            lamp,
            sky,
        }
    }

    #[test]
    fn entities_land_in_their_lists() {
        let s = scene();
        let lists = DrawLists::collect(&s.store, &InspectorState::default());
        assert_eq!(lists.lights, vec![s.lamp]);
        assert_eq!(lists.opaque, vec![s.floor, s.crate_box]);
        assert_eq!(lists.shadow_casters, vec![s.crate_box]);
        assert_eq!(lists.skybox, Some(s.sky));
        assert_eq!(lists.outline, None);
    }

    #[test]
    fn selection_of_visible_entity_is_outlined() {
        let s = scene();
        let inspector = InspectorState {
            selected: Some(s.crate_box),
            ..InspectorState::default()
        };
        let lists = DrawLists::collect(&s.store, &inspector);
        assert_eq!(lists.outline, Some(s.crate_box));
        let plan = FramePlan::build(&RenderSettings::default(), &lists, false);
        assert_eq!(
            plan.main_steps,
            vec![
                MainStep::Lights,
                MainStep::Renderables,
                MainStep::Outline,
                MainStep::Skybox
            ]
        );
    }

    #[test]
    fn stale_selection_is_skipped() {
        let mut s = scene();
        s.store.destroy(s.crate_box);
        let inspector = InspectorState {
            selected: Some(s.crate_box),
            ..InspectorState::default()
        };
        let lists = DrawLists::collect(&s.store, &inspector);
        assert_eq!(lists.outline, None);
        let plan = FramePlan::build(&RenderSettings::default(), &lists, false);
        assert!(!plan.main_steps.contains(&MainStep::Outline));
    }

    #[test]
    fn skybox_selection_is_skipped() {
        let s = scene();
        let inspector = InspectorState {
            selected: Some(s.sky),
            ..InspectorState::default()
        };
        assert_eq!(DrawLists::collect(&s.store, &inspector).outline, None);
    }

    #[test]
    fn default_plan_orders_every_pass() {
        let s = scene();
        let lists = DrawLists::collect(&s.store, &InspectorState::default());
        let plan = FramePlan::build(&RenderSettings::default(), &lists, true);
        assert_eq!(
            plan.passes,
            vec![
                PassKind::Shadow,
                PassKind::Main,
                PassKind::Bloom { iterations: 10 },
                PassKind::Composite {
                    shadow_debug: false
                },
                PassKind::Overlay,
                PassKind::Present,
            ]
        );
        assert_eq!(plan.bloom_iterations(), 10);
    }

    #[test]
    fn disabled_bloom_drops_the_blur_pass() {
        let settings = RenderSettings {
            bloom: false,
            ..RenderSettings::default()
        };
        let plan = FramePlan::build(&settings, &DrawLists::default(), false);
        assert!(!plan
            .passes
            .iter()
            .any(|p| matches!(p, PassKind::Bloom { .. })));
        assert_eq!(plan.bloom_iterations(), 0);
        assert_eq!(plan.passes.last(), Some(&PassKind::Present));
    }

    #[test]
    fn shadow_debug_flag_reaches_composite() {
        let settings = RenderSettings {
            shadow_map_debug: true,
            ..RenderSettings::default()
        };
        let plan = FramePlan::build(&settings, &DrawLists::default(), false);
        assert!(plan.contains(PassKind::Composite { shadow_debug: true }));
        assert!(!plan.contains(PassKind::Overlay));
    }

    #[test]
    fn empty_scene_still_clears_and_presents() {
        let plan = FramePlan::build(&RenderSettings::default(), &DrawLists::default(), false);
        assert_eq!(plan.main_steps, vec![MainStep::Lights, MainStep::Renderables]);
        assert_eq!(plan.passes[0], PassKind::Shadow);
    }
}
