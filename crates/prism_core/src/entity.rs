//! Fixed-capacity entity table.
//!
//! Every slot has a component mask and one row in each component array. A
//! component's row is meaningful only while the slot is live and its bit is
//! set; accessors enforce that by returning `None` otherwise. Handles carry
//! the slot generation so a handle kept past `destroy` is detected instead of
//! silently aliasing whatever entity reuses the slot.

use std::ops::{BitOr, BitOrAssign};

use glam::{Mat4, Vec3};

use crate::shader_kind::ShaderKind;

pub const MAX_ENTITIES: usize = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentMask(u32);

impl ComponentMask {
    pub const NONE: Self = Self(0);
    pub const TRANSFORM: Self = Self(1 << 0);
    pub const RENDERABLE: Self = Self(1 << 1);
    pub const LIGHT_EMITTER: Self = Self(1 << 2);
    pub const SHADOW_CASTER: Self = Self(1 << 3);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ComponentMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ComponentMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Transform,
    Renderable,
    LightEmitter,
    ShadowCaster,
}

impl ComponentKind {
    pub const ALL: &'static [ComponentKind] = &[
        ComponentKind::Transform,
        ComponentKind::Renderable,
        ComponentKind::LightEmitter,
        ComponentKind::ShadowCaster,
    ];

    pub const fn mask(self) -> ComponentMask {
        match self {
            Self::Transform => ComponentMask::TRANSFORM,
            Self::Renderable => ComponentMask::RENDERABLE,
            Self::LightEmitter => ComponentMask::LIGHT_EMITTER,
            Self::ShadowCaster => ComponentMask::SHADOW_CASTER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    index: u32,
    generation: u32,
}

impl EntityHandle {
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Index into the renderer's mesh table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub matrix: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: Mat4::IDENTITY,
        }
    }
}

impl Transform {
    pub fn from_translation_scale(translation: Vec3, scale: Vec3) -> Self {
        Self {
            matrix: Mat4::from_translation(translation) * Mat4::from_scale(scale),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Renderable {
    pub mesh: MeshId,
    pub shader: ShaderKind,
    pub shininess: f32,
}

impl Default for Renderable {
    fn default() -> Self {
        Self {
            mesh: MeshId::default(),
            shader: ShaderKind::Lit,
            shininess: 32.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightEmitter {
    pub position: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
    /// Program that draws the light's own marker geometry.
    pub shader: ShaderKind,
}

impl Default for LightEmitter {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            ambient: Vec3::splat(0.05),
            diffuse: Vec3::splat(0.8),
            specular: Vec3::ONE,
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
            shader: ShaderKind::Light,
        }
    }
}

pub struct EntityStore {
    masks: Vec<ComponentMask>,
    generations: Vec<u32>,
    transforms: Vec<Transform>,
    renderables: Vec<Renderable>,
    light_emitters: Vec<LightEmitter>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENTITIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity <= u32::MAX as usize);
        Self {
            masks: vec![ComponentMask::NONE; capacity],
            generations: vec![0; capacity],
            transforms: vec![Transform::default(); capacity],
            renderables: vec![Renderable::default(); capacity],
            light_emitters: vec![LightEmitter::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.masks.len()
    }

    pub fn len(&self) -> usize {
        self.masks.iter().filter(|m| !m.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claims the lowest free slot. Returns `None` when the table is full.
    ///
    /// Component rows of the claimed slot are reset so nothing written by a
    /// previous occupant is visible.
    pub fn create(&mut self, mask: ComponentMask) -> Option<EntityHandle> {
        assert!(!mask.is_empty(), "entity created with an empty component mask");
        let Some(index) = self.masks.iter().position(|m| m.is_empty()) else {
            log::error!("Cannot create more entities (capacity {})", self.capacity());
            return None;
        };
        self.masks[index] = mask;
        self.transforms[index] = Transform::default();
        self.renderables[index] = Renderable::default();
        self.light_emitters[index] = LightEmitter::default();
        Some(EntityHandle {
            index: index as u32,
            generation: self.generations[index],
        })
    }

    pub fn destroy(&mut self, handle: EntityHandle) {
        let index = handle.index();
        assert!(
            index < self.capacity(),
            "destroy: handle {handle} out of range (capacity {})",
            self.capacity()
        );
        assert!(self.is_alive(handle), "destroy: handle {handle} is not live");
        self.masks[index] = ComponentMask::NONE;
        self.generations[index] = self.generations[index].wrapping_add(1);
    }

    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        let index = handle.index();
        index < self.capacity()
            && !self.masks[index].is_empty()
            && self.generations[index] == handle.generation
    }

    pub fn mask(&self, handle: EntityHandle) -> Option<ComponentMask> {
        self.is_alive(handle).then(|| self.masks[handle.index()])
    }

    pub fn has(&self, handle: EntityHandle, kind: ComponentKind) -> bool {
        self.has_all(handle, kind.mask())
    }

    pub fn has_all(&self, handle: EntityHandle, mask: ComponentMask) -> bool {
        self.mask(handle).is_some_and(|m| m.contains(mask))
    }

    /// Live handle currently occupying `index`, if any.
    pub fn handle_at(&self, index: usize) -> Option<EntityHandle> {
        let mask = *self.masks.get(index)?;
        (!mask.is_empty()).then(|| EntityHandle {
            index: index as u32,
            generation: self.generations[index],
        })
    }

    /// Live handles whose mask contains every bit of `mask`, ascending by index.
    pub fn iter_with(&self, mask: ComponentMask) -> impl Iterator<Item = EntityHandle> + '_ {
        self.masks
            .iter()
            .enumerate()
            .filter(move |(_, m)| !m.is_empty() && m.contains(mask))
            .map(|(index, _)| EntityHandle {
                index: index as u32,
                generation: self.generations[index],
            })
    }

    fn component_index(&self, handle: EntityHandle, kind: ComponentKind) -> Option<usize> {
        self.has(handle, kind).then(|| handle.index())
    }

    fn assert_declared(&self, handle: EntityHandle, kind: ComponentKind) -> usize {
        match self.component_index(handle, kind) {
            Some(index) => index,
            None => panic!("entity {handle} is not live or does not declare {kind:?}"),
        }
    }

    pub fn insert_transform(&mut self, handle: EntityHandle, transform: Transform) {
        let index = self.assert_declared(handle, ComponentKind::Transform);
        self.transforms[index] = transform;
    }

    pub fn insert_renderable(&mut self, handle: EntityHandle, renderable: Renderable) {
        let index = self.assert_declared(handle, ComponentKind::Renderable);
        self.renderables[index] = renderable;
    }

    pub fn insert_light_emitter(&mut self, handle: EntityHandle, light: LightEmitter) {
        let index = self.assert_declared(handle, ComponentKind::LightEmitter);
        self.light_emitters[index] = light;
    }

    pub fn transform(&self, handle: EntityHandle) -> Option<&Transform> {
        let index = self.component_index(handle, ComponentKind::Transform)?;
        Some(&self.transforms[index])
    }

    pub fn transform_mut(&mut self, handle: EntityHandle) -> Option<&mut Transform> {
        let index = self.component_index(handle, ComponentKind::Transform)?;
        Some(&mut self.transforms[index])
    }

    pub fn renderable(&self, handle: EntityHandle) -> Option<&Renderable> {
        let index = self.component_index(handle, ComponentKind::Renderable)?;
        Some(&self.renderables[index])
    }

    pub fn renderable_mut(&mut self, handle: EntityHandle) -> Option<&mut Renderable> {
        let index = self.component_index(handle, ComponentKind::Renderable)?;
        Some(&mut self.renderables[index])
    }

    pub fn light_emitter(&self, handle: EntityHandle) -> Option<&LightEmitter> {
        let index = self.component_index(handle, ComponentKind::LightEmitter)?;
        Some(&self.light_emitters[index])
    }

    pub fn light_emitter_mut(&mut self, handle: EntityHandle) -> Option<&mut LightEmitter> {
        let index = self.component_index(handle, ComponentKind::LightEmitter)?;
        Some(&mut self.light_emitters[index])
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAWABLE: ComponentMask = ComponentMask(
        ComponentMask::TRANSFORM.bits() | ComponentMask::RENDERABLE.bits(),
    );

    #[test]
    fn test_capacity_exhaustion_returns_none() {
        let mut store = EntityStore::with_capacity(3);
        let handles: Vec<_> = (0..3).map(|_| store.create(DRAWABLE).unwrap()).collect();
        assert!(store.create(DRAWABLE).is_none());
        assert_eq!(store.len(), 3);
        // Earlier entities are intact and destroyable in any order.
        store.destroy(handles[1]);
        store.destroy(handles[0]);
        store.destroy(handles[2]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_has_matches_create_mask() {
        let mut store = EntityStore::new();
        let h = store
            .create(ComponentMask::TRANSFORM | ComponentMask::SHADOW_CASTER)
            .unwrap();
        assert!(store.has(h, ComponentKind::Transform));
        assert!(store.has(h, ComponentKind::ShadowCaster));
        assert!(!store.has(h, ComponentKind::Renderable));
        assert!(!store.has(h, ComponentKind::LightEmitter));

        store.destroy(h);
        for &kind in ComponentKind::ALL {
            assert!(!store.has(h, kind));
        }
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut store = EntityStore::new();
        let old = store.create(DRAWABLE).unwrap();
        store.destroy(old);
        let new = store.create(DRAWABLE).unwrap();
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(!store.is_alive(old));
        assert!(store.transform(old).is_none());
        assert!(store.transform(new).is_some());
    }

    #[test]
    fn test_reused_slot_does_not_expose_stale_components() {
        let mut store = EntityStore::new();
        let old = store
            .create(ComponentMask::TRANSFORM | ComponentMask::LIGHT_EMITTER)
            .unwrap();
        store.insert_transform(old, Transform::from_translation_scale(Vec3::X, Vec3::ONE));
        store.insert_light_emitter(
            old,
            LightEmitter {
                diffuse: Vec3::new(1.0, 0.0, 0.0),
                ..LightEmitter::default()
            },
        );
        store.destroy(old);

        let new = store
            .create(ComponentMask::TRANSFORM | ComponentMask::LIGHT_EMITTER)
            .unwrap();
        assert_eq!(store.transform(new).unwrap().matrix, Mat4::IDENTITY);
        assert_eq!(store.light_emitter(new).unwrap().diffuse, Vec3::splat(0.8));
    }

    #[test]
    fn test_accessor_requires_mask_bit() {
        let mut store = EntityStore::new();
        let h = store.create(ComponentMask::TRANSFORM).unwrap();
        assert!(store.renderable(h).is_none());
        assert!(store.light_emitter_mut(h).is_none());
    }

    #[test]
    #[should_panic(expected = "does not declare")]
    fn test_insert_undeclared_component_panics() {
        let mut store = EntityStore::new();
        let h = store.create(ComponentMask::TRANSFORM).unwrap();
        store.insert_renderable(h, Renderable::default());
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn test_double_destroy_panics() {
        let mut store = EntityStore::new();
        let h = store.create(DRAWABLE).unwrap();
        store.destroy(h);
        store.destroy(h);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_destroy_out_of_range_panics() {
        let mut big = EntityStore::with_capacity(8);
        let mut small = EntityStore::with_capacity(2);
        let mut last = None;
        for _ in 0..8 {
            last = big.create(DRAWABLE);
        }
        small.destroy(last.unwrap());
    }

    #[test]
    fn test_iter_with_is_ascending_and_filtered() {
        let mut store = EntityStore::new();
        let a = store.create(DRAWABLE).unwrap();
        let _light = store
            .create(ComponentMask::TRANSFORM | ComponentMask::LIGHT_EMITTER)
            .unwrap();
        let c = store.create(DRAWABLE | ComponentMask::SHADOW_CASTER).unwrap();
        let drawn: Vec<_> = store.iter_with(DRAWABLE).collect();
        assert_eq!(drawn, vec![a, c]);
        let casters: Vec<_> = store.iter_with(ComponentMask::SHADOW_CASTER).collect();
        assert_eq!(casters, vec![c]);
    }

    #[test]
    fn test_handle_at_reports_live_slots() {
        let mut store = EntityStore::with_capacity(2);
        let h = store.create(DRAWABLE).unwrap();
        assert_eq!(store.handle_at(0), Some(h));
        assert_eq!(store.handle_at(1), None);
        assert_eq!(store.handle_at(7), None);
    }

    #[test]
    fn test_capacity_four_scenario() {
        let mut store = EntityStore::with_capacity(4);
        let first = store.create(DRAWABLE).unwrap();
        assert!(!store.has(first, ComponentKind::LightEmitter));
        store.destroy(first);

        let handles: Vec<_> = (0..4).map(|_| store.create(DRAWABLE)).collect();
        assert!(handles.iter().all(Option::is_some));
        assert!(store.create(DRAWABLE).is_none());
    }
}
