//! Owns every GPU resource of the scene and encodes a [`FramePlan`].
//!
//! Per frame the caller runs [`Renderer::prepare`] (uniform uploads), then
//! [`Renderer::encode`] into its own command encoder. The overlay and present
//! steps of the plan stay with the caller, which owns the UI and the surface
//! texture. Shader recompilation and target rebuilds happen only between
//! frames.

use std::path::Path;

use glam::{Mat4, Vec3};
use prism_core::camera::Camera;
use prism_core::entity::{EntityHandle, EntityStore, LightEmitter, MeshId};
use prism_core::settings::RenderSettings;
use prism_core::shader_kind::ShaderKind;
use wgpu::util::DeviceExt;

use crate::bloom::BloomChain;
use crate::camera::build_frame_uniform;
use crate::composite::CompositePass;
use crate::draw::{DrawBuffer, DrawSlots};
use crate::gpu_context::GpuContext;
use crate::hdr::HdrTarget;
use crate::lighting::DirectionalLight;
use crate::mesh::{GpuMesh, MeshData, MeshTable};
use crate::pipelines::{PipelineFactory, STENCIL_STAMP};
use crate::plan::{DrawLists, FramePlan, MainStep, PassKind};
use crate::shader::{ShaderError, ShaderLibrary};
use crate::shadow_map::ShadowMap;
use crate::texture::{Cubemap, Pixels, Texture, TextureId, TextureSource, TextureTable};
use crate::uniforms::{DrawUniform, FrameUniform, StaticUniform};

/// Constant depth bias applied in the PCF comparison.
const SHADOW_BIAS: f32 = 0.005;
const FLAT_NORMAL: [f32; 4] = [0.5, 0.5, 1.0, 1.0];

/// Textures a lit mesh samples. A mesh without a normal map gets a flat one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    pub diffuse: TextureId,
    pub specular: TextureId,
    pub normal: Option<TextureId>,
}

/// Model matrix of the enlarged outline copy, scaled about the object origin.
pub fn outline_model(model: Mat4, scale: f32) -> Mat4 {
    model * Mat4::from_scale(Vec3::splat(scale))
}

/// Color a light's marker geometry is drawn with.
pub fn light_marker_color(light: &LightEmitter) -> [f32; 4] {
    light.diffuse.extend(1.0).to_array()
}

fn uses_program_group(kind: ShaderKind) -> bool {
    kind.is_scene_pass() || kind.is_depth_only()
}

struct Skybox {
    cubemap: Cubemap,
    bind_group: wgpu::BindGroup,
}

pub struct Renderer {
    factory: PipelineFactory,
    library: ShaderLibrary,
    frame_buffer: wgpu::Buffer,
    /// Group 0 of each scene program, indexed by `ShaderKind as usize`.
    program_groups: Vec<Option<wgpu::BindGroup>>,
    draws: DrawBuffer,
    shadow: ShadowMap,
    hdr: HdrTarget,
    bloom: BloomChain,
    composite: CompositePass,
    meshes: MeshTable,
    textures: TextureTable,
    white: Texture,
    flat_normal: Texture,
    skybox: Option<Skybox>,
    material_sampler: wgpu::Sampler,
    post_sampler: wgpu::Sampler,
    directional: DirectionalLight,
    size: (u32, u32),
}

impl Renderer {
    /// Compiles every program and allocates the frame targets. A shader that
    /// fails here is returned to the caller; there is nothing to fall back to.
    pub fn new(
        gpu: &GpuContext,
        shader_dir: &Path,
        shadow_map_size: u32,
        settings: &RenderSettings,
        entity_capacity: usize,
    ) -> Result<Self, ShaderError> {
        let device = &gpu.device;
        let sample_count = settings.sample_count();
        let factory = PipelineFactory::new(device, gpu.surface_format, sample_count);
        let library = ShaderLibrary::load_all(device, &factory, shader_dir)?;

        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame Uniform"),
            contents: bytemuck::bytes_of(&<FrameUniform as bytemuck::Zeroable>::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let program_groups = ShaderKind::ALL
            .iter()
            .map(|&kind| {
                uses_program_group(kind).then(|| {
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(&format!("{kind} Program Bind Group")),
                        layout: &factory.layouts.program,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: library.program(kind).static_buffer().as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: frame_buffer.as_entire_binding(),
                            },
                        ],
                    })
                })
            })
            .collect();

        let draws = DrawBuffer::new(device, &factory.layouts.draw, entity_capacity);
        let shadow = ShadowMap::create(device, shadow_map_size);
        let hdr = HdrTarget::create(device, gpu.size.0, gpu.size.1, sample_count);

        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let post_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Post Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bloom = BloomChain::new(device, &factory.layouts.blur, &post_sampler, &hdr);
        let composite = CompositePass::new(
            device,
            &factory.layouts.composite,
            &factory.layouts.depth_debug,
            &library.program(ShaderKind::Composite).slots,
            &library.program(ShaderKind::DepthDebug).slots,
            &post_sampler,
            &hdr,
            &shadow,
        );

        let white = Texture::from_pixels(device, &gpu.queue, "White", &Pixels::solid([1.0; 4]), false);
        let flat_normal = Texture::from_pixels(
            device,
            &gpu.queue,
            "Flat Normal",
            &Pixels::solid(FLAT_NORMAL),
            false,
        );

        let mut renderer = Self {
            factory,
            library,
            frame_buffer,
            program_groups,
            draws,
            shadow,
            hdr,
            bloom,
            composite,
            meshes: MeshTable::new(),
            textures: TextureTable::default(),
            white,
            flat_normal,
            skybox: None,
            material_sampler,
            post_sampler,
            directional: DirectionalLight::default(),
            size: gpu.size,
        };
        renderer.set_directional_light(&gpu.queue, DirectionalLight::default());
        renderer.apply_settings(device, &gpu.queue, settings);
        Ok(renderer)
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn sample_count(&self) -> u32 {
        self.factory.sample_count
    }

    pub fn library(&self) -> &ShaderLibrary {
        &self.library
    }

    pub fn directional_light(&self) -> &DirectionalLight {
        &self.directional
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn add_texture(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        name: &str,
        source: &TextureSource,
        srgb: bool,
    ) -> TextureId {
        let texture = Texture::load(device, queue, name, source, srgb);
        self.textures.insert(name, texture)
    }

    pub fn texture_id(&self, name: &str) -> Option<TextureId> {
        self.textures.id(name)
    }

    fn material_group(
        &self,
        device: &wgpu::Device,
        label: &str,
        diffuse: &Texture,
        specular: &Texture,
        normal: &Texture,
    ) -> wgpu::BindGroup {
        let slots = &self.library.program(ShaderKind::Lit).slots;
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.factory.layouts.material,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: slots.binding("material.texture_diffuse1"),
                    resource: wgpu::BindingResource::TextureView(&diffuse.view),
                },
                wgpu::BindGroupEntry {
                    binding: slots.binding("material.texture_specular1"),
                    resource: wgpu::BindingResource::TextureView(&specular.view),
                },
                wgpu::BindGroupEntry {
                    binding: slots.binding("material.texture_normal1"),
                    resource: wgpu::BindingResource::TextureView(&normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.material_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: slots.binding("texture_shadow_map"),
                    resource: wgpu::BindingResource::TextureView(&self.shadow.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&self.shadow.compare_sampler),
                },
            ],
        })
    }

    /// Uploads a lit mesh. Both color textures must already be loaded; a
    /// missing one is a scene authoring bug.
    pub fn create_textured_mesh(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        data: &MeshData,
        material: Material,
    ) -> MeshId {
        let loaded = |id: TextureId, what: &str| match self.textures.get(id) {
            Some(t) => t,
            None => panic!("{label}: {what} texture {id:?} is not loaded"),
        };
        let diffuse = loaded(material.diffuse, "diffuse");
        let specular = loaded(material.specular, "specular");
        let normal = match material.normal {
            Some(id) => loaded(id, "normal"),
            None => &self.flat_normal,
        };
        let group = self.material_group(device, &format!("{label} Material"), diffuse, specular, normal);
        let mesh = GpuMesh::upload(device, label, data, group, material.normal.is_some());
        self.meshes.insert(mesh)
    }

    /// Uploads a mesh drawn by programs that do not sample a material, such
    /// as light markers and the skybox cube.
    pub fn create_plain_mesh(&mut self, device: &wgpu::Device, label: &str, data: &MeshData) -> MeshId {
        let group = self.material_group(
            device,
            &format!("{label} Material"),
            &self.white,
            &self.white,
            &self.flat_normal,
        );
        let mesh = GpuMesh::upload(device, label, data, group, false);
        self.meshes.insert(mesh)
    }

    pub fn set_skybox(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, faces: &[TextureSource; 6]) {
        if let Some(old) = self.skybox.take() {
            old.cubemap.destroy();
        }
        let cubemap = Cubemap::load(device, queue, faces);
        let slots = &self.library.program(ShaderKind::Skybox).slots;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Skybox Bind Group"),
            layout: &self.factory.layouts.skybox,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: slots.binding("skybox"),
                    resource: wgpu::BindingResource::TextureView(&cubemap.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.post_sampler),
                },
            ],
        });
        self.skybox = Some(Skybox { cubemap, bind_group });
    }

    pub fn set_projection(&mut self, queue: &wgpu::Queue, projection: Mat4) {
        self.library
            .broadcast_static(queue, StaticUniform::Projection(projection));
    }

    pub fn set_directional_light(&mut self, queue: &wgpu::Queue, light: DirectionalLight) {
        self.directional = light;
        self.library.broadcast_static(
            queue,
            StaticUniform::DirectionalLight {
                direction: light.direction,
                ambient: light.ambient,
                diffuse: light.diffuse,
                specular: light.specular,
            },
        );
        self.library
            .broadcast_static(queue, StaticUniform::LightSpace(light.light_space_matrix()));
    }

    /// Pushes settings-driven statics and post parameters. A changed sample
    /// count rebuilds the scene targets and pipelines.
    pub fn apply_settings(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, settings: &RenderSettings) {
        self.library.broadcast_static(
            queue,
            StaticUniform::ShadowFilter {
                texel_offset: settings.shadow_texel_offset,
                window_side: settings.pcf_window_side,
                bias: SHADOW_BIAS,
            },
        );
        self.library
            .broadcast_static(queue, StaticUniform::BloomThreshold(settings.bloom_threshold));
        self.composite.update(queue, settings);
        if settings.sample_count() != self.factory.sample_count {
            self.set_sample_count(device, queue, settings.sample_count());
        }
    }

    fn recreate_targets(&mut self, device: &wgpu::Device) {
        self.composite.destroy();
        self.bloom.destroy();
        self.hdr.destroy();
        self.hdr = HdrTarget::create(device, self.size.0, self.size.1, self.factory.sample_count);
        self.bloom = BloomChain::new(device, &self.factory.layouts.blur, &self.post_sampler, &self.hdr);
        self.composite = CompositePass::new(
            device,
            &self.factory.layouts.composite,
            &self.factory.layouts.depth_debug,
            &self.library.program(ShaderKind::Composite).slots,
            &self.library.program(ShaderKind::DepthDebug).slots,
            &self.post_sampler,
            &self.hdr,
            &self.shadow,
        );
    }

    /// Recreates the size-dependent targets and reapplies the projection to
    /// every program that reads it. The caller pushes fresh composite
    /// parameters on the next [`Renderer::apply_settings`].
    pub fn resize(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, width: u32, height: u32, projection: Mat4) {
        if width == 0 || height == 0 || (width, height) == self.size {
            return;
        }
        self.size = (width, height);
        self.recreate_targets(device);
        self.set_projection(queue, projection);
        log::info!("Render targets resized to {width}x{height}");
    }

    pub fn set_sample_count(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, sample_count: u32) {
        if sample_count == self.factory.sample_count {
            return;
        }
        self.factory.sample_count = sample_count;
        self.recreate_targets(device);
        self.library.rebuild_all(device, queue, &self.factory);
        log::info!("Multisampling set to {sample_count}x");
    }

    /// Recompiles the programs named by changed files. Returns the ones that
    /// were rebuilt; failures keep the previous program.
    pub fn handle_file_changes<'a>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        file_names: impl IntoIterator<Item = &'a str>,
    ) -> Vec<ShaderKind> {
        self.library
            .handle_file_changes(device, queue, &self.factory, file_names)
    }

    /// Recompiles every program from disk; failures are logged per program.
    pub fn recompile_all(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Vec<ShaderKind> {
        self.handle_file_changes(device, queue, ShaderKind::ALL.iter().map(|k| k.file_name()))
    }

    fn draw_uniform(&self, store: &EntityStore, handle: EntityHandle) -> Option<DrawUniform> {
        let transform = store.transform(handle)?;
        let renderable = store.renderable(handle)?;
        let has_normal_map = self
            .meshes
            .get(renderable.mesh)
            .is_some_and(|m| m.has_normal_map);
        let color = store
            .light_emitter(handle)
            .map(light_marker_color)
            .unwrap_or([1.0; 4]);
        Some(DrawUniform::new(
            transform.matrix,
            color,
            renderable.shininess,
            has_normal_map,
        ))
    }

    /// Uploads the frame uniform, every per-draw slot the lists use and the
    /// settings-driven statics.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        camera: &Camera,
        lag_offset: f32,
        store: &EntityStore,
        settings: &RenderSettings,
        lists: &DrawLists,
    ) {
        self.apply_settings(device, queue, settings);

        let frame = build_frame_uniform(camera, lag_offset, store, settings);
        queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&frame));

        let slots = self.draws.slots;
        for &handle in lists.lights.iter().chain(&lists.opaque) {
            if let Some(uniform) = self.draw_uniform(store, handle) {
                self.draws.write(slots.entity(handle.index()), &uniform);
            }
        }
        if let Some(handle) = lists.outline {
            if let Some(transform) = store.transform(handle) {
                let [r, g, b] = settings.outline_color;
                let uniform = DrawUniform::new(
                    outline_model(transform.matrix, settings.outline_scale),
                    [r, g, b, 1.0],
                    0.0,
                    false,
                );
                self.draws.write(slots.outline(), &uniform);
            }
        }
        if lists.skybox.is_some() {
            self.draws
                .write(slots.skybox(), &DrawUniform::new(Mat4::IDENTITY, [1.0; 4], 0.0, false));
        }
        self.draws.upload(queue);
    }

    fn draw_mesh(&self, pass: &mut wgpu::RenderPass<'_>, kind: ShaderKind, slot: usize, mesh_id: MeshId) {
        let Some(mesh) = self.meshes.get(mesh_id) else {
            log::trace!("Skipping draw of unknown mesh {mesh_id:?}");
            return;
        };
        let Some(program_group) = &self.program_groups[kind as usize] else {
            log::warn!("{kind} cannot draw scene geometry");
            return;
        };
        pass.set_pipeline(self.library.pipeline(kind));
        pass.set_bind_group(0, program_group, &[]);
        pass.set_bind_group(1, self.draws.bind_group(), &[DrawSlots::offset(slot)]);
        match kind {
            ShaderKind::Lit => pass.set_bind_group(2, &mesh.material, &[]),
            ShaderKind::Skybox => match &self.skybox {
                Some(skybox) => pass.set_bind_group(2, &skybox.bind_group, &[]),
                None => return,
            },
            _ => {}
        }
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count, 0, 0..1);
    }

    fn draw_entities(&self, pass: &mut wgpu::RenderPass<'_>, store: &EntityStore, handles: &[EntityHandle]) {
        for &handle in handles {
            if let Some(r) = store.renderable(handle) {
                self.draw_mesh(pass, r.shader, self.draws.slots.entity(handle.index()), r.mesh);
            }
        }
    }

    fn encode_shadow(&self, encoder: &mut wgpu::CommandEncoder, store: &EntityStore, lists: &DrawLists) {
        let mut pass = self.shadow.begin_pass(encoder);
        for &handle in &lists.shadow_casters {
            if let Some(r) = store.renderable(handle) {
                self.draw_mesh(
                    &mut pass,
                    ShaderKind::Shadow,
                    self.draws.slots.entity(handle.index()),
                    r.mesh,
                );
            }
        }
    }

    fn encode_main(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        store: &EntityStore,
        plan: &FramePlan,
        lists: &DrawLists,
    ) {
        let mut pass = self.hdr.begin_main_pass(encoder);
        pass.set_stencil_reference(STENCIL_STAMP);
        for step in &plan.main_steps {
            match step {
                MainStep::Lights => self.draw_entities(&mut pass, store, &lists.lights),
                MainStep::Renderables => self.draw_entities(&mut pass, store, &lists.opaque),
                MainStep::Outline => {
                    let mesh = lists
                        .outline
                        .and_then(|h| store.renderable(h))
                        .map(|r| r.mesh);
                    if let Some(mesh) = mesh {
                        self.draw_mesh(&mut pass, ShaderKind::Outline, self.draws.slots.outline(), mesh);
                    }
                }
                MainStep::Skybox => {
                    if let Some(r) = lists.skybox.and_then(|h| store.renderable(h)) {
                        self.draw_mesh(&mut pass, ShaderKind::Skybox, self.draws.slots.skybox(), r.mesh);
                    }
                }
            }
        }
    }

    /// Encodes the GPU passes of `plan` in order. The composite pass writes
    /// `surface_view`; everything before it stays in off-screen targets.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
        store: &EntityStore,
        plan: &FramePlan,
        lists: &DrawLists,
    ) {
        for pass in &plan.passes {
            match *pass {
                PassKind::Shadow => self.encode_shadow(encoder, store, lists),
                PassKind::Main => self.encode_main(encoder, store, plan, lists),
                PassKind::Bloom { iterations } => {
                    self.bloom
                        .encode(encoder, self.library.pipeline(ShaderKind::Blur), &self.hdr, iterations)
                }
                PassKind::Composite { shadow_debug } => self.composite.encode(
                    encoder,
                    surface_view,
                    self.size,
                    self.library.pipeline(ShaderKind::Composite),
                    self.library.pipeline(ShaderKind::DepthDebug),
                    plan.bloom_iterations(),
                    shadow_debug,
                ),
                PassKind::Overlay | PassKind::Present => {}
            }
        }
    }

    /// Releases every GPU object explicitly. The renderer must not be used
    /// afterwards.
    pub fn destroy(&mut self) {
        self.composite.destroy();
        self.bloom.destroy();
        self.hdr.destroy();
        self.shadow.destroy();
        self.draws.destroy();
        self.frame_buffer.destroy();
        for mesh in self.meshes.iter() {
            mesh.destroy();
        }
        self.textures.destroy_all();
        self.white.destroy();
        self.flat_normal.destroy();
        if let Some(skybox) = self.skybox.take() {
            skybox.cubemap.destroy();
        }
        log::info!("Renderer resources released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_scales_about_object_origin() {
        let model = Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
        let m = outline_model(model, 1.04);
        assert!((m.transform_point3(Vec3::ZERO) - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-6);
        let corner = m.transform_point3(Vec3::splat(0.5));
        assert!((corner.x - (3.0 + 0.52)).abs() < 1e-5);
    }

    #[test]
    fn marker_color_is_light_diffuse() {
        let light = LightEmitter {
            diffuse: Vec3::new(2.0, 1.0, 0.5),
            ..LightEmitter::default()
        };
        assert_eq!(light_marker_color(&light), [2.0, 1.0, 0.5, 1.0]);
    }

    #[test]
    fn scene_and_shadow_programs_get_program_groups() {
        for &kind in ShaderKind::ALL {
            let expected = !matches!(
                kind,
                ShaderKind::Blur | ShaderKind::Composite | ShaderKind::DepthDebug
            );
            assert_eq!(uses_program_group(kind), expected, "{kind}");
        }
    }
}
