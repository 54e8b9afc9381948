//! Scene inspector rendered via egui on top of the composited frame.
//!
//! egui needs the frame split into phases because `egui_wgpu::Renderer::render()`
//! takes a `RenderPass<'static>` while `begin_render_pass` borrows the encoder:
//!
//!   1. `prepare()` -- run the UI, apply edits, produce tessellated primitives
//!   2. `upload()`  -- upload textures and update GPU buffers
//!   3. `paint()`   -- render into a pass created with `forget_lifetime()`
//!   4. `cleanup()` -- free textures egui no longer references
//!
//! Edits go straight into the `EntityStore` and `RenderSettings` passed to
//! `prepare()`, which the caller runs after the simulation ticks and before
//! the frame is encoded.

use glam::{Mat4, Vec3};
use prism_core::entity::{ComponentKind, ComponentMask, EntityHandle, EntityStore};
use prism_core::perf::{PerfRegions, Region};
use prism_core::settings::{InspectorState, RenderSettings, Toggle};
use prism_core::spawn::sync_light_marker;
use prism_core::time::TimeState;
use winit::window::Window;

#[derive(Debug, Clone, Default)]
pub struct OverlayStats {
    pub mesh_count: u32,
    pub sample_count: u32,
    /// Successful rebuilds of each shader program since startup.
    pub shader_generations: Vec<(String, u32)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayActions {
    /// User asked for every shader program to be rebuilt from disk.
    pub recompile_shaders: bool,
    /// The multisampling toggle flipped this frame.
    pub sample_count_changed: bool,
}

/// Short description of an entity for the list: handle plus component tags.
pub fn entity_label(store: &EntityStore, handle: EntityHandle) -> String {
    let Some(mask) = store.mask(handle) else {
        return format!("{handle} (dead)");
    };
    let tags: Vec<&str> = ComponentKind::ALL
        .iter()
        .filter(|k| mask.contains(k.mask()))
        .map(|k| match k {
            ComponentKind::Transform => "T",
            ComponentKind::Renderable => "R",
            ComponentKind::LightEmitter => "L",
            ComponentKind::ShadowCaster => "S",
        })
        .collect();
    format!("{handle} [{}]", tags.join(""))
}

/// Replaces translation and scale of `matrix`, keeping its rotation.
pub fn with_translation_scale(matrix: Mat4, translation: Vec3, scale: Vec3) -> Mat4 {
    let (_, rotation, _) = matrix.to_scale_rotation_translation();
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

fn drag_vec3(ui: &mut egui::Ui, label: &str, value: &mut Vec3, speed: f64) -> bool {
    ui.horizontal(|ui| {
        ui.label(label);
        let mut changed = false;
        changed |= ui.add(egui::DragValue::new(&mut value.x).speed(speed)).changed();
        changed |= ui.add(egui::DragValue::new(&mut value.y).speed(speed)).changed();
        changed |= ui.add(egui::DragValue::new(&mut value.z).speed(speed)).changed();
        changed
    })
    .inner
}

fn color_vec3(ui: &mut egui::Ui, label: &str, value: &mut Vec3) -> bool {
    ui.horizontal(|ui| {
        ui.label(label);
        let mut rgb = value.to_array();
        let changed = ui.color_edit_button_rgb(&mut rgb).changed();
        if changed {
            *value = Vec3::from(rgb);
        }
        changed
    })
    .inner
}

fn settings_section(ui: &mut egui::Ui, settings: &mut RenderSettings) {
    for &toggle in Toggle::ALL {
        ui.checkbox(settings.flag_mut(toggle), toggle.label());
    }
    ui.add(egui::Slider::new(&mut settings.exposure, 0.05..=8.0).text("Exposure"));
    ui.add(egui::Slider::new(&mut settings.bloom_threshold, 0.1..=4.0).text("Bloom threshold"));
    ui.add(egui::Slider::new(&mut settings.bloom_iterations, 0..=20).text("Blur passes"));
    ui.add(
        egui::Slider::new(&mut settings.shadow_texel_offset, 0.0..=0.005)
            .text("Shadow texel offset"),
    );
    ui.add(egui::Slider::new(&mut settings.pcf_window_side, 1..=7).text("PCF window"));
    ui.add(egui::Slider::new(&mut settings.outline_scale, 1.0..=1.2).text("Outline scale"));
    ui.horizontal(|ui| {
        ui.label("Outline color");
        ui.color_edit_button_rgb(&mut settings.outline_color);
    });
}

fn entity_list(ui: &mut egui::Ui, store: &EntityStore, inspector: &mut InspectorState) {
    egui::ScrollArea::vertical()
        .max_height(160.0)
        .show(ui, |ui| {
            if ui
                .selectable_label(inspector.selected.is_none(), "(none)")
                .clicked()
            {
                inspector.selected = None;
            }
            for handle in store.iter_with(ComponentMask::NONE) {
                let is_selected = inspector.selected == Some(handle);
                if ui
                    .selectable_label(is_selected, entity_label(store, handle))
                    .clicked()
                {
                    inspector.selected = Some(handle);
                    log::debug!("Selected {handle}");
                }
            }
        });
}

fn selected_entity(ui: &mut egui::Ui, store: &mut EntityStore, handle: EntityHandle) {
    if !store.is_alive(handle) {
        ui.label("Selected entity no longer exists");
        return;
    }
    let mut moved_to = None;
    if let Some(transform) = store.transform_mut(handle) {
        let (scale, _, translation) = transform.matrix.to_scale_rotation_translation();
        let mut new_translation = translation;
        let mut new_scale = scale;
        let moved = drag_vec3(ui, "Translation", &mut new_translation, 0.05);
        let scaled = drag_vec3(ui, "Scale", &mut new_scale, 0.01);
        if moved || scaled {
            transform.matrix = with_translation_scale(transform.matrix, new_translation, new_scale);
        }
        if moved {
            moved_to = Some(new_translation);
        }
    }
    // A light's marker and its emitter share one position.
    if let (Some(position), Some(light)) = (moved_to, store.light_emitter_mut(handle)) {
        light.position = position;
    }
    if let Some(renderable) = store.renderable_mut(handle) {
        ui.label(format!("Shader: {}", renderable.shader));
        ui.add(egui::Slider::new(&mut renderable.shininess, 1.0..=256.0).text("Shininess"));
    }
    let mut light_moved = false;
    if let Some(light) = store.light_emitter_mut(handle) {
        ui.separator();
        light_moved = drag_vec3(ui, "Light position", &mut light.position, 0.05);
        color_vec3(ui, "Ambient", &mut light.ambient);
        color_vec3(ui, "Diffuse", &mut light.diffuse);
        color_vec3(ui, "Specular", &mut light.specular);
        ui.add(egui::Slider::new(&mut light.constant, 0.0..=2.0).text("Constant"));
        ui.add(egui::Slider::new(&mut light.linear, 0.0..=1.0).text("Linear"));
        ui.add(egui::Slider::new(&mut light.quadratic, 0.0..=1.0).text("Quadratic"));
    }
    if light_moved {
        sync_light_marker(store, handle);
    }
}

pub struct Inspector {
    pub egui_ctx: egui::Context,
    pub egui_winit_state: egui_winit::State,
    pub egui_renderer: egui_wgpu::Renderer,
}

impl Inspector {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat, window: &Window) -> Self {
        let egui_ctx = egui::Context::default();
        let egui_winit_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            window,
            None,
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(device, surface_format, None, 1, false);

        Self {
            egui_ctx,
            egui_winit_state,
            egui_renderer,
        }
    }

    pub fn handle_window_event(&mut self, window: &Window, event: &winit::event::WindowEvent) -> bool {
        let response = self.egui_winit_state.on_window_event(window, event);
        response.consumed
    }

    pub fn toggle(&mut self, inspector: &mut InspectorState) {
        inspector.overlay_visible = !inspector.overlay_visible;
        log::info!(
            "Inspector: {}",
            if inspector.overlay_visible { "ON" } else { "OFF" }
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        &mut self,
        window: &Window,
        time: &TimeState,
        perf: &PerfRegions,
        stats: &OverlayStats,
        settings: &mut RenderSettings,
        inspector: &mut InspectorState,
        store: &mut EntityStore,
    ) -> (Vec<egui::ClippedPrimitive>, egui::TexturesDelta, OverlayActions) {
        let mut actions = OverlayActions::default();
        let sample_count_before = settings.sample_count();
        let raw_input = self.egui_winit_state.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            if !inspector.overlay_visible {
                return;
            }
            egui::Window::new("Inspector")
                .default_pos([10.0, 10.0])
                .show(ctx, |ui| {
                    ui.label(format!("FPS: {:.1}", time.smoothed_fps));
                    ui.label(format!("Frame time: {:.2} ms", time.smoothed_frame_time_ms));
                    ui.label(format!("Ticks this frame: {}", time.ticks_this_frame));
                    ui.label(format!("Total ticks: {}", time.tick_count));
                    ui.label(format!("Lag offset: {:.3}", time.lag_offset));
                    ui.label(format!("Frame: {}", time.frame_count));

                    ui.separator();
                    for &region in Region::ALL {
                        let text = match perf.average_ns(region) {
                            Some(ns) => format!("{}: {:.3} ms", region.label(), ns as f64 / 1e6),
                            None => format!("{}: --", region.label()),
                        };
                        ui.label(text);
                    }
                    ui.label(format!(
                        "Entities: {}/{}  Meshes: {}  MSAA: {}x",
                        store.len(),
                        store.capacity(),
                        stats.mesh_count,
                        stats.sample_count
                    ));

                    egui::CollapsingHeader::new("Shaders").show(ui, |ui| {
                        for (name, generation) in &stats.shader_generations {
                            ui.label(format!("{name}: generation {generation}"));
                        }
                        if ui.button("Recompile all").clicked() {
                            actions.recompile_shaders = true;
                        }
                    });

                    egui::CollapsingHeader::new("Rendering")
                        .default_open(true)
                        .show(ui, |ui| settings_section(ui, settings));

                    egui::CollapsingHeader::new("Entities")
                        .default_open(true)
                        .show(ui, |ui| {
                            entity_list(ui, store, inspector);
                            if let Some(handle) = inspector.selected {
                                ui.separator();
                                selected_entity(ui, store, handle);
                            }
                        });
                });
        });

        self.egui_winit_state
            .handle_platform_output(window, full_output.platform_output);

        let primitives = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        actions.sample_count_changed = settings.sample_count() != sample_count_before;
        (primitives, full_output.textures_delta, actions)
    }

    /// Upload textures and update buffers. Call before creating the egui render pass.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        primitives: &[egui::ClippedPrimitive],
        textures_delta: &egui::TexturesDelta,
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        for (id, image_delta) in &textures_delta.set {
            self.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.egui_renderer
            .update_buffers(device, queue, encoder, primitives, screen_descriptor);
    }

    /// Render into an existing render pass. Call after `upload()`.
    pub fn paint(
        &self,
        render_pass: &mut wgpu::RenderPass<'static>,
        primitives: &[egui::ClippedPrimitive],
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        self.egui_renderer
            .render(render_pass, primitives, screen_descriptor);
    }

    pub fn cleanup(&mut self, textures_delta: &egui::TexturesDelta) {
        for id in &textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}
