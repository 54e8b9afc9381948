//! Prism viewer -- main loop and application entry point.
//!
//! winit drives the event loop via `ApplicationHandler`. Each `RedrawRequested`:
//!
//!   1. `begin_frame()` -- measure wall-clock delta, feed the accumulator
//!   2. `run_fixed_steps()` -- zero or more fixed camera ticks
//!   3. inspector UI runs and writes its edits back into the scene
//!   4. collect draw lists, build the frame plan, encode and present
//!   5. drain the shader change queue and recompile between frames
//!   6. clear edge-triggered input that this frame consumed
//!
//! Steps 5 and 6 run even when step 4 has no surface texture to draw into.

mod scene;

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat, Vec3};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow as LoopControl, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use prism_core::camera::{Camera, CameraInput};
use prism_core::config::{load_or_default, ViewerConfig};
use prism_core::entity::{EntityHandle, EntityStore, LightEmitter};
use prism_core::input::{InputState, Key};
use prism_core::perf::{PerfRegions, Region};
use prism_core::scheduler::run_fixed_steps;
use prism_core::settings::{InspectorState, RenderSettings};
use prism_core::shader_kind::ShaderKind;
use prism_core::spawn::{spawn_point_light, spawn_skybox, spawn_textured_mesh};
use prism_core::time::TimeState;
use prism_devtools::{Inspector, OverlayStats};
use prism_platform::change_queue::ChangeQueue;
use prism_platform::watcher::FileWatcher;
use prism_platform::window::PlatformConfig;
use prism_render::{
    unit_cube, unit_plane, DirectionalLight, DrawLists, FramePlan, GpuContext, Material, PassKind,
    Renderer, TextureSource,
};
use scene::{load_or_builtin, SceneFile, SceneObject};

const CONFIG_PATH: &str = "assets/viewer.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Continue,
    Quit,
}

/// All mutable viewer state. Constructed lazily in `ApplicationHandler::resumed`
/// once the window and GPU surface are available.
struct EngineState {
    window: Arc<Window>,
    gpu: GpuContext,
    renderer: Renderer,
    time: TimeState,
    input: InputState,
    camera: Camera,
    store: EntityStore,
    settings: RenderSettings,
    inspector_state: InspectorState,
    perf: PerfRegions,
    inspector: Inspector,
    change_queue: ChangeQueue,
    watcher: Option<FileWatcher>,
}

impl EngineState {
    fn new(window: Arc<Window>, config: &ViewerConfig) -> Self {
        let gpu = GpuContext::new(window.clone());
        let settings = config.render.clone();
        let mut store = EntityStore::new();

        let mut renderer = Renderer::new(
            &gpu,
            &config.shader_dir,
            config.shadow_map_size,
            &settings,
            store.capacity(),
        )
        .unwrap_or_else(|err| panic!("Failed to build shader programs: {err}"));

        let scene = load_or_builtin(&config.scene_path);
        let selected = populate_scene(&gpu, &mut renderer, &mut store, &scene, &config.texture_dir);

        let (position, front) = match &scene.camera {
            Some(c) => (Vec3::from(c.position), Vec3::from(c.front)),
            None => (Vec3::new(0.0, 2.0, 6.0), Vec3::new(0.0, -0.25, -1.0)),
        };
        let camera = Camera::new(
            position,
            front,
            Vec3::Y,
            config.fov_degrees,
            gpu.aspect_ratio(),
            config.move_speed,
            config.rotation_speed,
        );
        renderer.set_projection(&gpu.queue, camera.projection());

        let inspector = Inspector::new(&gpu.device, gpu.surface_format, &window);

        let change_queue = ChangeQueue::new();
        let watcher = match FileWatcher::start(&config.shader_dir, change_queue.clone()) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                log::error!("Shader hot reload disabled: {err}");
                None
            }
        };

        Self {
            window,
            gpu,
            renderer,
            time: TimeState::new(config.tick_rate_hz, config.max_frame_seconds),
            input: InputState::new(),
            camera,
            store,
            settings,
            inspector_state: InspectorState {
                overlay_visible: false,
                selected,
            },
            perf: PerfRegions::new(),
            inspector,
            change_queue,
            watcher,
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
        self.camera.set_aspect(width as f32 / height as f32);
        self.renderer.resize(
            &self.gpu.device,
            &self.gpu.queue,
            width,
            height,
            self.camera.projection(),
        );
        log::info!("Resized to {}x{}", width, height);
    }

    fn overlay_stats(&self) -> OverlayStats {
        OverlayStats {
            mesh_count: self.renderer.mesh_count() as u32,
            sample_count: self.renderer.sample_count(),
            shader_generations: ShaderKind::ALL
                .iter()
                .map(|&kind| {
                    (
                        kind.label().to_string(),
                        self.renderer.library().program(kind).generation,
                    )
                })
                .collect(),
        }
    }

    fn redraw(&mut self) -> FrameOutcome {
        if self.gpu.size.0 == 0 || self.gpu.size.1 == 0 {
            return FrameOutcome::Continue;
        }

        // Fixed-step simulation phase.
        self.time.begin_frame();
        let sim_timer = self.perf.begin(Region::Simulation);
        let camera = &mut self.camera;
        let input = &self.input;
        let steps = run_fixed_steps(&mut self.time, &mut |_tick: u64| {
            if input.is_held(Key::Escape) || input.is_held(Key::Q) {
                return ControlFlow::Break(());
            }
            camera.update(&CameraInput::from_input(input));
            ControlFlow::Continue(())
        });
        self.perf.end(sim_timer);
        if steps.stopped {
            log::info!("Quit requested");
            return FrameOutcome::Quit;
        }

        let keys = FrameKeys::read(&self.input, steps.ticks);
        if keys.toggle_overlay {
            self.inspector.toggle(&mut self.inspector_state);
        }
        if keys.recompile_shaders {
            self.renderer
                .recompile_all(&self.gpu.device, &self.gpu.queue);
        }

        self.render(steps.lag_offset);

        // Shader edits land between frames, never mid-pass. Both steps run
        // even when no surface texture was available.
        self.apply_file_changes();
        keys.finish(&mut self.input);
        FrameOutcome::Continue
    }

    /// Render phase. Reads finalized simulation state from this frame.
    fn render(&mut self, lag_offset: f32) {
        let Some((output, view)) = self.gpu.begin_frame() else {
            return;
        };

        let stats = self.overlay_stats();
        let (egui_primitives, egui_textures_delta, overlay_actions) = self.inspector.prepare(
            &self.window,
            &self.time,
            &self.perf,
            &stats,
            &mut self.settings,
            &mut self.inspector_state,
            &mut self.store,
        );
        if overlay_actions.recompile_shaders {
            self.renderer
                .recompile_all(&self.gpu.device, &self.gpu.queue);
        }
        if overlay_actions.sample_count_changed {
            log::info!(
                "Multisampling (inspector): {}",
                if self.settings.multisampling { "ON" } else { "OFF" }
            );
        }

        let render_timer = self.perf.begin(Region::Render);
        let lists = DrawLists::collect(&self.store, &self.inspector_state);
        let plan = FramePlan::build(
            &self.settings,
            &lists,
            self.inspector_state.overlay_visible,
        );
        self.renderer.prepare(
            &self.gpu.device,
            &self.gpu.queue,
            &self.camera,
            lag_offset,
            &self.store,
            &self.settings,
            &lists,
        );

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.gpu.size.0, self.gpu.size.1],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.renderer
            .encode(&mut encoder, &view, &self.store, &plan, &lists);

        // egui textures are uploaded every frame so the font atlas exists
        // before the overlay is first shown.
        self.inspector.upload(
            &self.gpu.device,
            &self.gpu.queue,
            &mut encoder,
            &egui_primitives,
            &egui_textures_delta,
            &screen_descriptor,
        );
        if plan.contains(PassKind::Overlay) {
            let mut egui_pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();

            self.inspector
                .paint(&mut egui_pass, &egui_primitives, &screen_descriptor);
        }
        self.inspector.cleanup(&egui_textures_delta);

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.perf.end(render_timer);

        let present_timer = self.perf.begin(Region::Present);
        output.present();
        self.perf.end(present_timer);
    }

    fn apply_file_changes(&mut self) {
        let changes = self.change_queue.drain();
        let names: Vec<&str> = changes
            .iter()
            .filter(|c| c.is_file_modification())
            .map(|c| c.path_name.as_str())
            .collect();
        if names.is_empty() {
            return;
        }
        let rebuilt =
            self.renderer
                .handle_file_changes(&self.gpu.device, &self.gpu.queue, names.iter().copied());
        log::debug!("File changes {:?} rebuilt {:?}", names, rebuilt);
    }

    fn shutdown(mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
            drop(watcher);
        }
        self.renderer.destroy();
        log::info!("Viewer shut down");
    }
}

/// Edge-triggered viewer keys, read once per frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FrameKeys {
    toggle_overlay: bool,
    recompile_shaders: bool,
    consumed: bool,
}

impl FrameKeys {
    /// Presses only count on frames that ran at least one fixed step.
    fn read(input: &InputState, ticks: u32) -> Self {
        if ticks == 0 {
            return Self::default();
        }
        Self {
            toggle_overlay: input.is_just_pressed(Key::F1),
            recompile_shaders: input.is_just_pressed(Key::R),
            consumed: true,
        }
    }

    /// Clears the transitions this frame acted on. A press on a zero-step
    /// frame stays pending for the next one.
    fn finish(self, input: &mut InputState) {
        if self.consumed {
            input.end_frame();
        }
    }
}

fn object_transform(object: &SceneObject) -> Mat4 {
    let [x, y, z] = object.rotation_deg.map(f32::to_radians);
    Mat4::from_scale_rotation_translation(
        Vec3::from(object.scale),
        Quat::from_euler(EulerRot::YXZ, y, x, z),
        Vec3::from(object.position),
    )
}

/// Uploads the scene's textures and meshes and spawns its entities. Returns
/// the handle of the initially selected object.
fn populate_scene(
    gpu: &GpuContext,
    renderer: &mut Renderer,
    store: &mut EntityStore,
    scene: &SceneFile,
    texture_dir: &Path,
) -> Option<EntityHandle> {
    let device = &gpu.device;
    let queue = &gpu.queue;

    for texture in &scene.textures {
        renderer.add_texture(
            device,
            queue,
            &texture.name,
            &texture.source(texture_dir),
            texture.srgb,
        );
    }
    let resolve_material = |renderer: &Renderer, object: &SceneObject| -> Option<Material> {
        let m = &object.material;
        Some(Material {
            diffuse: renderer.texture_id(&m.diffuse)?,
            specular: renderer.texture_id(&m.specular)?,
            normal: match &m.normal {
                Some(name) => Some(renderer.texture_id(name)?),
                None => None,
            },
        })
    };

    // Objects sharing a shape and material share one mesh.
    let mut meshes = HashMap::new();
    let mut handles = HashMap::new();
    let cube_data = unit_cube();
    let shapes = scene
        .cubes
        .iter()
        .map(|c| (c, None))
        .chain(scene.planes.iter().map(|p| (&p.object, Some(p.uv_scale))));
    for (object, plane_uv) in shapes {
        let Some(material) = resolve_material(renderer, object) else {
            log::error!("Object '{}' references a texture that was not loaded", object.id);
            continue;
        };
        let m = &object.material;
        let key = format!("{plane_uv:?}|{}|{}|{:?}", m.diffuse, m.specular, m.normal);
        let mesh = *meshes.entry(key).or_insert_with(|| match plane_uv {
            Some(uv_scale) => {
                renderer.create_textured_mesh(device, &object.id, &unit_plane(uv_scale), material)
            }
            None => renderer.create_textured_mesh(device, &object.id, &cube_data, material),
        });
        match spawn_textured_mesh(
            store,
            mesh,
            object_transform(object),
            m.shininess,
            object.shadow_caster,
        ) {
            Some(handle) => {
                handles.insert(object.id.as_str(), handle);
            }
            None => log::warn!("Skipping '{}': entity store is full", object.id),
        }
    }

    if !scene.point_lights.is_empty() {
        let marker = renderer.create_plain_mesh(device, "Light Marker", &cube_data);
        for light in &scene.point_lights {
            let emitter = LightEmitter {
                position: Vec3::from(light.position),
                ambient: Vec3::from(light.ambient),
                diffuse: Vec3::from(light.diffuse),
                specular: Vec3::from(light.specular),
                constant: light.constant,
                linear: light.linear,
                quadratic: light.quadratic,
                ..LightEmitter::default()
            };
            match spawn_point_light(store, marker, emitter, light.marker_scale) {
                Some(handle) => {
                    handles.insert(light.id.as_str(), handle);
                }
                None => log::warn!("Skipping light '{}': entity store is full", light.id),
            }
        }
    }

    if let Some(dir) = &scene.directional_light {
        renderer.set_directional_light(
            queue,
            DirectionalLight {
                direction: Vec3::from(dir.direction),
                ambient: Vec3::from(dir.ambient),
                diffuse: Vec3::from(dir.diffuse),
                specular: Vec3::from(dir.specular),
                ..DirectionalLight::default()
            },
        );
    }

    if let Some(faces) = &scene.skybox {
        let source = |name: &String| {
            scene
                .textures
                .iter()
                .find(|t| &t.name == name)
                .map(|t| t.source(texture_dir))
                .unwrap_or(TextureSource::Color([0.0, 0.0, 0.0, 1.0]))
        };
        let faces: [TextureSource; 6] = std::array::from_fn(|i| source(&faces[i]));
        renderer.set_skybox(device, queue, &faces);
        let sky_mesh = renderer.create_plain_mesh(device, "Skybox", &cube_data);
        if spawn_skybox(store, sky_mesh).is_none() {
            log::warn!("Skipping skybox: entity store is full");
        }
    }

    log::info!(
        "Scene '{}' populated: {} entities, {} meshes",
        scene.scene_id,
        store.len(),
        renderer.mesh_count()
    );
    scene
        .selected
        .as_deref()
        .and_then(|id| handles.get(id).copied())
}

struct App {
    config: ViewerConfig,
    state: Option<EngineState>,
}

impl App {
    fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.take() {
            state.shutdown();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let platform = PlatformConfig {
            title: self.config.window_title.clone(),
            width: self.config.window_width,
            height: self.config.window_height,
            ..PlatformConfig::default()
        };
        let window = prism_platform::window::create_window(event_loop, &platform);
        self.state = Some(EngineState::new(window, &self.config));
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let state = match self.state.as_mut() {
            Some(s) => s,
            None => return,
        };

        let egui_consumed = state
            .inspector
            .handle_window_event(&state.window, &event);

        let mut outcome = FrameOutcome::Continue;
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting.");
                outcome = FrameOutcome::Quit;
            }

            WindowEvent::Resized(physical_size) => {
                let w = physical_size.width;
                let h = physical_size.height;
                if w > 0 && h > 0 {
                    state.resize(w, h);
                }
            }

            WindowEvent::Focused(false) => state.input.release_all(),

            WindowEvent::KeyboardInput { event, .. } if !egui_consumed => {
                if let PhysicalKey::Code(key_code) = event.physical_key {
                    if let Some(key) = map_key(key_code) {
                        match event.state {
                            ElementState::Pressed => state.input.key_down(key),
                            ElementState::Released => state.input.key_up(key),
                        }
                    }
                }
            }

            WindowEvent::RedrawRequested => outcome = state.redraw(),

            _ => {}
        }

        if outcome == FrameOutcome::Quit {
            self.shutdown(event_loop);
        }
    }
}

fn map_key(key_code: KeyCode) -> Option<Key> {
    match key_code {
        KeyCode::KeyW => Some(Key::W),
        KeyCode::KeyA => Some(Key::A),
        KeyCode::KeyS => Some(Key::S),
        KeyCode::KeyD => Some(Key::D),
        KeyCode::ArrowUp => Some(Key::Up),
        KeyCode::ArrowDown => Some(Key::Down),
        KeyCode::ArrowLeft => Some(Key::Left),
        KeyCode::ArrowRight => Some(Key::Right),
        KeyCode::Escape => Some(Key::Escape),
        KeyCode::KeyQ => Some(Key::Q),
        KeyCode::F1 => Some(Key::F1),
        KeyCode::KeyR => Some(Key::R),
        _ => None,
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Prism viewer starting...");
    let config = load_or_default(&PathBuf::from(CONFIG_PATH));

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(LoopControl::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app).expect("Event loop error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene::SceneMaterial;

    fn object(rotation_deg: [f32; 3]) -> SceneObject {
        SceneObject {
            id: "o".to_string(),
            position: [1.0, 2.0, 3.0],
            scale: [2.0, 2.0, 2.0],
            rotation_deg,
            material: SceneMaterial {
                diffuse: "d".to_string(),
                specular: "s".to_string(),
                normal: None,
                shininess: 32.0,
            },
            shadow_caster: true,
        }
    }

    #[test]
    fn object_transform_places_scales_and_turns() {
        let m = object_transform(&object([0.0, 90.0, 0.0]));
        let origin = m.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-5);
        // +X rotated 90 degrees about Y points along -Z, then doubled.
        let x = m.transform_vector3(Vec3::X);
        assert!((x - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-5);
    }

    #[test]
    fn overlay_toggle_fires_once_per_press() {
        let mut input = InputState::new();
        input.key_down(Key::F1);

        let held_back = FrameKeys::read(&input, 0);
        assert!(!held_back.toggle_overlay);
        held_back.finish(&mut input);

        let first = FrameKeys::read(&input, 2);
        assert!(first.toggle_overlay);
        assert!(!first.recompile_shaders);
        first.finish(&mut input);

        // Key still held, no new transition.
        let second = FrameKeys::read(&input, 1);
        assert!(!second.toggle_overlay);
        assert!(input.is_held(Key::F1));
    }

    #[test]
    fn recompile_key_fires_once_per_press() {
        let mut input = InputState::new();
        input.key_down(Key::R);
        let first = FrameKeys::read(&input, 1);
        assert!(first.recompile_shaders);
        first.finish(&mut input);

        input.key_up(Key::R);
        input.key_down(Key::R);
        assert!(FrameKeys::read(&input, 1).recompile_shaders);
    }

    #[test]
    fn every_viewer_key_is_mapped() {
        let codes = [
            KeyCode::KeyW,
            KeyCode::KeyA,
            KeyCode::KeyS,
            KeyCode::KeyD,
            KeyCode::ArrowUp,
            KeyCode::ArrowDown,
            KeyCode::ArrowLeft,
            KeyCode::ArrowRight,
            KeyCode::Escape,
            KeyCode::KeyQ,
            KeyCode::F1,
            KeyCode::KeyR,
        ];
        for code in codes {
            assert!(map_key(code).is_some(), "{code:?} unmapped");
        }
        assert_eq!(map_key(KeyCode::Space), None);
    }
}
