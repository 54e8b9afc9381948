//! Shader programs and hot reload.
//!
//! Each [`ShaderKind`] is built from one WGSL file. The file is compiled twice,
//! once per stage, each copy prefixed with a generated header and a stage
//! block, and the two modules are joined into one render pipeline. A failed
//! rebuild leaves the previous pipeline in place.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use prism_core::shader_kind::ShaderKind;
use thiserror::Error;
use wgpu::util::DeviceExt;

use crate::gpu_context::with_validation;
use crate::pipelines::PipelineFactory;
use crate::uniforms::{StaticBlock, StaticUniform, StaticUniforms};

pub const SOURCE_HEADER: &str = "// prism shader v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        }
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("Failed to read shader {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to compile {kind} {stage} stage: {message}")]
    Compile {
        kind: ShaderKind,
        stage: &'static str,
        message: String,
    },
    #[error("Failed to link {kind} program: {message}")]
    Link { kind: ShaderKind, message: String },
}

/// Header, stage block, then the shared file text.
pub fn compose_stage_source(stage: Stage, shared: &str) -> String {
    let (is_vertex, is_fragment) = match stage {
        Stage::Vertex => (true, false),
        Stage::Fragment => (false, true),
    };
    format!(
        "{SOURCE_HEADER}\nconst STAGE_VERTEX: bool = {is_vertex};\nconst STAGE_FRAGMENT: bool = {is_fragment};\n{shared}"
    )
}

/// Named texture slots a program samples, mapped to their bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlots {
    slots: &'static [(&'static str, u32)],
}

impl TextureSlots {
    pub fn for_kind(kind: ShaderKind) -> Self {
        let slots: &'static [(&'static str, u32)] = match kind {
            ShaderKind::Lit => &[
                ("material.texture_diffuse1", 0),
                ("material.texture_specular1", 1),
                ("material.texture_normal1", 2),
                ("texture_shadow_map", 4),
            ],
            ShaderKind::Skybox => &[("skybox", 0)],
            ShaderKind::Blur => &[("image", 0)],
            ShaderKind::Composite => &[("scene", 0), ("bloom_blur", 1)],
            ShaderKind::DepthDebug => &[("depth_map", 0)],
            ShaderKind::Light | ShaderKind::Outline | ShaderKind::Shadow => &[],
        };
        Self { slots }
    }

    /// Binding of a named slot. Asking for a name the program does not
    /// declare is a programming error.
    pub fn binding(&self, name: &str) -> u32 {
        match self.slots.iter().find(|(n, _)| *n == name) {
            Some(&(_, binding)) => binding,
            None => panic!("texture slot {name:?} is not registered"),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Programs named by a batch of changed file names, each once.
pub fn kinds_for_changes<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<ShaderKind> {
    names
        .into_iter()
        .filter_map(|name| {
            let kind = ShaderKind::from_file_name(name);
            if kind.is_none() {
                log::trace!("Ignoring change to {name}");
            }
            kind
        })
        .collect()
}

fn compile_module(
    device: &wgpu::Device,
    kind: ShaderKind,
    stage: Stage,
    shared: &str,
) -> Result<wgpu::ShaderModule, ShaderError> {
    let source = compose_stage_source(stage, shared);
    let label = format!("{kind} {} module", stage.label());
    let (module, error) = with_validation(device, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    });
    match error {
        Some(e) => Err(ShaderError::Compile {
            kind,
            stage: stage.label(),
            message: e.to_string(),
        }),
        None => Ok(module),
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    factory: &PipelineFactory,
    kind: ShaderKind,
    shared: &str,
) -> Result<wgpu::RenderPipeline, ShaderError> {
    let vertex = compile_module(device, kind, Stage::Vertex, shared)?;
    let fragment = if kind.is_depth_only() {
        None
    } else {
        Some(compile_module(device, kind, Stage::Fragment, shared)?)
    };
    let (pipeline, error) = with_validation(device, || {
        factory.create(device, kind, &vertex, fragment.as_ref())
    });
    match error {
        Some(e) => Err(ShaderError::Link {
            kind,
            message: e.to_string(),
        }),
        None => Ok(pipeline),
    }
}

fn read_source(path: &Path) -> Result<String, ShaderError> {
    fs::read_to_string(path).map_err(|source| ShaderError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub struct ShaderProgram {
    pub kind: ShaderKind,
    pub pipeline: wgpu::RenderPipeline,
    pub slots: TextureSlots,
    /// Number of successful rebuilds since startup.
    pub generation: u32,
    source: String,
    statics: StaticUniforms,
    static_buffer: wgpu::Buffer,
}

impl ShaderProgram {
    pub fn static_buffer(&self) -> &wgpu::Buffer {
        &self.static_buffer
    }

    pub fn statics(&self) -> &StaticUniforms {
        &self.statics
    }

    fn upload_statics(&self, queue: &wgpu::Queue) {
        let block: StaticBlock = self.statics.replay();
        queue.write_buffer(&self.static_buffer, 0, bytemuck::bytes_of(&block));
    }
}

/// One program per [`ShaderKind`], indexed in `ShaderKind::ALL` order.
pub struct ShaderLibrary {
    dir: PathBuf,
    programs: Vec<ShaderProgram>,
}

impl ShaderLibrary {
    /// Builds every program. Any failure here is returned so the caller can
    /// abort startup.
    pub fn load_all(
        device: &wgpu::Device,
        factory: &PipelineFactory,
        dir: &Path,
    ) -> Result<Self, ShaderError> {
        let mut programs = Vec::with_capacity(ShaderKind::ALL.len());
        for &kind in ShaderKind::ALL {
            let source = read_source(&dir.join(kind.file_name()))?;
            let pipeline = build_pipeline(device, factory, kind, &source)?;
            let static_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{kind} Static Block")),
                contents: bytemuck::bytes_of(&StaticBlock::default()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            programs.push(ShaderProgram {
                kind,
                pipeline,
                slots: TextureSlots::for_kind(kind),
                generation: 0,
                source,
                statics: StaticUniforms::default(),
                static_buffer,
            });
            log::info!("Compiled shader program {kind}");
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            programs,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn program(&self, kind: ShaderKind) -> &ShaderProgram {
        &self.programs[kind as usize]
    }

    pub fn pipeline(&self, kind: ShaderKind) -> &wgpu::RenderPipeline {
        &self.program(kind).pipeline
    }

    /// Records a static value on `kind` and uploads the block if it changed.
    pub fn set_static(&mut self, queue: &wgpu::Queue, kind: ShaderKind, command: StaticUniform) {
        let program = &mut self.programs[kind as usize];
        if program.statics.set(command) {
            program.upload_statics(queue);
        }
    }

    /// Records `command` on every program that consumes its tag.
    pub fn broadcast_static(&mut self, queue: &wgpu::Queue, command: StaticUniform) {
        for &kind in command.tag().consumers() {
            self.set_static(queue, kind, command);
        }
    }

    /// Re-reads and rebuilds one program from disk. On failure the old
    /// pipeline stays bound.
    pub fn recompile(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        factory: &PipelineFactory,
        kind: ShaderKind,
    ) -> Result<(), ShaderError> {
        let source = read_source(&self.dir.join(kind.file_name()))?;
        let pipeline = build_pipeline(device, factory, kind, &source)?;
        let program = &mut self.programs[kind as usize];
        program.pipeline = pipeline;
        program.source = source;
        program.generation += 1;
        program.upload_statics(queue);
        log::info!("Recompiled shader program {kind} (generation {})", program.generation);
        Ok(())
    }

    /// Rebuilds every pipeline from the last good sources, e.g. after the
    /// sample count changed. Programs that fail keep their old pipeline.
    pub fn rebuild_all(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, factory: &PipelineFactory) {
        for program in &mut self.programs {
            match build_pipeline(device, factory, program.kind, &program.source) {
                Ok(pipeline) => {
                    program.pipeline = pipeline;
                    program.upload_statics(queue);
                }
                Err(e) => log::error!("{e}"),
            }
        }
    }

    /// Recompiles each program named by `file_names`; failures are logged.
    /// Returns the programs that were rebuilt.
    pub fn handle_file_changes<'a>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        factory: &PipelineFactory,
        file_names: impl IntoIterator<Item = &'a str>,
    ) -> Vec<ShaderKind> {
        let mut rebuilt = Vec::new();
        for kind in kinds_for_changes(file_names) {
            match self.recompile(device, queue, factory, kind) {
                Ok(()) => rebuilt.push(kind),
                Err(e) => log::error!("{e}; keeping previous {kind} program"),
            }
        }
        rebuilt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_source_has_three_parts_in_order() {
        let src = compose_stage_source(Stage::Fragment, "fn shared() {}");
        let lines: Vec<_> = src.lines().collect();
        assert_eq!(lines[0], SOURCE_HEADER);
        assert_eq!(lines[1], "const STAGE_VERTEX: bool = false;");
        assert_eq!(lines[2], "const STAGE_FRAGMENT: bool = true;");
        assert_eq!(lines[3], "fn shared() {}");
    }

    #[test]
    fn vertex_stage_flags_vertex() {
        let src = compose_stage_source(Stage::Vertex, "");
        assert!(src.contains("const STAGE_VERTEX: bool = true;"));
        assert!(src.contains("const STAGE_FRAGMENT: bool = false;"));
    }

    #[test]
    fn lit_slots_resolve_by_name() {
        let slots = TextureSlots::for_kind(ShaderKind::Lit);
        assert_eq!(slots.binding("material.texture_diffuse1"), 0);
        assert_eq!(slots.binding("material.texture_normal1"), 2);
        assert_eq!(slots.binding("texture_shadow_map"), 4);
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn unknown_slot_asserts() {
        TextureSlots::for_kind(ShaderKind::Composite).binding("material.texture_diffuse1");
    }

    #[test]
    fn changes_map_to_unique_known_programs() {
        let kinds = kinds_for_changes(["lit.wgsl", "notes.txt", "lit.wgsl", "blur.wgsl"]);
        assert_eq!(
            kinds.into_iter().collect::<Vec<_>>(),
            vec![ShaderKind::Lit, ShaderKind::Blur]
        );
    }

    #[test]
    fn shipped_sources_declare_entry_points() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders");
        for &kind in ShaderKind::ALL {
            let source = read_source(&dir.join(kind.file_name())).expect("shader file should exist");
            assert!(source.contains("fn vs_main"), "{kind}");
            assert_eq!(source.contains("fn fs_main"), !kind.is_depth_only(), "{kind}");
        }
    }

    #[test]
    fn read_error_names_the_path() {
        let path = std::env::temp_dir().join(format!("prism_missing_{}.wgsl", std::process::id()));
        let err = read_source(&path).expect_err("should fail");
        assert!(err.to_string().contains("Failed to read shader"));
        assert!(err.to_string().contains("prism_missing_"));
    }
}
