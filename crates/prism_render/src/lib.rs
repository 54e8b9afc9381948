pub mod bloom;
pub mod camera;
pub mod composite;
pub mod draw;
pub mod gpu_context;
pub mod hdr;
pub mod lighting;
pub mod mesh;
pub mod pipelines;
pub mod plan;
pub mod renderer;
pub mod shader;
pub mod shadow_map;
pub mod texture;
pub mod uniforms;
pub mod vertex;

pub use gpu_context::{GpuContext, SurfaceRecovery};
pub use lighting::DirectionalLight;
pub use mesh::{unit_cube, unit_plane, MeshData};
pub use plan::{DrawLists, FramePlan, PassKind};
pub use renderer::{Material, Renderer};
pub use shader::ShaderError;
pub use texture::{TextureId, TextureSource};
pub use vertex::MeshVertex;
