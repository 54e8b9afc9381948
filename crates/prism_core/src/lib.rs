pub mod camera;
pub mod config;
pub mod entity;
pub mod input;
pub mod perf;
pub mod scheduler;
pub mod settings;
pub mod shader_kind;
pub mod spawn;
pub mod time;
