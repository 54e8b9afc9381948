//! Viewer configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::settings::RenderSettings;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub tick_rate_hz: u32,
    /// Longest frame fed to the accumulator, in seconds.
    pub max_frame_seconds: f64,
    pub shader_dir: PathBuf,
    pub texture_dir: PathBuf,
    pub scene_path: PathBuf,
    pub shadow_map_size: u32,
    pub move_speed: f32,
    pub rotation_speed: f32,
    pub fov_degrees: f32,
    pub render: RenderSettings,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_title: "Prism".to_string(),
            window_width: 1024,
            window_height: 768,
            tick_rate_hz: 60,
            max_frame_seconds: 0.25,
            shader_dir: PathBuf::from("assets/shaders"),
            texture_dir: PathBuf::from("assets/textures"),
            scene_path: PathBuf::from("assets/scenes/demo.json"),
            shadow_map_size: 2048,
            move_speed: 0.05,
            rotation_speed: 0.02,
            fov_degrees: 60.0,
            render: RenderSettings::default(),
        }
    }
}

/// Load the viewer configuration from disk.
pub fn load_viewer_config(path: &Path) -> Result<ViewerConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read viewer config {}: {e}", path.display()))?;
    let config: ViewerConfig = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse viewer config {}: {e}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Uses the file at `path` when it exists, defaults otherwise. A file that
/// exists but fails to load is reported and replaced by defaults.
pub fn load_or_default(path: &Path) -> ViewerConfig {
    if !path.exists() {
        log::info!("No viewer config at {}, using defaults", path.display());
        return ViewerConfig::default();
    }
    match load_viewer_config(path) {
        Ok(config) => {
            log::info!("Loaded viewer config from {}", path.display());
            config
        }
        Err(e) => {
            log::error!("{e}; using defaults");
            ViewerConfig::default()
        }
    }
}

fn validate_config(config: &ViewerConfig) -> Result<(), String> {
    if config.window_width == 0 || config.window_height == 0 {
        return Err(format!(
            "Config validation failed: window size {}x{} is empty",
            config.window_width, config.window_height
        ));
    }
    if config.tick_rate_hz == 0 || config.tick_rate_hz > 1000 {
        return Err(format!(
            "Config validation failed: tick rate {} Hz is out of range",
            config.tick_rate_hz
        ));
    }
    if config.max_frame_seconds <= 0.0 {
        return Err("Config validation failed: max_frame_seconds must be positive".to_string());
    }
    if !config.shadow_map_size.is_power_of_two() {
        return Err(format!(
            "Config validation failed: shadow map size {} is not a power of two",
            config.shadow_map_size
        ));
    }
    if config.render.pcf_window_side == 0 {
        return Err("Config validation failed: PCF window side must be at least 1".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file_path(name_hint: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "prism_config_test_{}_{}_{}.json",
            name_hint,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ViewerConfig::default();
        assert_eq!((config.window_width, config.window_height), (1024, 768));
        assert_eq!(config.tick_rate_hz, 60);
        assert_eq!(config.shadow_map_size, 2048);
        assert!((config.fov_degrees - 60.0).abs() < f32::EPSILON);
        assert_eq!(config.render.bloom_iterations, 10);
    }

    #[test]
    fn partial_file_overrides_named_fields() {
        let path = temp_file_path("partial");
        let json = r#"
        {
          "window_title": "Bench",
          "tick_rate_hz": 120,
          "render": { "multisampling": true }
        }
        "#;
        fs::write(&path, json).expect("write temp file");
        let config = load_viewer_config(&path).expect("should parse");
        assert_eq!(config.window_title, "Bench");
        assert_eq!(config.tick_rate_hz, 120);
        assert!(config.render.multisampling);
        assert_eq!(config.window_width, 1024);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn rejects_non_power_of_two_shadow_map() {
        let path = temp_file_path("shadow_size");
        fs::write(&path, r#"{ "shadow_map_size": 1000 }"#).expect("write temp file");
        let err = load_viewer_config(&path).expect_err("should fail");
        assert!(err.contains("power of two"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn rejects_malformed_json() {
        let path = temp_file_path("malformed");
        fs::write(&path, "{ not json").expect("write temp file");
        let err = load_viewer_config(&path).expect_err("should fail");
        assert!(err.contains("Failed to parse viewer config"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = temp_file_path("missing");
        assert_eq!(load_or_default(&path), ViewerConfig::default());
    }
}
