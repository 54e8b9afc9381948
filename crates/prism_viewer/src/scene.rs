//! Scene description: textures by name, the objects placed in the world and
//! the initial camera/selection. Loaded from JSON, with a built-in fallback.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use prism_render::TextureSource;

#[derive(Debug, Deserialize, Clone)]
pub struct SceneFile {
    pub scene_id: String,
    #[serde(default)]
    pub textures: Vec<SceneTexture>,
    #[serde(default)]
    pub cubes: Vec<SceneObject>,
    #[serde(default)]
    pub planes: Vec<ScenePlane>,
    #[serde(default)]
    pub point_lights: Vec<ScenePointLight>,
    #[serde(default)]
    pub directional_light: Option<SceneDirectionalLight>,
    /// Texture names for the +X, -X, +Y, -Y, +Z, -Z faces.
    #[serde(default)]
    pub skybox: Option<Vec<String>>,
    #[serde(default)]
    pub camera: Option<SceneCamera>,
    /// Id of the object outlined at startup.
    #[serde(default)]
    pub selected: Option<String>,
}

/// A named texture, either decoded from a file in the texture directory or
/// a single solid color.
#[derive(Debug, Deserialize, Clone)]
pub struct SceneTexture {
    pub name: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub color: Option<[f32; 4]>,
    /// Color data is stored in sRGB; normal maps and specular masks are not.
    #[serde(default = "default_true")]
    pub srgb: bool,
}

impl SceneTexture {
    pub fn source(&self, texture_dir: &Path) -> TextureSource {
        match (&self.file, self.color) {
            (Some(file), _) => TextureSource::File(texture_dir.join(file)),
            (None, Some(color)) => TextureSource::Color(color),
            (None, None) => TextureSource::Color([1.0, 0.0, 1.0, 1.0]),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SceneMaterial {
    pub diffuse: String,
    pub specular: String,
    #[serde(default)]
    pub normal: Option<String>,
    #[serde(default = "default_shininess")]
    pub shininess: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SceneObject {
    pub id: String,
    pub position: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    /// Euler angles in degrees, applied Y then X then Z.
    #[serde(default)]
    pub rotation_deg: [f32; 3],
    pub material: SceneMaterial,
    #[serde(default = "default_true")]
    pub shadow_caster: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScenePlane {
    #[serde(flatten)]
    pub object: SceneObject,
    /// Texture repeats across the plane.
    #[serde(default = "default_uv_scale")]
    pub uv_scale: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScenePointLight {
    pub id: String,
    pub position: [f32; 3],
    #[serde(default = "default_light_ambient")]
    pub ambient: [f32; 3],
    #[serde(default = "default_light_diffuse")]
    pub diffuse: [f32; 3],
    #[serde(default = "default_light_specular")]
    pub specular: [f32; 3],
    #[serde(default = "default_constant")]
    pub constant: f32,
    #[serde(default = "default_linear")]
    pub linear: f32,
    #[serde(default = "default_quadratic")]
    pub quadratic: f32,
    #[serde(default = "default_marker_scale")]
    pub marker_scale: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SceneDirectionalLight {
    pub direction: [f32; 3],
    #[serde(default = "default_dir_ambient")]
    pub ambient: [f32; 3],
    #[serde(default = "default_dir_diffuse")]
    pub diffuse: [f32; 3],
    #[serde(default = "default_light_specular")]
    pub specular: [f32; 3],
}

#[derive(Debug, Deserialize, Clone)]
pub struct SceneCamera {
    pub position: [f32; 3],
    pub front: [f32; 3],
}

pub fn load_scene_from_path(scene_path: &Path) -> Result<SceneFile, String> {
    let raw = fs::read_to_string(scene_path)
        .map_err(|e| format!("Failed to read scene file {}: {e}", scene_path.display()))?;
    let scene: SceneFile = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse scene JSON {}: {e}", scene_path.display()))?;
    validate_scene(&scene)?;
    Ok(scene)
}

/// The scene at `scene_path`, or the built-in one when the file is missing or
/// does not load.
pub fn load_or_builtin(scene_path: &Path) -> SceneFile {
    if !scene_path.exists() {
        log::warn!(
            "Scene file {} not found, using built-in scene",
            scene_path.display()
        );
        return builtin_scene();
    }
    match load_scene_from_path(scene_path) {
        Ok(scene) => {
            log::info!("Loaded scene '{}' from {}", scene.scene_id, scene_path.display());
            scene
        }
        Err(err) => {
            log::error!("{err}; using built-in scene");
            builtin_scene()
        }
    }
}

fn validate_scene(scene: &SceneFile) -> Result<(), String> {
    let mut texture_names = HashSet::new();
    for texture in &scene.textures {
        if !texture_names.insert(texture.name.as_str()) {
            return Err(format!(
                "Scene validation failed: duplicate texture name '{}'",
                texture.name
            ));
        }
        if texture.file.is_some() == texture.color.is_some() {
            return Err(format!(
                "Scene validation failed: texture '{}' must provide exactly one of 'file' or 'color'",
                texture.name
            ));
        }
    }

    let check_texture = |owner: &str, name: &str| -> Result<(), String> {
        if texture_names.contains(name) {
            Ok(())
        } else {
            Err(format!(
                "Scene validation failed: '{owner}' references unknown texture '{name}'"
            ))
        }
    };

    let mut ids = HashSet::new();
    let objects = scene
        .cubes
        .iter()
        .chain(scene.planes.iter().map(|p| &p.object));
    for object in objects {
        if !ids.insert(object.id.as_str()) {
            return Err(format!(
                "Scene validation failed: duplicate object id '{}'",
                object.id
            ));
        }
        let material = &object.material;
        check_texture(&object.id, &material.diffuse)?;
        check_texture(&object.id, &material.specular)?;
        if let Some(normal) = &material.normal {
            check_texture(&object.id, normal)?;
        }
    }
    for light in &scene.point_lights {
        if !ids.insert(light.id.as_str()) {
            return Err(format!(
                "Scene validation failed: duplicate object id '{}'",
                light.id
            ));
        }
    }

    if let Some(faces) = &scene.skybox {
        if faces.len() != 6 {
            return Err(format!(
                "Scene validation failed: skybox needs 6 faces, got {}",
                faces.len()
            ));
        }
        for face in faces {
            check_texture("skybox", face)?;
        }
    }

    if let Some(camera) = &scene.camera {
        let [x, y, z] = camera.front;
        let horizontal = x * x + z * z;
        if horizontal <= 1e-6 * (horizontal + y * y).max(1e-12) {
            return Err(
                "Scene validation failed: camera front must not be vertical".to_string(),
            );
        }
    }

    if let Some(selected) = &scene.selected {
        if !ids.contains(selected.as_str()) {
            return Err(format!(
                "Scene validation failed: selected object '{selected}' does not exist"
            ));
        }
    }

    Ok(())
}

fn color_texture(name: &str, color: [f32; 4], srgb: bool) -> SceneTexture {
    SceneTexture {
        name: name.to_string(),
        file: None,
        color: Some(color),
        srgb,
    }
}

fn material(diffuse: &str, specular: &str, shininess: f32) -> SceneMaterial {
    SceneMaterial {
        diffuse: diffuse.to_string(),
        specular: specular.to_string(),
        normal: None,
        shininess,
    }
}

fn light(id: &str, position: [f32; 3], diffuse: [f32; 3]) -> ScenePointLight {
    ScenePointLight {
        id: id.to_string(),
        position,
        ambient: default_light_ambient(),
        diffuse,
        specular: default_light_specular(),
        constant: default_constant(),
        linear: default_linear(),
        quadratic: default_quadratic(),
        marker_scale: default_marker_scale(),
    }
}

/// A floor, three crates and two lights, all built from solid colors so no
/// image files are needed.
pub fn builtin_scene() -> SceneFile {
    let cube = |id: &str, position: [f32; 3], scale: f32, yaw: f32| SceneObject {
        id: id.to_string(),
        position,
        scale: [scale; 3],
        rotation_deg: [0.0, yaw, 0.0],
        material: material("crate", "crate_specular", 32.0),
        shadow_caster: true,
    };
    SceneFile {
        scene_id: "builtin".to_string(),
        textures: vec![
            color_texture("crate", [0.72, 0.52, 0.3, 1.0], true),
            color_texture("crate_specular", [0.5, 0.5, 0.5, 1.0], false),
            color_texture("floor", [0.45, 0.45, 0.5, 1.0], true),
            color_texture("floor_specular", [0.1, 0.1, 0.1, 1.0], false),
            color_texture("sky_side", [0.35, 0.5, 0.75, 1.0], true),
            color_texture("sky_top", [0.5, 0.7, 0.95, 1.0], true),
            color_texture("sky_bottom", [0.2, 0.2, 0.25, 1.0], true),
        ],
        cubes: vec![
            cube("crate_a", [0.0, 0.5, 0.0], 1.0, 0.0),
            cube("crate_b", [2.0, 0.75, -1.5], 1.5, 30.0),
            cube("crate_c", [-2.0, 0.35, 1.0], 0.7, -15.0),
        ],
        planes: vec![ScenePlane {
            object: SceneObject {
                id: "floor".to_string(),
                position: [0.0, 0.0, 0.0],
                scale: [25.0, 1.0, 25.0],
                rotation_deg: [0.0; 3],
                material: material("floor", "floor_specular", 8.0),
                shadow_caster: false,
            },
            uv_scale: 25.0,
        }],
        point_lights: vec![
            light("lamp_warm", [1.5, 2.0, 1.5], [1.0, 0.75, 0.45]),
            light("lamp_cool", [-2.5, 1.5, -2.0], [0.4, 0.6, 1.0]),
        ],
        directional_light: Some(SceneDirectionalLight {
            direction: [-0.4, -1.0, -0.3],
            ambient: default_dir_ambient(),
            diffuse: default_dir_diffuse(),
            specular: default_light_specular(),
        }),
        skybox: Some(
            ["sky_side", "sky_side", "sky_top", "sky_bottom", "sky_side", "sky_side"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ),
        camera: Some(SceneCamera {
            position: [0.0, 2.0, 6.0],
            front: [0.0, -0.25, -1.0],
        }),
        selected: Some("crate_a".to_string()),
    }
}

const fn default_true() -> bool {
    true
}

const fn default_shininess() -> f32 {
    32.0
}

const fn default_scale() -> [f32; 3] {
    [1.0; 3]
}

const fn default_uv_scale() -> f32 {
    1.0
}

const fn default_light_ambient() -> [f32; 3] {
    [0.05; 3]
}

const fn default_light_diffuse() -> [f32; 3] {
    [0.8; 3]
}

const fn default_light_specular() -> [f32; 3] {
    [1.0; 3]
}

const fn default_dir_ambient() -> [f32; 3] {
    [0.05; 3]
}

const fn default_dir_diffuse() -> [f32; 3] {
    [0.4; 3]
}

const fn default_constant() -> f32 {
    1.0
}

const fn default_linear() -> f32 {
    0.09
}

const fn default_quadratic() -> f32 {
    0.032
}

const fn default_marker_scale() -> f32 {
    0.2
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file_path(name_hint: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "prism_scene_test_{}_{}_{}.json",
            name_hint,
            std::process::id(),
            nanos
        ))
    }

    fn write_scene_file(path: &Path, body: &str) {
        fs::write(path, body).expect("failed to write temp scene file");
    }

    const VALID: &str = r#"
    {
      "scene_id": "test_scene",
      "textures": [
        { "name": "wood", "color": [0.6, 0.4, 0.2, 1.0] },
        { "name": "wood_spec", "file": "wood_spec.png", "srgb": false }
      ],
      "cubes": [
        { "id": "c1", "position": [0.0, 0.5, 0.0],
          "material": { "diffuse": "wood", "specular": "wood_spec" } }
      ],
      "planes": [
        { "id": "floor", "position": [0.0, 0.0, 0.0], "scale": [10.0, 1.0, 10.0],
          "uv_scale": 10.0, "shadow_caster": false,
          "material": { "diffuse": "wood", "specular": "wood_spec", "shininess": 4.0 } }
      ],
      "point_lights": [ { "id": "l1", "position": [1.0, 2.0, 1.0] } ],
      "selected": "c1"
    }
    "#;

    #[test]
    fn load_scene_from_path_parses_valid_scene() {
        let path = temp_file_path("valid");
        write_scene_file(&path, VALID);

        let scene = load_scene_from_path(&path).expect("scene should parse");
        assert_eq!(scene.scene_id, "test_scene");
        assert_eq!(scene.cubes.len(), 1);
        assert_eq!(scene.cubes[0].scale, [1.0; 3]);
        assert!(scene.cubes[0].shadow_caster);
        assert_eq!(scene.cubes[0].material.shininess, 32.0);
        assert_eq!(scene.planes[0].object.id, "floor");
        assert_eq!(scene.planes[0].uv_scale, 10.0);
        assert!(!scene.planes[0].object.shadow_caster);
        assert_eq!(scene.point_lights[0].linear, 0.09);
        assert!(!scene.textures[1].srgb);
        assert_eq!(scene.selected.as_deref(), Some("c1"));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn duplicate_ids_are_rejected_across_object_kinds() {
        let path = temp_file_path("dup");
        write_scene_file(&path, &VALID.replace(r#""id": "l1""#, r#""id": "floor""#));

        let err = load_scene_from_path(&path).unwrap_err();
        assert!(err.contains("duplicate object id 'floor'"), "{err}");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn unknown_texture_reference_is_rejected() {
        let path = temp_file_path("texref");
        write_scene_file(
            &path,
            &VALID.replacen(r#""diffuse": "wood""#, r#""diffuse": "stone""#, 1),
        );

        let err = load_scene_from_path(&path).unwrap_err();
        assert!(err.contains("unknown texture 'stone'"), "{err}");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_selected_object_is_rejected() {
        let path = temp_file_path("selected");
        write_scene_file(&path, &VALID.replace(r#""selected": "c1""#, r#""selected": "nope""#));

        let err = load_scene_from_path(&path).unwrap_err();
        assert!(err.contains("'nope' does not exist"), "{err}");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn parse_error_names_the_file() {
        let path = temp_file_path("broken");
        write_scene_file(&path, "{ not json");

        let err = load_scene_from_path(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse scene JSON"), "{err}");
        assert!(err.contains(&path.display().to_string()));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let path = temp_file_path("missing");
        let scene = load_or_builtin(&path);
        assert_eq!(scene.scene_id, "builtin");
    }

    #[test]
    fn builtin_scene_passes_validation() {
        let scene = builtin_scene();
        validate_scene(&scene).expect("built-in scene must be valid");
        assert!(scene.point_lights.len() <= 4);
    }

    #[test]
    fn texture_source_resolves_against_texture_dir() {
        let scene = builtin_scene();
        let dir = Path::new("assets/textures");
        assert_eq!(
            scene.textures[0].source(dir),
            TextureSource::Color([0.72, 0.52, 0.3, 1.0])
        );
        let file = SceneTexture {
            name: "brick".to_string(),
            file: Some("brick.png".to_string()),
            color: None,
            srgb: true,
        };
        assert_eq!(file.source(dir), TextureSource::File(dir.join("brick.png")));
    }

    #[test]
    fn vertical_camera_front_is_rejected() {
        let mut scene = builtin_scene();
        scene.camera = Some(SceneCamera {
            position: [0.0, 5.0, 0.0],
            front: [0.0, -1.0, 0.0],
        });
        assert!(validate_scene(&scene).is_err());
    }
}
