use prism_core::camera::Camera;
use prism_core::entity::EntityStore;
use prism_core::settings::RenderSettings;

use crate::lighting::pack_point_lights;
use crate::uniforms::FrameUniform;

/// Builds the per-frame uniform. With interpolation off the latest tick is
/// shown as-is.
pub fn build_frame_uniform(
    camera: &Camera,
    lag_offset: f32,
    store: &EntityStore,
    settings: &RenderSettings,
) -> FrameUniform {
    let (view, position) = if settings.interpolation {
        (
            camera.view_matrix(lag_offset),
            camera.interpolated_position(lag_offset),
        )
    } else {
        (camera.current_view_matrix(), camera.current.position)
    };
    let (point_lights, light_count) = pack_point_lights(store);
    FrameUniform {
        view: view.to_cols_array_2d(),
        view_position: position.extend(1.0).to_array(),
        point_lights,
        counts: [light_count, u32::from(settings.normal_mapping), 0, 0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use prism_core::camera::CameraInput;

    fn moved_camera() -> Camera {
        let mut cam = Camera::new(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 60.0, 1.0, 1.0, 0.1);
        cam.update(&CameraInput {
            forward: true,
            ..CameraInput::default()
        });
        cam
    }

    #[test]
    fn interpolation_uses_lag_offset() {
        let cam = moved_camera();
        let store = EntityStore::new();
        let settings = RenderSettings::default();
        let frame = build_frame_uniform(&cam, 0.5, &store, &settings);
        assert!((frame.view_position[2] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn disabled_interpolation_shows_current_tick() {
        let cam = moved_camera();
        let store = EntityStore::new();
        let settings = RenderSettings {
            interpolation: false,
            ..RenderSettings::default()
        };
        let frame = build_frame_uniform(&cam, 0.5, &store, &settings);
        assert!((frame.view_position[2] + 1.0).abs() < 1e-6);
        assert_eq!(frame.view, cam.current_view_matrix().to_cols_array_2d());
    }

    #[test]
    fn normal_mapping_flag_is_forwarded() {
        let cam = moved_camera();
        let store = EntityStore::new();
        let mut settings = RenderSettings::default();
        settings.normal_mapping = false;
        assert_eq!(build_frame_uniform(&cam, 0.0, &store, &settings).counts[1], 0);
        settings.normal_mapping = true;
        assert_eq!(build_frame_uniform(&cam, 0.0, &store, &settings).counts[1], 1);
    }
}
