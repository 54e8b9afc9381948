//! Fly camera with two pose snapshots.
//!
//! `update` runs once per simulation tick and moves `current`, first copying
//! it into `previous`. Rendering asks for `view_matrix(lag_offset)`, which
//! blends the two snapshots so motion stays smooth at any display rate.

use glam::{Mat4, Quat, Vec3};

use crate::input::{InputState, Key};

pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 1000.0;

/// Rotations that bring `front` closer than this to world up are rejected.
const MAX_PITCH_DOT: f32 = 0.995;

/// Camera pose snapshot plus projection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub position: Vec3,
    pub front: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub fovy_deg: f32,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
    pub projection: Mat4,
}

impl Frustum {
    pub fn new(position: Vec3, front: Vec3, world_up: Vec3, fovy_deg: f32, aspect: f32) -> Self {
        let front = front.normalize();
        let (right, up) = derive_basis(front, world_up);
        let mut frustum = Self {
            position,
            front,
            right,
            up,
            fovy_deg,
            aspect,
            znear: Z_NEAR,
            zfar: Z_FAR,
            projection: Mat4::IDENTITY,
        };
        frustum.rebuild_projection();
        frustum
    }

    fn set_front(&mut self, front: Vec3, world_up: Vec3) {
        self.front = front.normalize();
        let (right, up) = derive_basis(self.front, world_up);
        self.right = right;
        self.up = up;
    }

    fn rebuild_projection(&mut self) {
        self.projection = Mat4::perspective_rh(
            self.fovy_deg.to_radians(),
            self.aspect,
            self.znear,
            self.zfar,
        );
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }
}

/// `right = normalize(front x world_up)`, `up = normalize(right x front)`.
pub fn derive_basis(front: Vec3, world_up: Vec3) -> (Vec3, Vec3) {
    let right = front.cross(world_up).normalize();
    let up = right.cross(front).normalize();
    (right, up)
}

/// Spherical interpolation between two unit directions.
///
/// Returns `from` unchanged at `t <= 0` or when the directions are equal.
pub fn slerp_direction(from: Vec3, to: Vec3, t: f32) -> Vec3 {
    if t <= 0.0 || from == to {
        return from;
    }
    if t >= 1.0 {
        return to;
    }
    let cos_theta = from.dot(to).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();
    let sin_theta = theta.sin();
    if sin_theta.abs() < 1e-6 {
        // Nearly parallel: the slerp weights are ill-conditioned.
        let v = from.lerp(to, t);
        return if v.length_squared() > 0.0 { v.normalize() } else { from };
    }
    let w_from = ((1.0 - t) * theta).sin() / sin_theta;
    let w_to = (t * theta).sin() / sin_theta;
    (from * w_from + to * w_to).normalize()
}

/// Movement and look keys sampled for one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CameraInput {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub look_up: bool,
    pub look_down: bool,
    pub look_left: bool,
    pub look_right: bool,
}

impl CameraInput {
    pub fn from_input(input: &InputState) -> Self {
        Self {
            forward: input.is_held(Key::W),
            back: input.is_held(Key::S),
            left: input.is_held(Key::A),
            right: input.is_held(Key::D),
            look_up: input.is_held(Key::Up),
            look_down: input.is_held(Key::Down),
            look_left: input.is_held(Key::Left),
            look_right: input.is_held(Key::Right),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub current: Frustum,
    pub previous: Frustum,
    pub world_up: Vec3,
    /// World units per tick.
    pub move_speed: f32,
    /// Radians per tick.
    pub rotation_speed: f32,
    movement: Vec3,
    rotation_axis: Vec3,
}

impl Camera {
    pub fn new(
        position: Vec3,
        front: Vec3,
        world_up: Vec3,
        fovy_deg: f32,
        aspect: f32,
        move_speed: f32,
        rotation_speed: f32,
    ) -> Self {
        assert!(
            front.normalize().cross(world_up).length_squared() > 1e-6,
            "camera front must not be parallel to world up"
        );
        let frustum = Frustum::new(position, front, world_up, fovy_deg, aspect);
        Self {
            current: frustum,
            previous: frustum,
            world_up,
            move_speed,
            rotation_speed,
            movement: Vec3::ZERO,
            rotation_axis: Vec3::ZERO,
        }
    }

    /// Advances the camera by one tick.
    pub fn update(&mut self, input: &CameraInput) {
        let basis = self.current;
        self.movement = Vec3::ZERO;
        self.rotation_axis = Vec3::ZERO;

        if input.forward {
            self.movement += basis.front;
        }
        if input.back {
            self.movement -= basis.front;
        }
        if input.right {
            self.movement += basis.right;
        }
        if input.left {
            self.movement -= basis.right;
        }
        if input.look_up {
            self.rotation_axis += basis.right;
        }
        if input.look_down {
            self.rotation_axis -= basis.right;
        }
        if input.look_left {
            self.rotation_axis += basis.up;
        }
        if input.look_right {
            self.rotation_axis -= basis.up;
        }
        self.movement = self.movement.normalize_or_zero();
        self.rotation_axis = self.rotation_axis.normalize_or_zero();

        self.previous = self.current;

        if self.rotation_axis != Vec3::ZERO {
            assert!(self.rotation_axis.is_normalized(), "rotation axis must be unit length");
            let rotated = Quat::from_axis_angle(self.rotation_axis, self.rotation_speed) * basis.front;
            if rotated.normalize().dot(self.world_up).abs() < MAX_PITCH_DOT {
                self.current.set_front(rotated, self.world_up);
            }
        }

        self.current.position += self.movement * self.move_speed;
    }

    /// Rebuilds the projection of both snapshots, e.g. after a resize.
    pub fn set_aspect(&mut self, aspect: f32) {
        for frustum in [&mut self.current, &mut self.previous] {
            frustum.aspect = aspect;
            frustum.rebuild_projection();
        }
    }

    pub fn projection(&self) -> Mat4 {
        self.current.projection
    }

    pub fn interpolated_position(&self, lag_offset: f32) -> Vec3 {
        let t = lag_offset.clamp(0.0, 1.0);
        if t == 0.0 {
            return self.previous.position;
        }
        self.previous.position.lerp(self.current.position, t)
    }

    pub fn interpolated_front(&self, lag_offset: f32) -> Vec3 {
        slerp_direction(self.previous.front, self.current.front, lag_offset.clamp(0.0, 1.0))
    }

    /// View matrix blended between the two snapshots. Read-only.
    pub fn view_matrix(&self, lag_offset: f32) -> Mat4 {
        if lag_offset <= 0.0 {
            return self.previous.view_matrix();
        }
        let position = self.interpolated_position(lag_offset);
        let front = self.interpolated_front(lag_offset);
        let (_, up) = derive_basis(front, self.world_up);
        Mat4::look_at_rh(position, position + front, up)
    }

    /// View of the latest tick, used when interpolation is disabled.
    pub fn current_view_matrix(&self) -> Mat4 {
        self.current.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> Camera {
        Camera::new(
            Vec3::new(0.0, 0.0, -20.0),
            Vec3::Z,
            Vec3::Y,
            60.0,
            4.0 / 3.0,
            0.05,
            0.02,
        )
    }

    fn approx_mat(a: Mat4, b: Mat4, eps: f32) -> bool {
        a.to_cols_array()
            .iter()
            .zip(b.to_cols_array().iter())
            .all(|(x, y)| (x - y).abs() < eps)
    }

    fn assert_orthonormal(f: &Frustum) {
        assert!((f.front.length() - 1.0).abs() < 1e-5);
        assert!((f.right.length() - 1.0).abs() < 1e-5);
        assert!((f.up.length() - 1.0).abs() < 1e-5);
        assert!(f.front.dot(f.right).abs() < 1e-5);
        assert!(f.front.dot(f.up).abs() < 1e-5);
        assert!(f.right.dot(f.up).abs() < 1e-5);
    }

    #[test]
    fn test_view_at_zero_lag_equals_previous() {
        let mut cam = test_camera();
        cam.update(&CameraInput {
            forward: true,
            look_left: true,
            ..CameraInput::default()
        });
        assert_eq!(cam.view_matrix(0.0), cam.previous.view_matrix());
        assert_ne!(cam.view_matrix(0.0), cam.current_view_matrix());
    }

    #[test]
    fn test_view_converges_to_current() {
        let mut cam = test_camera();
        cam.update(&CameraInput {
            right: true,
            look_up: true,
            ..CameraInput::default()
        });
        assert!(approx_mat(cam.view_matrix(0.9999), cam.current_view_matrix(), 1e-3));
    }

    #[test]
    fn test_equal_fronts_interpolate_exactly() {
        let mut cam = test_camera();
        cam.update(&CameraInput {
            forward: true,
            ..CameraInput::default()
        });
        assert_eq!(cam.previous.front, cam.current.front);
        for t in [0.0, 0.25, 0.5, 0.999] {
            let front = cam.interpolated_front(t);
            assert_eq!(front, cam.current.front);
            assert!(!front.is_nan());
        }
    }

    #[test]
    fn test_interpolated_position_is_linear() {
        let mut cam = test_camera();
        cam.update(&CameraInput {
            forward: true,
            ..CameraInput::default()
        });
        let mid = cam.interpolated_position(0.5);
        assert!((mid.z - (-20.0 + 0.025)).abs() < 1e-5);
    }

    #[test]
    fn test_basis_stays_orthonormal_over_many_ticks() {
        let mut cam = test_camera();
        for tick in 0..5000u32 {
            let input = CameraInput {
                forward: tick % 3 == 0,
                left: tick % 5 == 0,
                look_up: tick % 4 == 0,
                look_down: tick % 9 == 0,
                look_left: tick % 2 == 0,
                look_right: tick % 7 == 0,
                ..CameraInput::default()
            };
            cam.update(&input);
            assert_orthonormal(&cam.current);
        }
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let mut cam = test_camera();
        let before = cam.current;
        cam.update(&CameraInput {
            forward: true,
            back: true,
            look_left: true,
            look_right: true,
            ..CameraInput::default()
        });
        assert_eq!(cam.current.position, before.position);
        assert_eq!(cam.current.front, before.front);
    }

    #[test]
    fn test_diagonal_movement_is_normalized() {
        let mut cam = test_camera();
        let start = cam.current.position;
        cam.update(&CameraInput {
            forward: true,
            right: true,
            ..CameraInput::default()
        });
        let moved = (cam.current.position - start).length();
        assert!((moved - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_look_left_turns_toward_left() {
        let mut cam = test_camera();
        let right_before = cam.current.right;
        cam.update(&CameraInput {
            look_left: true,
            ..CameraInput::default()
        });
        // Turning left moves front away from the old right vector.
        assert!(cam.current.front.dot(right_before) < 0.0);
    }

    #[test]
    fn test_pitch_never_reaches_world_up() {
        let mut cam = test_camera();
        for _ in 0..500 {
            cam.update(&CameraInput {
                look_up: true,
                ..CameraInput::default()
            });
        }
        assert!(cam.current.front.dot(Vec3::Y) < MAX_PITCH_DOT);
        assert_orthonormal(&cam.current);
    }

    #[test]
    fn test_previous_is_current_at_tick_start() {
        let mut cam = test_camera();
        cam.update(&CameraInput {
            forward: true,
            ..CameraInput::default()
        });
        let snapshot = cam.current;
        cam.update(&CameraInput {
            back: true,
            ..CameraInput::default()
        });
        assert_eq!(cam.previous, snapshot);
    }

    #[test]
    fn test_set_aspect_updates_both_snapshots() {
        let mut cam = test_camera();
        cam.set_aspect(2.0);
        assert_eq!(cam.current.aspect, 2.0);
        assert_eq!(cam.previous.projection, cam.current.projection);
    }

    #[test]
    fn test_slerp_midpoint_is_unit_and_between() {
        let a = Vec3::X;
        let b = Vec3::Z;
        let mid = slerp_direction(a, b, 0.5);
        assert!((mid.length() - 1.0).abs() < 1e-6);
        assert!((mid.dot(a) - mid.dot(b)).abs() < 1e-6);
    }

    #[test]
    fn test_camera_input_from_keys() {
        let mut input = InputState::new();
        input.key_down(Key::W);
        input.key_down(Key::Left);
        let cam_input = CameraInput::from_input(&input);
        assert!(cam_input.forward && cam_input.look_left);
        assert!(!cam_input.back && !cam_input.look_right);
    }
}
