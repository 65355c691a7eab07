use std::collections::HashSet;

use glam::{Mat4, Vec2, Vec3};

use crate::entity::MeshData;

/// World units moved per frame while a navigation key is held.
pub const MOVE_SPEED: f32 = 0.12;
/// Degrees of rotation per pixel of pointer travel while looking.
pub const LOOK_SENSITIVITY: f32 = 0.2;

const PITCH_LIMIT: f32 = 89.0;
const HOME_POSITION: Vec3 = Vec3::new(0.0, 0.0, 5.0);
const FOCUS_DISTANCE_FACTOR: f32 = 1.5;

/// Navigation intents, decoupled from any concrete key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavKey {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
}

/// First-person free camera: a position plus yaw/pitch in degrees.
///
/// Held keys are integrated once per frame by [`integrate`]; pointer deltas
/// rotate only while the look button is held. Pitch is clamped to
/// `[-89, 89]` so the view never flips over the poles.
///
/// [`integrate`]: FlyCamera::integrate
#[derive(Debug, Clone)]
pub struct FlyCamera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    held: HashSet<NavKey>,
    look_active: bool,
    last_pointer: Option<Vec2>,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl FlyCamera {
    pub fn new() -> Self {
        Self {
            position: HOME_POSITION,
            yaw: 0.0,
            pitch: 0.0,
            held: HashSet::new(),
            look_active: false,
            last_pointer: None,
        }
    }

    pub fn key_pressed(&mut self, key: NavKey) {
        self.held.insert(key);
    }

    pub fn key_released(&mut self, key: NavKey) {
        self.held.remove(&key);
    }

    /// Engages or releases look mode. Releasing drops the pointer baseline
    /// so the next drag starts without a jump.
    pub fn set_look_active(&mut self, active: bool) {
        self.look_active = active;
        if !active {
            self.last_pointer = None;
        }
    }

    /// Feeds a pointer position. Outside look mode this only refreshes the
    /// tracked baseline; inside it, the delta rotates the view.
    pub fn pointer_moved(&mut self, pointer: Vec2) {
        if !self.look_active {
            self.last_pointer = Some(pointer);
            return;
        }
        let Some(last) = self.last_pointer else {
            self.last_pointer = Some(pointer);
            return;
        };
        let delta = pointer - last;
        self.last_pointer = Some(pointer);
        self.yaw += delta.x * LOOK_SENSITIVITY;
        self.pitch = (self.pitch + delta.y * LOOK_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Applies one frame of held-key movement.
    ///
    /// Basis vectors come from yaw alone; pitch never affects planar
    /// movement. Simultaneous keys compose additively without
    /// normalization.
    pub fn integrate(&mut self) {
        let yaw = self.yaw.to_radians();
        let forward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
        let right = Vec3::new(yaw.cos(), 0.0, -yaw.sin());
        let up = Vec3::Y;

        for key in &self.held {
            let step = match key {
                NavKey::Forward => forward,
                NavKey::Back => -forward,
                NavKey::Left => -right,
                NavKey::Right => right,
                NavKey::Up => up,
                NavKey::Down => -up,
            };
            self.position += step * MOVE_SPEED;
        }
    }

    /// View transform: inverse pitch rotation, then inverse yaw rotation,
    /// then inverse translation.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_x(-self.pitch.to_radians())
            * Mat4::from_rotation_y(-self.yaw.to_radians())
            * Mat4::from_translation(-self.position)
    }

    /// Frames a mesh: repositions to its centroid, backed off along +Z by
    /// 1.5x the largest bounding extent. Not animated.
    pub fn focus_on(&mut self, mesh: &MeshData) {
        let centroid = mesh.centroid();
        let distance = mesh.extents().max_element() * FOCUS_DISTANCE_FACTOR;
        self.position = centroid + Vec3::Z * distance;
    }

    /// Returns to the home position; orientation is left alone.
    pub fn reset_home(&mut self) {
        self.position = HOME_POSITION;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_clamps_at_exactly_89_degrees() {
        let mut camera = FlyCamera::new();
        camera.set_look_active(true);
        camera.pointer_moved(Vec2::ZERO);
        for step in 1..2000 {
            camera.pointer_moved(Vec2::new(0.0, step as f32));
        }
        assert_eq!(camera.pitch, 89.0);

        camera.pointer_moved(Vec2::ZERO);
        for step in 1..4000 {
            camera.pointer_moved(Vec2::new(0.0, -(step as f32)));
        }
        assert_eq!(camera.pitch, -89.0);
    }

    #[test]
    fn pointer_motion_without_look_button_only_updates_baseline() {
        let mut camera = FlyCamera::new();
        camera.pointer_moved(Vec2::new(100.0, 100.0));
        assert_eq!(camera.yaw, 0.0);
        assert_eq!(camera.pitch, 0.0);

        // Engaging look after a large jump must not rotate retroactively.
        camera.set_look_active(true);
        camera.pointer_moved(Vec2::new(110.0, 100.0));
        assert_eq!(camera.yaw, 10.0 * LOOK_SENSITIVITY);
    }

    #[test]
    fn forward_key_moves_along_yaw_basis() {
        let mut camera = FlyCamera::new();
        camera.key_pressed(NavKey::Forward);
        camera.integrate();
        assert!((camera.position.z - (5.0 + MOVE_SPEED)).abs() < 1e-6);

        camera.yaw = 90.0;
        camera.integrate();
        assert!((camera.position.x - MOVE_SPEED).abs() < 1e-5);
    }

    #[test]
    fn simultaneous_keys_compose_additively() {
        let mut camera = FlyCamera::new();
        camera.key_pressed(NavKey::Forward);
        camera.key_pressed(NavKey::Right);
        camera.integrate();
        let moved = camera.position - HOME_POSITION;
        // Diagonal movement is not normalized.
        assert!((moved.length() - MOVE_SPEED * 2.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn released_keys_stop_contributing() {
        let mut camera = FlyCamera::new();
        camera.key_pressed(NavKey::Up);
        camera.integrate();
        camera.key_released(NavKey::Up);
        let frozen = camera.position;
        camera.integrate();
        assert_eq!(camera.position, frozen);
    }

    #[test]
    fn focus_frames_the_mesh_from_its_largest_extent() {
        let mesh = MeshData::new(
            vec![
                Vec3::new(-2.0, 0.0, 0.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
            None,
        )
        .unwrap();
        let mut camera = FlyCamera::new();
        camera.focus_on(&mesh);
        let centroid = mesh.centroid();
        assert_eq!(camera.position, centroid + Vec3::Z * 6.0);
    }
}
