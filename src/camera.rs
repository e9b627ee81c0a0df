use glam::{Mat4, Vec3};

/// Perspective projection parameters. Field of view is stored in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl PerspectiveCamera {
    pub fn new(aspect: f32) -> Self {
        Self {
            fov_y: 75.0,
            aspect,
            near: 0.1,
            far: 100.0,
        }
    }

    /// Updates the aspect ratio; must be followed by a projection rebuild
    /// (which [`Self::projection`] performs on demand).
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect.max(0.01);
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y.to_radians(), self.aspect.max(0.01), self.near, self.far)
    }
}

const ROTATE_SPEED: f32 = 0.005;
const ZOOM_SPEED: f32 = 0.25;
const MIN_DISTANCE: f32 = 0.5;
const MAX_DISTANCE: f32 = 50.0;
const MIN_PITCH: f32 = -1.55;
const MAX_PITCH: f32 = 1.55;

/// Pointer-driven orbit around a fixed target with damped motion.
///
/// Pointer deltas feed angular velocities instead of writing angles
/// directly; [`Self::update`] integrates the velocities every frame and
/// decays them, so motion keeps coasting after the pointer is released.
#[derive(Debug, Clone, Copy)]
pub struct OrbitControls {
    target: Vec3,
    yaw: f32,
    pitch: f32,
    distance: f32,
    yaw_velocity: f32,
    pitch_velocity: f32,
    zoom_velocity: f32,
    damping: f32,
    dragging: bool,
}

impl OrbitControls {
    /// Builds controls orbiting `target`, initially placed at `eye`.
    pub fn new(eye: Vec3, target: Vec3) -> Self {
        let offset = eye - target;
        let distance = offset.length().max(MIN_DISTANCE);
        let (yaw, pitch) = if distance > f32::EPSILON {
            let dir = offset / distance;
            (dir.z.atan2(dir.x), dir.y.asin())
        } else {
            (0.0, 0.0)
        };
        Self {
            target,
            yaw,
            pitch,
            distance,
            yaw_velocity: 0.0,
            pitch_velocity: 0.0,
            zoom_velocity: 0.0,
            damping: 0.05,
            dragging: false,
        }
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Feeds a pointer movement, in pixels, while dragging.
    pub fn pointer_delta(&mut self, dx: f32, dy: f32) {
        if self.dragging {
            self.yaw_velocity += dx * ROTATE_SPEED;
            self.pitch_velocity += dy * ROTATE_SPEED;
        }
    }

    /// Feeds a scroll step; positive values dolly toward the target.
    pub fn scroll(&mut self, delta: f32) {
        self.zoom_velocity += delta * ZOOM_SPEED;
    }

    /// Integrates one frame of damped motion. Call every frame, also when
    /// no input arrived, so released motion keeps decaying.
    pub fn update(&mut self, dt: f32) {
        self.yaw += self.yaw_velocity;
        self.pitch = (self.pitch + self.pitch_velocity).clamp(MIN_PITCH, MAX_PITCH);
        self.distance =
            (self.distance * (1.0 - self.zoom_velocity).max(0.1)).clamp(MIN_DISTANCE, MAX_DISTANCE);
        wrap_angle(&mut self.yaw);

        let decay = (1.0 - self.damping).powf((dt * 60.0).max(0.0));
        self.yaw_velocity *= decay;
        self.pitch_velocity *= decay;
        self.zoom_velocity *= decay;
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Current camera position on the orbit sphere.
    pub fn eye(&self) -> Vec3 {
        let cos_pitch = self.pitch.cos();
        let dir = Vec3::new(
            self.yaw.cos() * cos_pitch,
            self.pitch.sin(),
            self.yaw.sin() * cos_pitch,
        );
        self.target + dir * self.distance
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    /// Remaining angular speed, used to decide whether motion has settled.
    pub fn angular_speed(&self) -> f32 {
        self.yaw_velocity.abs() + self.pitch_velocity.abs() + self.zoom_velocity.abs()
    }
}

fn wrap_angle(angle: &mut f32) {
    const TWO_PI: f32 = std::f32::consts::PI * 2.0;
    if angle.is_finite() {
        *angle = (*angle + std::f32::consts::PI).rem_euclid(TWO_PI) - std::f32::consts::PI;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_reacts_to_aspect_changes() {
        let mut camera = PerspectiveCamera::new(800.0 / 600.0);
        camera.set_aspect(1024.0 / 768.0);
        assert!((camera.aspect - 1024.0 / 768.0).abs() < 1e-6);
        let projection = camera.projection();
        assert!(projection.to_cols_array().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn aspect_is_clamped_away_from_zero() {
        let mut camera = PerspectiveCamera::new(1.0);
        camera.set_aspect(0.0);
        assert!(camera.aspect > 0.0);
    }

    #[test]
    fn new_controls_reproduce_the_initial_eye() {
        let eye = Vec3::new(4.0, 1.0, -4.0);
        let controls = OrbitControls::new(eye, Vec3::ZERO);
        assert!((controls.eye() - eye).length() < 1e-4);
    }

    #[test]
    fn motion_continues_after_release_and_decays() {
        let mut controls = OrbitControls::new(Vec3::new(4.0, 1.0, -4.0), Vec3::ZERO);
        controls.set_dragging(true);
        controls.pointer_delta(40.0, 0.0);
        controls.set_dragging(false);

        let before = controls.eye();
        controls.update(1.0 / 60.0);
        let after_one = controls.eye();
        assert!((after_one - before).length() > 1e-5, "released motion coasts");

        for _ in 0..600 {
            controls.update(1.0 / 60.0);
        }
        assert!(controls.angular_speed() < 1e-4, "damping settles the orbit");
    }

    #[test]
    fn deltas_are_ignored_while_not_dragging() {
        let mut controls = OrbitControls::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        controls.pointer_delta(100.0, 100.0);
        controls.update(1.0 / 60.0);
        assert_eq!(controls.angular_speed(), 0.0);
    }

    #[test]
    fn pitch_stays_clear_of_the_poles() {
        let mut controls = OrbitControls::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        controls.set_dragging(true);
        for _ in 0..100 {
            controls.pointer_delta(0.0, 500.0);
            controls.update(1.0 / 60.0);
        }
        assert!(controls.eye().is_finite());
        let up_dot = (controls.eye() - controls.target()).normalize().dot(Vec3::Y);
        assert!(up_dot < 0.99999);
    }

    #[test]
    fn zoom_respects_distance_bounds() {
        let mut controls = OrbitControls::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        for _ in 0..200 {
            controls.scroll(5.0);
            controls.update(1.0 / 60.0);
        }
        assert!((controls.eye() - controls.target()).length() >= MIN_DISTANCE - 1e-4);
    }
}
