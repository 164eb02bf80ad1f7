//! Minimal rigid 2D transform used for entity placement.
//!
//! A [`Pose`] is an (x, y, heading) triple. Child components store their
//! pose relative to their parent and the world composes down the component
//! tree each tick, so eyes ride along with the body that owns them.

use serde::{Deserialize, Serialize};

const FULL_TURN: f32 = std::f32::consts::TAU;
const HALF_TURN: f32 = std::f32::consts::PI;

/// Normalise an angle into (-pi, pi].
pub(crate) fn wrap_signed_angle(mut angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    while angle <= -HALF_TURN {
        angle += FULL_TURN;
    }
    while angle > HALF_TURN {
        angle -= FULL_TURN;
    }
    angle
}

/// Position and orientation in the plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
}

impl Pose {
    #[must_use]
    pub const fn new(x: f32, y: f32, heading: f32) -> Self {
        Self { x, y, heading }
    }

    /// Express `local` (given in this pose's frame) in the parent frame.
    #[must_use]
    pub fn compose(&self, local: Pose) -> Pose {
        let (sin, cos) = self.heading.sin_cos();
        Pose {
            x: self.x + cos * local.x - sin * local.y,
            y: self.y + sin * local.x + cos * local.y,
            heading: wrap_signed_angle(self.heading + local.heading),
        }
    }

    /// Advance the pose by one differential-drive step.
    ///
    /// Two wheels on either side of the body; wheel radius and separation
    /// are proportional to the body radius of the bug driving them.
    pub fn drive(&mut self, vel_left: f32, vel_right: f32, wheel_radius: f32, separation: f32) {
        if separation <= 0.0 {
            return;
        }
        let delta_heading = (wheel_radius / separation) * (vel_right - vel_left);
        let forward = (wheel_radius / 2.0) * (vel_right + vel_left);
        let local_x = forward * delta_heading.cos();
        let local_y = forward * delta_heading.sin();
        let (sin, cos) = self.heading.sin_cos();
        self.x += cos * local_x - sin * local_y;
        self.y += sin * local_x + cos * local_y;
        self.heading = wrap_signed_angle(self.heading + delta_heading);
    }

    /// Keep the pose inside the arena, wrapping to the far edge or clamping
    /// to the wall depending on the world's boundary mode.
    pub fn apply_bounds(&mut self, width: f32, height: f32, wrap: bool) {
        if wrap {
            if self.x < 0.0 {
                self.x = width;
            } else if self.x > width {
                self.x = 0.0;
            }
            if self.y < 0.0 {
                self.y = height;
            } else if self.y > height {
                self.y = 0.0;
            }
        } else {
            self.x = self.x.clamp(0.0, width);
            self.y = self.y.clamp(0.0, height);
        }
    }
}

/// Squared center distance between two poses.
#[must_use]
pub fn distance_squared(a: Pose, b: Pose) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_with_identity_is_identity() {
        let base = Pose::new(3.0, -2.0, 0.0);
        let composed = base.compose(Pose::new(5.0, 0.0, 0.0));
        assert!((composed.x - 8.0).abs() < 1e-6);
        assert!((composed.y + 2.0).abs() < 1e-6);
    }

    #[test]
    fn compose_rotates_local_offset() {
        let base = Pose::new(0.0, 0.0, std::f32::consts::FRAC_PI_2);
        let composed = base.compose(Pose::new(1.0, 0.0, 0.0));
        assert!(composed.x.abs() < 1e-6);
        assert!((composed.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn drive_straight_moves_along_heading() {
        let mut pose = Pose::new(0.0, 0.0, 0.0);
        pose.drive(1.0, 1.0, 5.0, 20.0);
        assert!((pose.x - 5.0).abs() < 1e-5);
        assert!(pose.y.abs() < 1e-5);
        assert!(pose.heading.abs() < 1e-6);
    }

    #[test]
    fn wrap_moves_to_far_edge() {
        let mut pose = Pose::new(-1.0, 805.0, 0.0);
        pose.apply_bounds(1000.0, 800.0, true);
        assert!((pose.x - 1000.0).abs() < 1e-6);
        assert!(pose.y.abs() < 1e-6);
    }

    #[test]
    fn clamp_pins_to_wall() {
        let mut pose = Pose::new(-1.0, 805.0, 0.0);
        pose.apply_bounds(1000.0, 800.0, false);
        assert!(pose.x.abs() < 1e-6);
        assert!((pose.y - 800.0).abs() < 1e-6);
    }

    #[test]
    fn distance_squared_is_symmetric() {
        let a = Pose::new(1.0, 2.0, 0.3);
        let b = Pose::new(-4.0, 7.5, 2.0);
        assert_eq!(distance_squared(a, b), distance_squared(b, a));
    }
}
