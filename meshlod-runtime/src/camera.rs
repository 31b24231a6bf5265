//! Free-fly camera pose and visibility cone

use glam::{Mat4, Vec3};

/// Cosine of half the fixed 90° field of view used by the cluster
/// visibility cone.
pub const COS_HALF_FOV: f32 = std::f32::consts::FRAC_1_SQRT_2;

pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fovy: f32,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Camera {
    pub fn new(position: Vec3, yaw: f32) -> Self {
        Self {
            position,
            yaw,
            pitch: 0.0,
            fovy: 90f32.to_radians(),
            aspect: 16.0 / 9.0,
            znear: 0.01,
            zfar: 1000.0,
        }
    }

    pub fn dir(yaw: f32, pitch: f32) -> Vec3 {
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        Vec3::new(cy * cp, sp, sy * cp).normalize()
    }

    pub fn forward(&self) -> Vec3 {
        Self::dir(self.yaw, self.pitch)
    }

    /// Apply a world-space translation and a look delta. Pitch is
    /// clamped short of the poles so the view matrix stays invertible.
    pub fn update(&mut self, delta_pos: Vec3, delta_yaw: f32, delta_pitch: f32) {
        self.position += delta_pos;
        self.yaw += delta_yaw;
        self.pitch = (self.pitch + delta_pitch).clamp(-1.54, 1.54);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    pub fn proj_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy, self.aspect.max(0.01), self.znear, self.zfar)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj_matrix() * self.view_matrix()
    }

    /// Is `point` inside the forward cone?
    pub fn in_front(&self, point: Vec3) -> bool {
        let to_point = point - self.position;
        let len = to_point.length();
        if len <= f32::EPSILON {
            return true;
        }
        to_point.dot(self.forward()) / len > COS_HALF_FOV
    }

    /// Cone test over a batch of points.
    pub fn in_front_mask(&self, points: &[Vec3]) -> Vec<bool> {
        let forward = self.forward();
        points
            .iter()
            .map(|&p| {
                let to_point = p - self.position;
                let len = to_point.length();
                len <= f32::EPSILON || to_point.dot(forward) / len > COS_HALF_FOV
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn forward_matches_yaw() {
        let cam = Camera::new(Vec3::ZERO, 0.0);
        assert_relative_eq!(cam.forward().x, 1.0, epsilon = 1e-6);

        let cam = Camera::new(Vec3::ZERO, std::f32::consts::FRAC_PI_2);
        assert_relative_eq!(cam.forward().z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn cone_test_accepts_ahead_rejects_behind() {
        let cam = Camera::new(Vec3::ZERO, 0.0);
        assert!(cam.in_front(Vec3::new(5.0, 0.0, 0.0)));
        assert!(!cam.in_front(Vec3::new(-5.0, 0.0, 0.0)));
        // Exactly 45° off axis sits on the cone boundary and is excluded.
        assert!(!cam.in_front(Vec3::new(1.0, 1.0, 0.0)));
        // Just inside the cone.
        assert!(cam.in_front(Vec3::new(1.0, 0.9, 0.0)));
    }

    #[test]
    fn mask_agrees_with_single_point_test() {
        let cam = Camera::new(Vec3::new(1.0, 2.0, 3.0), 0.7);
        let points = vec![
            Vec3::new(5.0, 2.0, 5.0),
            Vec3::new(-5.0, 2.0, -3.0),
            Vec3::new(1.0, 2.0, 3.0),
        ];
        let mask = cam.in_front_mask(&points);
        for (p, &m) in points.iter().zip(&mask) {
            assert_eq!(cam.in_front(*p), m);
        }
    }

    #[test]
    fn pitch_stays_clamped() {
        let mut cam = Camera::new(Vec3::ZERO, 0.0);
        cam.update(Vec3::ZERO, 0.0, 10.0);
        assert!(cam.pitch <= 1.54);
        cam.update(Vec3::ZERO, 0.0, -20.0);
        assert!(cam.pitch >= -1.54);
    }
}
