use foundation::math::{Mat4, Vec2, Vec3, Vec4};

use crate::picking::Ray;

/// Perspective camera shared by the render surface and the pointer bridge.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_rad: f64,
    pub near: f64,
    pub far: f64,
    /// Width over height of the drawing surface.
    pub aspect: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::new(0.0, 1.0, 0.0),
            fov_y_rad: 45f64.to_radians(),
            near: 0.1,
            far: 100.0,
            aspect: 1.0,
        }
    }
}

impl Camera {
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh_z0(self.fov_y_rad, self.aspect, self.near, self.far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection().mul(&self.view())
    }

    /// World point -> NDC. `None` for points behind the eye.
    pub fn project(&self, world: Vec3) -> Option<Vec2> {
        let clip = self
            .view_proj()
            .mul_vec4(Vec4::new(world.x, world.y, world.z, 1.0));
        if clip.w <= 0.0 {
            return None;
        }
        clip.project().map(|p| Vec2::new(p.x, p.y))
    }

    /// Ray from the near plane through `ndc` (`-1..1` on both axes).
    pub fn unproject(&self, ndc: Vec2) -> Option<Ray> {
        let inv = self.view_proj().inverse()?;
        let near = inv.mul_vec4(Vec4::new(ndc.x, ndc.y, 0.0, 1.0)).project()?;
        let far = inv.mul_vec4(Vec4::new(ndc.x, ndc.y, 1.0, 1.0)).project()?;
        let dir = (far - near).normalize()?;
        Some(Ray::new(near, dir))
    }

    /// World-space width and height visible at `distance` in front of the
    /// eye. Used to size quads so they cover their DOM view.
    pub fn visible_size_at(&self, distance: f64) -> Vec2 {
        let height = 2.0 * distance * (0.5 * self.fov_y_rad).tan();
        Vec2::new(height * self.aspect, height)
    }
}

#[cfg(test)]
mod tests {
    use super::Camera;
    use foundation::math::{Vec2, Vec3};

    #[test]
    fn center_ray_points_at_target() {
        let camera = Camera::default();
        let ray = camera.unproject(Vec2::ZERO).unwrap();
        assert!(ray.dir.x.abs() < 1e-9 && ray.dir.y.abs() < 1e-9);
        assert!(ray.dir.z < 0.0);
        let hit = ray.intersect_plane_z(0.0).unwrap();
        assert!(hit.x.abs() < 1e-9 && hit.y.abs() < 1e-9);
    }

    #[test]
    fn project_and_unproject_agree() {
        let mut camera = Camera::default();
        camera.set_viewport(1600.0, 900.0);
        let world = Vec3::new(0.75, -0.4, 0.0);
        let ndc = camera.project(world).unwrap();
        let back = camera.unproject(ndc).unwrap().intersect_plane_z(0.0).unwrap();
        assert!((back.x - world.x).abs() < 1e-6);
        assert!((back.y - world.y).abs() < 1e-6);
    }

    #[test]
    fn visible_size_matches_frustum_edge() {
        let camera = Camera::default();
        let size = camera.visible_size_at(5.0);
        let corner = camera
            .unproject(Vec2::new(1.0, 1.0))
            .unwrap()
            .intersect_plane_z(0.0)
            .unwrap();
        assert!((corner.y - size.y / 2.0).abs() < 1e-6);
        assert!((corner.x - size.x / 2.0).abs() < 1e-6);
    }
}
