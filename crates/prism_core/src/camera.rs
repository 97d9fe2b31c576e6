use glam::{Mat4, Vec3};

#[derive(Clone, Debug)]
pub struct Camera {
    pub fov: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov: 45.0f32.to_radians(),
            aspect_ratio: 16.0 / 9.0, // Standard monitor
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    /// Computes the "Projection Matrix" (View -> Clip), depth mapped to [0, 1]
    pub fn compute_projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect_ratio, self.near, self.far)
    }

    /// Recomputes the aspect ratio for a new backbuffer size.
    /// A zero height (minimized window) keeps the previous ratio.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect_ratio = width as f32 / height as f32;
    }

    /// Builds the full matrix set for one frame from a view matrix.
    pub fn uniforms(&self, view: Mat4) -> CameraUniforms {
        let projection = self.compute_projection_matrix();
        let view_proj = projection * view;

        CameraUniforms {
            view,
            inv_view: view.inverse(),
            projection,
            inv_projection: projection.inverse(),
            view_proj,
            inv_view_proj: view_proj.inverse(),
            near: self.near,
            far: self.far,
        }
    }
}

/// Matrices produced once per frame and consumed by clustering and every shading pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraUniforms {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub projection: Mat4,
    pub inv_projection: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub near: f32,
    pub far: f32,
}

impl CameraUniforms {
    /// Eye position in world space.
    pub fn eye(&self) -> Vec3 {
        self.inv_view.transform_point3(Vec3::ZERO)
    }

    /// World point -> view space (camera looks down -Z).
    pub fn to_view(&self, world: Vec3) -> Vec3 {
        self.view.transform_point3(world)
    }
}

/// Time-driven orbit around a look-at point.
/// Stands in for interactive camera control, which lives outside the renderer.
#[derive(Clone, Debug)]
pub struct OrbitRig {
    pub target: Vec3,
    pub radius: f32,
    pub height: f32,
    /// Radians per second
    pub angular_speed: f32,
    angle: f32,
}

impl Default for OrbitRig {
    fn default() -> Self {
        Self {
            target: Vec3::new(0.0, 1.0, 0.0),
            radius: 18.0,
            height: 6.0,
            angular_speed: 0.15,
            angle: 0.0,
        }
    }
}

impl OrbitRig {
    pub fn new(target: Vec3, radius: f32, height: f32) -> Self {
        Self {
            target,
            radius,
            height,
            ..Default::default()
        }
    }

    pub fn advance(&mut self, delta_seconds: f32) {
        self.angle = (self.angle + self.angular_speed * delta_seconds) % std::f32::consts::TAU;
    }

    pub fn eye(&self) -> Vec3 {
        self.target
            + Vec3::new(
                self.radius * self.angle.cos(),
                self.height,
                self.radius * self.angle.sin(),
            )
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_hold_matching_inverses() {
        let camera = Camera::default();
        let rig = OrbitRig::default();
        let u = camera.uniforms(rig.view_matrix());

        assert!((u.view * u.inv_view).abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert!((u.projection * u.inv_projection).abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert!((u.view_proj * u.inv_view_proj).abs_diff_eq(Mat4::IDENTITY, 1e-3));
        assert!(u.near > 0.0 && u.near < u.far);
    }

    #[test]
    fn look_at_target_lands_on_the_view_axis() {
        let rig = OrbitRig::new(Vec3::new(1.0, 2.0, 3.0), 10.0, 4.0);
        let u = Camera::default().uniforms(rig.view_matrix());
        let target = u.to_view(rig.target);

        assert!(target.x.abs() < 1e-4);
        assert!(target.y.abs() < 1e-4);
        assert!(target.z < 0.0);
        assert!(u.eye().abs_diff_eq(rig.eye(), 1e-4));
    }

    #[test]
    fn viewport_recomputes_aspect_and_ignores_zero_height() {
        let mut camera = Camera::default();
        camera.set_viewport(800, 600);
        assert!((camera.aspect_ratio - 800.0 / 600.0).abs() < 1e-6);

        camera.set_viewport(1920, 0);
        assert!((camera.aspect_ratio - 800.0 / 600.0).abs() < 1e-6);
    }

    #[test]
    fn orbit_advances_with_time() {
        let mut rig = OrbitRig::default();
        let before = rig.eye();
        rig.advance(1.0);
        assert!(rig.eye().distance(before) > 0.0);
    }
}
