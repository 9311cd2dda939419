//! Fly camera shared by the interactive samples
//!
//! WASD moves along the view and right vectors. Holding the middle mouse
//! button and dragging rotates the view: vertical drag pitches around the
//! right vector captured when the drag started, horizontal drag turns around
//! world up. Rotation is always applied to the vectors captured at the start
//! of the drag, so the result depends only on the total cursor offset.

use nalgebra::{Matrix4, Point3, Rotation3, Unit, Vector3};

use crate::events::{AppEvent, KeyCode, MouseButton};

/// Distance moved per key press
pub const MOVE_STEP: f32 = 0.1;
/// Degrees of rotation per pixel of drag
pub const DEGREES_PER_PIXEL: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
struct DragAnchor {
    cursor: (f32, f32),
    view: Vector3<f32>,
    up: Vector3<f32>,
    right: Vector3<f32>,
}

/// Perspective camera with world-space view and up vectors
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vector3<f32>,
    view: Vector3<f32>,
    up: Vector3<f32>,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    drag: Option<DragAnchor>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            view: Vector3::x(),
            up: Vector3::y(),
            fov_y: 47.0_f32.to_radians(),
            aspect: 1280.0 / 640.0,
            near: 0.1,
            far: 100.0,
            drag: None,
        }
    }
}

impl Camera {
    /// Camera at `position` looking along `view`
    pub fn new(position: Vector3<f32>, view: Vector3<f32>) -> Self {
        let mut camera = Self {
            position,
            ..Self::default()
        };
        camera.set_view(view);
        camera
    }

    /// Feed a window event
    pub fn on_event(&mut self, event: &AppEvent) {
        match *event {
            AppEvent::Key { key, pressed: true } => self.on_key(key),
            AppEvent::MouseButton { button: MouseButton::Middle, pressed, position } => {
                self.on_middle_mouse(pressed, position);
            }
            AppEvent::CursorMoved { x, y } if self.drag.is_some() => {
                self.on_middle_mouse(true, (x, y));
            }
            AppEvent::Resized { width, height } => self.set_aspect(width, height),
            _ => {}
        }
    }

    /// Move for a pressed key
    pub fn on_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::W => self.position += self.view * MOVE_STEP,
            KeyCode::S => self.position -= self.view * MOVE_STEP,
            KeyCode::D => self.position += self.view.cross(&self.up) * MOVE_STEP,
            KeyCode::A => self.position -= self.view.cross(&self.up) * MOVE_STEP,
            _ => {}
        }
    }

    /// Middle button state and cursor position
    ///
    /// The first `is_down` records the anchor; later ones rotate relative to it.
    pub fn on_middle_mouse(&mut self, is_down: bool, cursor: (f32, f32)) {
        if !is_down {
            self.drag = None;
            return;
        }

        let Some(anchor) = self.drag else {
            self.drag = Some(DragAnchor {
                cursor,
                view: self.view,
                up: self.up,
                right: self.right(),
            });
            return;
        };

        let dx = -(cursor.0 - anchor.cursor.0);
        let dy = -(cursor.1 - anchor.cursor.1);
        let pitch = Rotation3::from_axis_angle(
            &Unit::new_normalize(anchor.right),
            (DEGREES_PER_PIXEL * dy).to_radians(),
        );
        let head = Rotation3::from_axis_angle(&Vector3::y_axis(), (DEGREES_PER_PIXEL * dx).to_radians());
        let rotation = head * pitch;

        self.view = (rotation * anchor.view).normalize();
        self.up = (rotation * anchor.up).normalize();
    }

    /// Whether a middle-button drag is in progress
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Replace the view direction, keeping up
    pub fn set_view(&mut self, view: Vector3<f32>) {
        if let Some(view) = view.try_normalize(f32::EPSILON) {
            self.view = view;
        }
    }

    /// Update the aspect ratio; a zero height is ignored
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// World-space position
    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    /// Normalised view direction
    pub fn view(&self) -> Vector3<f32> {
        self.view
    }

    /// Normalised up vector
    pub fn up(&self) -> Vector3<f32> {
        self.up
    }

    /// Normalised `view x up`
    pub fn right(&self) -> Vector3<f32> {
        self.view.cross(&self.up).normalize()
    }

    /// Width over height
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Near plane `(width, height, near)`
    pub fn near_plane(&self) -> (f32, f32, f32) {
        let height = 2.0 * self.near * (self.fov_y / 2.0).tan();
        (self.aspect * height, height, self.near)
    }

    /// World to view space
    pub fn view_matrix(&self) -> Matrix4<f32> {
        let eye = Point3::from(self.position);
        let target = Point3::from(self.position + self.view);
        Matrix4::look_at_rh(&eye, &target, &self.up)
    }

    /// View to Vulkan clip space: depth in `[0, 1]`, Y pointing down
    pub fn projection_matrix(&self) -> Matrix4<f32> {
        let f = 1.0 / (self.fov_y / 2.0).tan();
        let range = self.near - self.far;
        #[rustfmt::skip]
        let projection = Matrix4::new(
            f / self.aspect, 0.0, 0.0, 0.0,
            0.0, -f, 0.0, 0.0,
            0.0, 0.0, self.far / range, self.near * self.far / range,
            0.0, 0.0, -1.0, 0.0,
        );
        projection
    }

    /// `projection * view`
    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn test_default_orientation() {
        let camera = Camera::default();
        assert_relative_eq!(camera.view(), Vector3::x());
        assert_relative_eq!(camera.up(), Vector3::y());
        assert_relative_eq!(camera.right(), Vector3::z());
        assert_relative_eq!(camera.aspect(), 2.0);
    }

    #[test]
    fn test_wasd_moves_along_view_and_right() {
        let mut camera = Camera::default();
        camera.on_event(&AppEvent::Key { key: KeyCode::W, pressed: true });
        assert_relative_eq!(camera.position(), Vector3::new(0.1, 0.0, 0.0));

        camera.on_event(&AppEvent::Key { key: KeyCode::D, pressed: true });
        assert_relative_eq!(camera.position(), Vector3::new(0.1, 0.0, 0.1));

        camera.on_event(&AppEvent::Key { key: KeyCode::S, pressed: true });
        camera.on_event(&AppEvent::Key { key: KeyCode::A, pressed: true });
        assert_relative_eq!(camera.position(), Vector3::zeros(), epsilon = 1e-6);
    }

    #[test]
    fn test_key_release_does_not_move() {
        let mut camera = Camera::default();
        camera.on_event(&AppEvent::Key { key: KeyCode::W, pressed: false });
        assert_relative_eq!(camera.position(), Vector3::zeros());
    }

    #[test]
    fn test_first_press_only_anchors() {
        let mut camera = Camera::default();
        camera.on_middle_mouse(true, (100.0, 100.0));
        assert!(camera.is_dragging());
        assert_relative_eq!(camera.view(), Vector3::x());
    }

    #[test]
    fn test_horizontal_drag_turns_around_world_up() {
        let mut camera = Camera::default();
        camera.on_middle_mouse(true, (100.0, 100.0));
        // 180 px left is +90 degrees of head
        camera.on_middle_mouse(true, (-80.0, 100.0));
        assert_relative_eq!(camera.view(), Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(camera.up(), Vector3::y(), epsilon = 1e-5);
    }

    #[test]
    fn test_rotation_is_relative_to_anchor() {
        let mut camera = Camera::default();
        camera.on_middle_mouse(true, (0.0, 0.0));
        camera.on_middle_mouse(true, (-40.0, 0.0));
        camera.on_middle_mouse(true, (-90.0, 0.0));

        let mut direct = Camera::default();
        direct.on_middle_mouse(true, (0.0, 0.0));
        direct.on_middle_mouse(true, (-90.0, 0.0));

        assert_relative_eq!(camera.view(), direct.view(), epsilon = 1e-6);
    }

    #[test]
    fn test_vertical_drag_pitches() {
        let mut camera = Camera::default();
        camera.on_middle_mouse(true, (0.0, 0.0));
        // Cursor up by 60 px pitches by +30 degrees around +Z
        camera.on_middle_mouse(true, (0.0, -60.0));
        let expected = Vector3::new(30.0_f32.to_radians().cos(), 30.0_f32.to_radians().sin(), 0.0);
        assert_relative_eq!(camera.view(), expected, epsilon = 1e-5);
        assert_relative_eq!(camera.view().norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_release_ends_drag() {
        let mut camera = Camera::default();
        camera.on_event(&AppEvent::MouseButton {
            button: MouseButton::Middle,
            pressed: true,
            position: (0.0, 0.0),
        });
        camera.on_event(&AppEvent::CursorMoved { x: -180.0, y: 0.0 });
        let turned = camera.view();
        camera.on_event(&AppEvent::MouseButton {
            button: MouseButton::Middle,
            pressed: false,
            position: (-180.0, 0.0),
        });
        assert!(!camera.is_dragging());

        camera.on_event(&AppEvent::CursorMoved { x: 500.0, y: 500.0 });
        assert_relative_eq!(camera.view(), turned);
    }

    #[test]
    fn test_zero_height_keeps_aspect() {
        let mut camera = Camera::default();
        camera.set_aspect(800, 0);
        assert_relative_eq!(camera.aspect(), 2.0);
        camera.set_aspect(800, 400);
        assert_relative_eq!(camera.aspect(), 2.0);
        camera.set_aspect(600, 600);
        assert_relative_eq!(camera.aspect(), 1.0);
    }

    #[test]
    fn test_near_plane() {
        let camera = Camera::default();
        let (width, height, near) = camera.near_plane();
        assert_relative_eq!(near, 0.1);
        assert_relative_eq!(height, 0.2 * (47.0_f32.to_radians() / 2.0).tan(), epsilon = 1e-6);
        assert_relative_eq!(width, 2.0 * height, epsilon = 1e-6);
    }

    #[test]
    fn test_projection_depth_range() {
        let camera = Camera::default();
        let proj = camera.projection_matrix();

        let near = proj * Vector4::new(0.0, 0.0, -0.1, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);

        let far = proj * Vector4::new(0.0, 0.0, -100.0, 1.0);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let clip = camera.projection_matrix() * Vector4::new(0.0, 1.0, -1.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_point_ahead_projects_to_centre() {
        let camera = Camera::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.0, 0.0, -2.0));
        let clip = camera.view_projection() * Vector4::new(1.0, 2.0, -2.0, 1.0);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-5);
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0);
    }
}
