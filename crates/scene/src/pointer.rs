//! Pointer/interaction bridge.
//!
//! Raw client-space pointer events are mapped against the render surface's
//! bounding rectangle to NDC, and through the active camera to a world
//! point on the `z = 0` plane. Interaction states (`-media`, `-webgl`, ...)
//! are reference counted by owner: a state stays active until every owner
//! that pushed it has popped it.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use foundation::Id;
use foundation::bounds::Rect;
use foundation::math::{Vec2, Vec3};
use foundation::time::Time;

use crate::camera::Camera;

/// Weight of the newest sample in the smoothed velocity.
const VELOCITY_SMOOTHING: f64 = 0.5;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PointerSnapshot {
    /// Client (CSS pixel) position of the last event.
    pub client: Vec2,
    /// `-1..1` on both axes, `+y` up. Outside the surface it leaves that range.
    pub ndc: Vec2,
    /// Intersection with the `z = 0` plane through the active camera.
    pub world: Option<Vec3>,
    pub inside: bool,
    pub pressed: bool,
    /// NDC offset since the press began; zero while released.
    pub drag: Vec2,
    /// Smoothed NDC units per second.
    pub velocity: Vec2,
}

impl Default for PointerSnapshot {
    fn default() -> Self {
        Self {
            client: Vec2::ZERO,
            ndc: Vec2::ZERO,
            world: None,
            inside: false,
            pressed: false,
            drag: Vec2::ZERO,
            velocity: Vec2::ZERO,
        }
    }
}

struct BridgeState {
    surface: Rect,
    camera: Camera,
    snapshot: PointerSnapshot,
    press_origin: Option<Vec2>,
    last_move: Option<Time>,
    states: BTreeMap<String, BTreeSet<Id>>,
}

/// Maps client coordinates into the surface's NDC: `x` grows right, `y`
/// grows up.
pub fn client_to_ndc(surface: &Rect, x: f64, y: f64) -> Vec2 {
    if surface.is_empty() {
        return Vec2::ZERO;
    }
    Vec2::new(
        2.0 * (x - surface.x) / surface.width - 1.0,
        1.0 - 2.0 * (y - surface.y) / surface.height,
    )
}

/// Shared handle to the pointer bridge.
#[derive(Clone)]
pub struct PointerBridge {
    state: Rc<RefCell<BridgeState>>,
}

impl Default for PointerBridge {
    fn default() -> Self {
        Self::new(Rect::default(), Camera::default())
    }
}

impl fmt::Debug for PointerBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("PointerBridge")
            .field("surface", &s.surface)
            .field("snapshot", &s.snapshot)
            .field("states", &s.states.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PointerBridge {
    pub fn new(surface: Rect, camera: Camera) -> Self {
        Self {
            state: Rc::new(RefCell::new(BridgeState {
                surface,
                camera,
                snapshot: PointerSnapshot::default(),
                press_origin: None,
                last_move: None,
                states: BTreeMap::new(),
            })),
        }
    }

    /// The surface's bounding rectangle in client coordinates.
    pub fn set_surface_rect(&self, rect: Rect) {
        self.state.borrow_mut().surface = rect;
    }

    pub fn set_camera(&self, camera: Camera) {
        self.state.borrow_mut().camera = camera;
    }

    pub fn snapshot(&self) -> PointerSnapshot {
        self.state.borrow().snapshot
    }

    pub fn pointer_move(&self, x: f64, y: f64, now: Time) -> PointerSnapshot {
        let mut s = self.state.borrow_mut();
        let ndc = client_to_ndc(&s.surface, x, y);
        let dt = s.last_move.map(|prev| now.since(prev)).unwrap_or(0.0);
        let world = s
            .camera
            .unproject(ndc)
            .and_then(|ray| ray.intersect_plane_z(0.0));
        let prev = s.snapshot;
        let velocity = if dt > 0.0 {
            let raw = (ndc - prev.ndc).scale(1.0 / dt);
            prev.velocity.lerp(raw, VELOCITY_SMOOTHING)
        } else {
            prev.velocity
        };

        s.snapshot = PointerSnapshot {
            client: Vec2::new(x, y),
            ndc,
            world,
            inside: s.surface.contains_point(x, y),
            pressed: prev.pressed,
            drag: s.press_origin.map_or(Vec2::ZERO, |origin| ndc - origin),
            velocity,
        };
        s.last_move = Some(now);
        s.snapshot
    }

    pub fn pointer_down(&self, x: f64, y: f64) {
        let mut s = self.state.borrow_mut();
        let ndc = client_to_ndc(&s.surface, x, y);
        s.press_origin = Some(ndc);
        s.snapshot.pressed = true;
        s.snapshot.drag = Vec2::ZERO;
    }

    pub fn pointer_up(&self) {
        let mut s = self.state.borrow_mut();
        s.press_origin = None;
        s.snapshot.pressed = false;
        s.snapshot.drag = Vec2::ZERO;
    }

    /// Pointer left the page: velocity and `inside` reset.
    pub fn pointer_leave(&self) {
        let mut s = self.state.borrow_mut();
        s.snapshot.inside = false;
        s.snapshot.velocity = Vec2::ZERO;
        s.last_move = None;
    }

    /// Adds `owner` to the holders of `state`. Pushing twice is a no-op.
    pub fn push_state(&self, state: &str, owner: &Id) {
        let mut s = self.state.borrow_mut();
        s.states
            .entry(state.to_string())
            .or_default()
            .insert(owner.clone());
    }

    /// Removes `owner`'s hold on `state`. Returns whether it held it.
    pub fn pop_state(&self, state: &str, owner: &Id) -> bool {
        let mut s = self.state.borrow_mut();
        let Some(holders) = s.states.get_mut(state) else {
            return false;
        };
        let removed = holders.remove(owner);
        if holders.is_empty() {
            s.states.remove(state);
        }
        removed
    }

    /// Drops every hold `owner` has. Returns how many states it released.
    pub fn release_owner(&self, owner: &Id) -> usize {
        let mut s = self.state.borrow_mut();
        let mut released = 0;
        s.states.retain(|_, holders| {
            if holders.remove(owner) {
                released += 1;
            }
            !holders.is_empty()
        });
        released
    }

    pub fn is_active(&self, state: &str) -> bool {
        self.state.borrow().states.contains_key(state)
    }

    pub fn holders(&self, state: &str) -> usize {
        self.state.borrow().states.get(state).map_or(0, BTreeSet::len)
    }

    /// Active states in name order.
    pub fn active_states(&self) -> Vec<String> {
        self.state.borrow().states.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{PointerBridge, client_to_ndc};
    use crate::camera::Camera;
    use foundation::Id;
    use foundation::bounds::Rect;
    use foundation::math::Vec2;
    use foundation::time::Time;
    use pretty_assertions::assert_eq;

    fn bridge() -> PointerBridge {
        PointerBridge::new(Rect::new(100.0, 50.0, 400.0, 200.0), Camera::default())
    }

    #[test]
    fn client_maps_to_ndc_against_surface_rect() {
        let rect = Rect::new(100.0, 50.0, 400.0, 200.0);
        assert_eq!(client_to_ndc(&rect, 100.0, 50.0), Vec2::new(-1.0, 1.0));
        assert_eq!(client_to_ndc(&rect, 500.0, 250.0), Vec2::new(1.0, -1.0));
        assert_eq!(client_to_ndc(&rect, 300.0, 150.0), Vec2::new(0.0, 0.0));
    }

    #[test]
    fn move_reports_world_point_and_inside() {
        let pointer = bridge();
        let snap = pointer.pointer_move(300.0, 150.0, Time(0.0));
        assert!(snap.inside);
        let world = snap.world.unwrap();
        assert!(world.x.abs() < 1e-9 && world.y.abs() < 1e-9);

        let outside = pointer.pointer_move(0.0, 0.0, Time(0.1));
        assert!(!outside.inside);
    }

    #[test]
    fn drag_and_velocity_follow_motion() {
        let pointer = bridge();
        pointer.pointer_move(300.0, 150.0, Time(0.0));
        pointer.pointer_down(300.0, 150.0);
        let snap = pointer.pointer_move(400.0, 150.0, Time(0.5));
        assert!(snap.pressed);
        assert_eq!(snap.drag, Vec2::new(0.5, 0.0));
        // Raw velocity 1.0/s, smoothed from zero with weight 0.5.
        assert_eq!(snap.velocity, Vec2::new(0.5, 0.0));

        pointer.pointer_up();
        let snap = pointer.snapshot();
        assert!(!snap.pressed);
        assert_eq!(snap.drag, Vec2::ZERO);
    }

    #[test]
    fn shared_state_clears_only_after_every_owner_pops() {
        let pointer = bridge();
        let glass = Id::from("glass");
        let image = Id::from("image");
        pointer.push_state("-media", &glass);
        pointer.push_state("-media", &image);
        pointer.push_state("-media", &glass);
        assert_eq!(pointer.holders("-media"), 2);

        assert!(pointer.pop_state("-media", &glass));
        assert!(pointer.is_active("-media"));
        assert!(!pointer.pop_state("-media", &glass));
        assert!(pointer.is_active("-media"));
        assert!(pointer.pop_state("-media", &image));
        assert!(!pointer.is_active("-media"));
    }

    #[test]
    fn release_owner_drops_all_holds() {
        let pointer = bridge();
        let a = Id::from("a");
        let b = Id::from("b");
        pointer.push_state("-media", &a);
        pointer.push_state("-webgl", &a);
        pointer.push_state("-webgl", &b);
        assert_eq!(pointer.release_owner(&a), 2);
        assert_eq!(pointer.active_states(), vec!["-webgl".to_string()]);
    }
}
