//! View registry: page regions that want 3D content, and whether each one
//! currently intersects the viewport.
//!
//! Visibility gates per-frame work for off-screen content; it never gates
//! mounting or unmounting. Scroll and resize notifications only mark the
//! registry dirty; [`ViewRegistry::flush`] recomputes every entry's bounds
//! once, however many notifications arrived since the last flush.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use foundation::Id;
use foundation::bounds::Rect;
use runtime::{FrameClock, Subscription, priority};
use serde::Deserialize;

/// Something on the page whose bounds can be measured (a DOM element in the
/// browser, a fixed rectangle natively or in tests).
pub trait ViewAnchor {
    /// Bounds in viewport (client) coordinates.
    fn bounds(&self) -> Rect;
}

impl ViewAnchor for Rect {
    fn bounds(&self) -> Rect {
        *self
    }
}

impl<T: ViewAnchor + ?Sized> ViewAnchor for Rc<T> {
    fn bounds(&self) -> Rect {
        (**self).bounds()
    }
}

impl<T: ViewAnchor + ?Sized> ViewAnchor for RefCell<T> {
    fn bounds(&self) -> Rect {
        self.borrow().bounds()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewConfig {
    /// Pixels the viewport is grown by before intersection tests.
    pub root_margin: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self { root_margin: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewError {
    DuplicateId(Id),
    UnknownView(Id),
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewError::DuplicateId(id) => write!(f, "view `{id}` is already registered"),
            ViewError::UnknownView(id) => write!(f, "no view registered as `{id}`"),
        }
    }
}

impl std::error::Error for ViewError {}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityChange {
    pub id: Id,
    pub visible: bool,
}

struct ViewEntry {
    anchor: Box<dyn ViewAnchor>,
    bounds: Rect,
    visible: bool,
    serial: u64,
}

struct RegistryState {
    config: ViewConfig,
    viewport: Rect,
    entries: BTreeMap<Id, ViewEntry>,
    dirty: bool,
    recomputations: u64,
    next_serial: u64,
}

impl RegistryState {
    fn test(&self, bounds: &Rect) -> bool {
        bounds.intersects(&self.viewport.inflate(self.config.root_margin))
    }
}

/// Shared handle to the view registry.
#[derive(Clone)]
pub struct ViewRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("ViewRegistry")
            .field("viewport", &s.viewport)
            .field("views", &s.entries.len())
            .field("dirty", &s.dirty)
            .finish()
    }
}

impl ViewRegistry {
    pub fn new(config: ViewConfig, viewport: Rect) -> Self {
        Self {
            state: Rc::new(RefCell::new(RegistryState {
                config,
                viewport,
                entries: BTreeMap::new(),
                dirty: false,
                recomputations: 0,
                next_serial: 0,
            })),
        }
    }

    /// Flushes pending recomputation once per frame at the view tier.
    pub fn attach(&self, clock: &FrameClock) -> Subscription {
        let views = self.clone();
        clock.subscribe(priority::VIEWS, move |_| {
            views.flush();
        })
    }

    /// Measures `anchor` and starts tracking it. Dropping the returned
    /// registration unregisters the view.
    pub fn register_view(
        &self,
        id: impl Into<Id>,
        anchor: impl ViewAnchor + 'static,
    ) -> Result<ViewRegistration, ViewError> {
        let id = id.into();
        let mut s = self.state.borrow_mut();
        if s.entries.contains_key(&id) {
            return Err(ViewError::DuplicateId(id));
        }
        let bounds = anchor.bounds();
        let visible = s.test(&bounds);
        let serial = s.next_serial;
        s.next_serial += 1;
        s.entries.insert(
            id.clone(),
            ViewEntry {
                anchor: Box::new(anchor),
                bounds,
                visible,
                serial,
            },
        );
        tracing::trace!(view = %id, visible, "view registered");
        Ok(ViewRegistration {
            registry: Rc::downgrade(&self.state),
            id,
            serial,
            active: true,
        })
    }

    pub fn unregister(&self, id: &Id) -> bool {
        let removed = self.state.borrow_mut().entries.remove(id);
        removed.is_some()
    }

    /// Applies an observer-pushed intersection signal directly.
    pub fn set_intersecting(
        &self,
        id: &Id,
        intersecting: bool,
    ) -> Result<Option<VisibilityChange>, ViewError> {
        let mut s = self.state.borrow_mut();
        let entry = s
            .entries
            .get_mut(id)
            .ok_or_else(|| ViewError::UnknownView(id.clone()))?;
        if entry.visible == intersecting {
            return Ok(None);
        }
        entry.visible = intersecting;
        Ok(Some(VisibilityChange {
            id: id.clone(),
            visible: intersecting,
        }))
    }

    pub fn set_viewport(&self, viewport: Rect) {
        let mut s = self.state.borrow_mut();
        s.viewport = viewport;
        s.dirty = true;
    }

    pub fn notify_scroll(&self) {
        self.state.borrow_mut().dirty = true;
    }

    pub fn notify_resize(&self, viewport: Rect) {
        self.set_viewport(viewport);
    }

    pub fn is_dirty(&self) -> bool {
        self.state.borrow().dirty
    }

    /// Re-measures every anchor if anything changed since the last flush and
    /// returns the entries whose visibility flipped, in id order.
    pub fn flush(&self) -> Vec<VisibilityChange> {
        let mut s = self.state.borrow_mut();
        if !s.dirty {
            return Vec::new();
        }
        s.dirty = false;
        s.recomputations += 1;

        let viewport = s.viewport.inflate(s.config.root_margin);
        let mut changes = Vec::new();
        for (id, entry) in s.entries.iter_mut() {
            entry.bounds = entry.anchor.bounds();
            let visible = entry.bounds.intersects(&viewport);
            if visible != entry.visible {
                entry.visible = visible;
                changes.push(VisibilityChange {
                    id: id.clone(),
                    visible,
                });
            }
        }
        if !changes.is_empty() {
            tracing::debug!(changed = changes.len(), "view visibility updated");
        }
        changes
    }

    /// Ids of views currently intersecting the viewport, in id order.
    pub fn visible_views(&self) -> Vec<Id> {
        self.state
            .borrow()
            .entries
            .iter()
            .filter(|(_, e)| e.visible)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Unknown views count as not visible.
    pub fn is_visible(&self, id: &Id) -> bool {
        self.state
            .borrow()
            .entries
            .get(id)
            .is_some_and(|e| e.visible)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.state.borrow().entries.contains_key(id)
    }

    pub fn bounds(&self, id: &Id) -> Option<Rect> {
        self.state.borrow().entries.get(id).map(|e| e.bounds)
    }

    pub fn viewport(&self) -> Rect {
        self.state.borrow().viewport
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of full bounds recomputations performed so far.
    pub fn recomputations(&self) -> u64 {
        self.state.borrow().recomputations
    }
}

/// RAII guard returned by [`ViewRegistry::register_view`].
#[must_use = "dropping a ViewRegistration unregisters the view"]
pub struct ViewRegistration {
    registry: Weak<RefCell<RegistryState>>,
    id: Id,
    serial: u64,
    active: bool,
}

impl ViewRegistration {
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let Some(state) = self.registry.upgrade() else {
            return;
        };
        let removed = {
            let mut s = state.borrow_mut();
            // Only remove the entry this guard created.
            if s.entries.get(&self.id).is_some_and(|e| e.serial == self.serial) {
                s.entries.remove(&self.id)
            } else {
                None
            }
        };
        drop(removed);
    }
}

impl Drop for ViewRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ViewRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewRegistration")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ViewConfig, ViewError, ViewRegistry, VisibilityChange};
    use foundation::Id;
    use foundation::bounds::Rect;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn registry() -> ViewRegistry {
        ViewRegistry::new(ViewConfig::default(), Rect::from_size(800.0, 600.0))
    }

    #[test]
    fn visible_views_excludes_off_screen_entries() {
        let views = registry();
        let _a = views
            .register_view("hero", Rect::new(0.0, 0.0, 800.0, 400.0))
            .unwrap();
        let _b = views
            .register_view("footer", Rect::new(0.0, 2000.0, 800.0, 300.0))
            .unwrap();
        assert_eq!(views.visible_views(), vec![Id::from("hero")]);
        assert!(!views.is_visible(&Id::from("footer")));
        assert!(!views.is_visible(&Id::from("missing")));
    }

    #[test]
    fn visibility_flips_when_bounds_cross_viewport_edge() {
        let views = registry();
        // A scrolling element: tests move it by writing through the shared cell.
        let el = Rc::new(RefCell::new(Rect::new(0.0, 700.0, 800.0, 200.0)));
        let _reg = views.register_view("gallery", Rc::clone(&el)).unwrap();
        assert!(!views.is_visible(&Id::from("gallery")));

        *el.borrow_mut() = Rect::new(0.0, 500.0, 800.0, 200.0);
        views.notify_scroll();
        assert_eq!(
            views.flush(),
            vec![VisibilityChange {
                id: Id::from("gallery"),
                visible: true
            }]
        );

        *el.borrow_mut() = Rect::new(0.0, -250.0, 800.0, 200.0);
        views.notify_scroll();
        let changes = views.flush();
        assert_eq!(changes.len(), 1);
        assert!(!changes[0].visible);
        assert!(views.visible_views().is_empty());
    }

    #[test]
    fn scroll_notifications_are_coalesced() {
        let views = registry();
        let _reg = views.register_view("a", Rect::from_size(10.0, 10.0)).unwrap();
        for _ in 0..50 {
            views.notify_scroll();
        }
        views.notify_resize(Rect::from_size(1024.0, 768.0));
        assert!(views.is_dirty());
        views.flush();
        assert!(!views.is_dirty());
        views.flush();
        assert_eq!(views.recomputations(), 1);
    }

    #[test]
    fn root_margin_extends_the_viewport() {
        let views = ViewRegistry::new(
            ViewConfig { root_margin: 200.0 },
            Rect::from_size(800.0, 600.0),
        );
        let _reg = views
            .register_view("below", Rect::new(0.0, 700.0, 800.0, 100.0))
            .unwrap();
        assert!(views.is_visible(&Id::from("below")));
    }

    #[test]
    fn observer_signal_is_applied_directly() {
        let views = registry();
        let _reg = views.register_view("a", Rect::from_size(10.0, 10.0)).unwrap();
        let id = Id::from("a");
        assert_eq!(views.set_intersecting(&id, true).unwrap(), None);
        assert_eq!(
            views.set_intersecting(&id, false).unwrap(),
            Some(VisibilityChange {
                id: id.clone(),
                visible: false
            })
        );
        assert!(!views.is_visible(&id));
        assert_eq!(
            views.set_intersecting(&Id::from("b"), true),
            Err(ViewError::UnknownView(Id::from("b")))
        );
    }

    #[test]
    fn ids_are_unique_and_registration_drop_unregisters() {
        let views = registry();
        let reg = views.register_view("a", Rect::from_size(10.0, 10.0)).unwrap();
        assert_eq!(
            views.register_view("a", Rect::from_size(5.0, 5.0)).unwrap_err(),
            ViewError::DuplicateId(Id::from("a"))
        );
        drop(reg);
        assert!(views.is_empty());
        let again = views.register_view("a", Rect::from_size(5.0, 5.0)).unwrap();
        assert_eq!(views.len(), 1);
        again.cancel();
        assert!(views.is_empty());
    }

    #[test]
    fn stale_registration_does_not_remove_newer_entry() {
        let views = registry();
        let old = views.register_view("a", Rect::from_size(10.0, 10.0)).unwrap();
        assert!(views.unregister(&Id::from("a")));
        let _new = views.register_view("a", Rect::from_size(10.0, 10.0)).unwrap();
        drop(old);
        assert!(views.contains(&Id::from("a")));
    }
}
