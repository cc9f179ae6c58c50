//! [`Stage`]: the explicit context object a page creates once and threads
//! through every block. It bundles the frame clock, the animation engines,
//! the view registry, the pointer bridge and the shared surface, and wires
//! them to one another.

use std::fmt;

use foundation::Id;
use foundation::bounds::Rect;
use foundation::time::Time;
use runtime::{ClockConfig, Frame, FrameClock, Subscription, Timelines, TweenEngine, priority};
use scene::graph::SceneNode;
use scene::{PointerBridge, ViewConfig, ViewError, ViewRegistry};
use serde::Deserialize;

use crate::backend::{BackendError, DrawBackend};
use crate::mount::{MountError, MountHandle, MountOptions};
use crate::surface::{SharedSurface, SurfaceConfig, SurfaceError};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StageConfig {
    pub clock: ClockConfig,
    pub surface: SurfaceConfig,
    pub views: ViewConfig,
}

pub struct Stage {
    clock: FrameClock,
    tweens: TweenEngine,
    timelines: Timelines,
    views: ViewRegistry,
    pointer: PointerBridge,
    surface: SharedSurface,
    _subscriptions: Vec<Subscription>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("clock", &self.clock)
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

impl Stage {
    pub fn new<F>(config: StageConfig, backend: F) -> Result<Self, SurfaceError>
    where
        F: FnOnce() -> Result<Box<dyn DrawBackend>, BackendError>,
    {
        let surface = SharedSurface::acquire(config.surface, backend)?;
        let size = surface.size();
        let viewport = Rect::from_size(size.width, size.height);

        let clock = FrameClock::new(config.clock);
        let tweens = TweenEngine::new();
        let timelines = Timelines::new();
        let views = ViewRegistry::new(config.views, viewport);
        let pointer = PointerBridge::new(viewport, surface.camera());
        surface.set_views(views.clone());

        let flush = {
            let views = views.clone();
            let surface = surface.clone();
            clock.subscribe(priority::VIEWS, move |_| {
                if !views.flush().is_empty() {
                    surface.invalidate();
                }
            })
        };
        let subscriptions = vec![
            flush,
            timelines.attach(&clock),
            tweens.attach(&clock),
            surface.start(&clock),
        ];

        Ok(Self {
            clock,
            tweens,
            timelines,
            views,
            pointer,
            surface,
            _subscriptions: subscriptions,
        })
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn tweens(&self) -> &TweenEngine {
        &self.tweens
    }

    pub fn timelines(&self) -> &Timelines {
        &self.timelines
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn pointer(&self) -> &PointerBridge {
        &self.pointer
    }

    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    /// Mounts content whose tweens (by owner) and pointer states are
    /// cancelled when it unmounts.
    pub fn mount(
        &self,
        id: impl Into<Id>,
        content: SceneNode,
        opts: MountOptions,
    ) -> Result<MountHandle, MountError> {
        let handle = self.surface.mount(id, content, opts)?;
        let tweens = self.tweens.clone();
        let pointer = self.pointer.clone();
        handle.on_unmount(move |owner| {
            tweens.stop_owner(owner);
            pointer.release_owner(owner);
        })?;
        Ok(handle)
    }

    /// Advances everything by one display frame.
    pub fn frame(&self, now: Time) -> Option<Frame> {
        self.clock.tick(now)
    }

    pub fn resize(&self, width: f64, height: f64, pixel_ratio: f64) -> Result<(), SurfaceError> {
        self.surface.resize(width, height, pixel_ratio)?;
        let viewport = Rect::from_size(width, height);
        self.views.notify_resize(viewport);
        self.pointer.set_surface_rect(viewport);
        self.pointer.set_camera(self.surface.camera());
        Ok(())
    }

    pub fn scroll(&self) {
        self.views.notify_scroll();
    }

    /// Mounted content under the pointer's last position.
    pub fn hit_test(&self) -> Option<Id> {
        let pointer = self.pointer.snapshot();
        if !pointer.inside {
            return None;
        }
        self.surface.pick(pointer.ndc)
    }

    /// Applies an observer-pushed visibility signal; a flip requests a draw.
    pub fn set_view_intersecting(&self, id: &Id, intersecting: bool) -> Result<(), ViewError> {
        if self.views.set_intersecting(id, intersecting)?.is_some() {
            self.surface.invalidate();
        }
        Ok(())
    }

    /// Whether per-frame work for content anchored to `view` should run.
    /// Unknown views count as visible.
    pub fn is_view_visible(&self, view: &Id) -> bool {
        !self.views.contains(view) || self.views.is_visible(view)
    }

    pub fn set_reduced_motion(&self, reduced: bool) {
        self.surface.set_reduced_motion(reduced);
    }

    pub fn reduced_motion(&self) -> bool {
        self.surface.reduced_motion()
    }
}

#[cfg(test)]
mod tests {
    use super::{Stage, StageConfig};
    use crate::backend::{DrawBackend, RecordingBackend};
    use crate::mount::MountOptions;
    use crate::surface::SurfaceConfig;
    use foundation::Id;
    use foundation::bounds::Rect;
    use foundation::math::Vec2;
    use foundation::time::Time;
    use pretty_assertions::assert_eq;
    use runtime::TweenOptions;
    use scene::components::{Drawable, UniformSet};
    use scene::graph::SceneNode;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn stage() -> (Stage, RecordingBackend) {
        let probe = RecordingBackend::new();
        let backend = probe.clone();
        let config = StageConfig {
            surface: SurfaceConfig {
                strict_mounts: false,
                ..SurfaceConfig::default()
            },
            ..StageConfig::default()
        };
        let stage = Stage::new(config, move || Ok(Box::new(backend) as Box<dyn DrawBackend>)).unwrap();
        (stage, probe)
    }

    fn quad() -> SceneNode {
        SceneNode::new(Drawable::quad("glass", Vec2::new(1.0, 1.0), UniformSet::default()))
    }

    #[test]
    fn unmount_mid_tween_silences_its_callbacks() {
        let (stage, _probe) = stage();
        let handle = stage.mount("card", quad(), MountOptions::default()).unwrap();
        let calls = Rc::new(Cell::new(0usize));
        let completions = Rc::new(Cell::new(0usize));
        let (c, done) = (calls.clone(), completions.clone());
        stage
            .tweens()
            .animate(
                "card/hover",
                0.0,
                1.0,
                1.0,
                TweenOptions::default()
                    .owner("card")
                    .on_update(move |_| c.set(c.get() + 1))
                    .on_complete(move || done.set(done.get() + 1)),
            )
            .unwrap();

        stage.frame(Time(0.0));
        stage.frame(Time(0.05));
        assert!(calls.get() > 0);

        drop(handle);
        let seen = calls.get();
        for i in 2..40 {
            stage.frame(Time(i as f64 * 0.05));
        }
        assert_eq!(calls.get(), seen);
        assert_eq!(completions.get(), 0);
        assert!(!stage.tweens().is_active(&Id::from("card/hover")));
        assert_eq!(stage.surface().node_count(), 1);
    }

    #[test]
    fn unmount_releases_pointer_states() {
        let (stage, _probe) = stage();
        let handle = stage.mount("card", quad(), MountOptions::default()).unwrap();
        stage.pointer().push_state("-media", handle.id());
        stage.pointer().push_state("-media", &Id::from("other"));
        drop(handle);
        assert!(stage.pointer().is_active("-media"));
        assert_eq!(stage.pointer().holders("-media"), 1);
    }

    #[test]
    fn scrolling_a_view_out_redraws_without_it() {
        let (stage, probe) = stage();
        stage.resize(800.0, 600.0, 1.0).unwrap();
        let anchor = Rc::new(RefCell::new(Rect::new(0.0, 100.0, 800.0, 200.0)));
        let _view = stage.views().register_view("hero", anchor.clone()).unwrap();
        let _handle = stage
            .mount("hero", quad(), MountOptions::default().view("hero"))
            .unwrap();
        stage.frame(Time(0.0));
        assert_eq!(probe.last_frame().unwrap().commands.len(), 1);

        *anchor.borrow_mut() = Rect::new(0.0, -900.0, 800.0, 200.0);
        stage.scroll();
        stage.frame(Time(0.016));
        assert!(!stage.is_view_visible(&Id::from("hero")));
        assert!(probe.last_frame().unwrap().commands.is_empty());
    }

    #[test]
    fn resize_updates_pointer_mapping() {
        let (stage, _probe) = stage();
        stage.resize(400.0, 200.0, 1.0).unwrap();
        let snap = stage.pointer().pointer_move(200.0, 100.0, Time(0.0));
        assert_eq!(snap.ndc, Vec2::new(0.0, 0.0));
        assert!(snap.inside);
    }

    #[test]
    fn hit_test_finds_the_mount_under_the_pointer() {
        let (stage, _probe) = stage();
        stage.resize(800.0, 600.0, 1.0).unwrap();
        let _card = stage.mount("card", quad(), MountOptions::default()).unwrap();

        stage.pointer().pointer_move(400.0, 300.0, Time(0.0));
        assert_eq!(stage.hit_test(), Some(Id::from("card")));
        stage.pointer().pointer_move(10.0, 10.0, Time(0.1));
        assert_eq!(stage.hit_test(), None);
        stage.pointer().pointer_move(-50.0, 300.0, Time(0.2));
        assert_eq!(stage.hit_test(), None);
    }

    #[test]
    fn config_parses_nested_sections() {
        let config: StageConfig = serde_json::from_str(
            r#"{"clock":{"maxDelta":0.05},"surface":{"continuous":true},"views":{"rootMargin":100}}"#,
        )
        .unwrap();
        assert_eq!(config.clock.max_delta, 0.05);
        assert!(config.surface.continuous);
        assert_eq!(config.views.root_margin, 100.0);
    }
}
