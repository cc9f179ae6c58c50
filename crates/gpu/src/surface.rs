//! The shared render surface.
//!
//! Exactly one surface exists per thread (the browser's UI thread). It owns
//! the scene graph every mounted block contributes to, the camera, the GPU
//! resource table and the draw backend. Mounting lives in [`crate::mount`].
//!
//! Drawing is driven by the frame clock at [`priority::RENDER`], after every
//! update tier. A tick draws when the surface was invalidated since the
//! previous draw, or when continuous mode is on and reduced motion is off.
//! Any number of [`SharedSurface::invalidate`] calls within one tick
//! coalesce into a single draw.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use foundation::Id;
use foundation::math::Vec2;
use runtime::{EventBus, Frame, FrameClock, Subscription, priority};
use scene::components::ResourceId;
use scene::graph::SceneGraph;
use scene::{Camera, ViewRegistry};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::backend::{BackendError, DrawBackend};
use crate::mount::MountRecord;
use crate::renderer::{MountSlot, RenderFrame, Renderer, SurfaceSize};
use crate::resources::{ResourceTable, TextureData, TextureState};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SurfaceConfig {
    /// Draw every tick instead of only after an invalidation.
    pub continuous: bool,
    pub max_pixel_ratio: f64,
    /// Suppresses continuous drawing and freezes effect time.
    pub reduced_motion: bool,
    /// Duplicate mount ids panic instead of replacing the earlier mount.
    pub strict_mounts: bool,
    pub clear_color: [f32; 4],
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            max_pixel_ratio: 2.0,
            reduced_motion: false,
            strict_mounts: cfg!(debug_assertions),
            clear_color: [0.0; 4],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceError {
    Backend(BackendError),
    InvalidSize { width: f64, height: f64 },
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::Backend(err) => write!(f, "draw backend unavailable: {err}"),
            SurfaceError::InvalidSize { width, height } => {
                write!(f, "invalid surface size {width}x{height}")
            }
        }
    }
}

impl std::error::Error for SurfaceError {}

impl From<BackendError> for SurfaceError {
    fn from(err: BackendError) -> Self {
        SurfaceError::Backend(err)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames_drawn: u64,
    /// Ticks on which nothing was invalidated.
    pub ticks_skipped: u64,
    pub draw_failures: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Mounted(Id),
    Unmounted(Id),
    /// A duplicate mount id replaced the earlier content.
    Replaced(Id),
    Drew { commands: usize },
    ResourceFailed { id: ResourceId, reason: String },
}

pub(crate) struct SurfaceState {
    pub(crate) config: SurfaceConfig,
    pub(crate) size: SurfaceSize,
    pub(crate) camera: Camera,
    pub(crate) graph: SceneGraph,
    pub(crate) backend: Box<dyn DrawBackend>,
    pub(crate) resources: ResourceTable,
    pub(crate) mounts: BTreeMap<Id, MountRecord>,
    pub(crate) next_seq: u64,
    pub(crate) next_generation: u64,
    /// Texture sources waiting for the host to fetch them.
    pub(crate) pending_loads: Vec<(ResourceId, String)>,
    pub(crate) views: Option<ViewRegistry>,
    pub(crate) stats: RenderStats,
    pub(crate) events: EventBus<SurfaceEvent>,
    /// Index of the last clock frame seen; tags events.
    pub(crate) frame_index: u64,
    draw_failing: bool,
}

pub(crate) struct SurfaceInner {
    pub(crate) state: RefCell<SurfaceState>,
    pub(crate) invalidated: Cell<bool>,
    /// Unmounts requested while the state was borrowed; applied on the next
    /// draw tick.
    pub(crate) deferred_unmounts: RefCell<Vec<(Id, u64)>>,
}

thread_local! {
    static CURRENT: RefCell<Weak<SurfaceInner>> = const { RefCell::new(Weak::new()) };
}

/// Shared handle to the render surface. Clones refer to the same surface.
#[derive(Clone)]
pub struct SharedSurface {
    pub(crate) inner: Rc<SurfaceInner>,
}

impl fmt::Debug for SharedSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.inner.state.borrow();
        f.debug_struct("SharedSurface")
            .field("size", &s.size)
            .field("mounts", &s.mounts.len())
            .field("invalidated", &self.inner.invalidated.get())
            .field("stats", &s.stats)
            .finish()
    }
}

impl SharedSurface {
    /// Returns the live surface, creating it on first use.
    ///
    /// `backend` is only called when no surface exists yet; a second
    /// acquisition reuses the existing surface and ignores `config`.
    pub fn acquire<F>(config: SurfaceConfig, backend: F) -> Result<Self, SurfaceError>
    where
        F: FnOnce() -> Result<Box<dyn DrawBackend>, BackendError>,
    {
        if let Some(existing) = Self::current() {
            debug!("render surface already exists; reusing it");
            return Ok(existing);
        }
        let backend = backend()?;
        let size = SurfaceSize::default();
        let mut camera = Camera::default();
        camera.set_viewport(size.width, size.height);
        let inner = Rc::new(SurfaceInner {
            state: RefCell::new(SurfaceState {
                config,
                size,
                camera,
                graph: SceneGraph::new(),
                backend,
                resources: ResourceTable::new(),
                mounts: BTreeMap::new(),
                next_seq: 0,
                next_generation: 0,
                pending_loads: Vec::new(),
                views: None,
                stats: RenderStats::default(),
                events: EventBus::new(),
                frame_index: 0,
                draw_failing: false,
            }),
            invalidated: Cell::new(true),
            deferred_unmounts: RefCell::new(Vec::new()),
        });
        CURRENT.with(|current| *current.borrow_mut() = Rc::downgrade(&inner));
        Ok(Self { inner })
    }

    /// The live surface on this thread, if any.
    pub fn current() -> Option<Self> {
        CURRENT
            .with(|current| current.borrow().upgrade())
            .map(|inner| Self { inner })
    }

    /// Requests a draw on the next render tick. Idempotent.
    pub fn invalidate(&self) {
        self.inner.invalidated.set(true);
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.get()
    }

    /// Subscribes the render loop to `clock`. Dropping the subscription
    /// stops drawing; the surface itself stays alive.
    pub fn start(&self, clock: &FrameClock) -> Subscription {
        let weak = Rc::downgrade(&self.inner);
        clock.subscribe(priority::RENDER, move |frame| {
            if let Some(inner) = weak.upgrade() {
                SharedSurface { inner }.render(frame);
            }
        })
    }

    /// One render-loop step. Public so hosts without a clock can drive it.
    pub fn render(&self, frame: Frame) {
        self.apply_deferred_unmounts();
        let should_draw = {
            let mut s = self.inner.state.borrow_mut();
            s.frame_index = frame.index;
            let continuous = s.config.continuous && !s.config.reduced_motion;
            let draw = self.inner.invalidated.get() || continuous;
            if !draw {
                s.stats.ticks_skipped += 1;
            }
            draw
        };
        if should_draw {
            self.inner.invalidated.set(false);
            self.draw_now();
        }
    }

    fn draw_now(&self) {
        let mut guard = self.inner.state.borrow_mut();
        let s = &mut *guard;
        let slots: BTreeMap<Id, MountSlot> = s
            .mounts
            .iter()
            .map(|(id, record)| {
                let on_screen = match (&record.view, &s.views) {
                    // Views the registry does not know about never cull.
                    (Some(view), Some(views)) => !views.contains(view) || views.is_visible(view),
                    _ => true,
                };
                let slot = MountSlot {
                    z_order: record.z_order,
                    seq: record.seq,
                    on_screen,
                };
                (id.clone(), slot)
            })
            .collect();
        let (commands, culled) = Renderer::collect(&s.graph, &slots);
        let frame = RenderFrame {
            index: s.frame_index,
            size: s.size,
            clear_color: s.config.clear_color,
            view_proj: s.camera.view_proj().to_f32(),
            commands,
            culled,
        };
        match s.backend.draw(&frame) {
            Ok(()) => {
                s.stats.frames_drawn += 1;
                s.draw_failing = false;
                let index = s.frame_index;
                s.events.emit(
                    index,
                    SurfaceEvent::Drew {
                        commands: frame.commands.len(),
                    },
                );
            }
            Err(err) => {
                s.stats.draw_failures += 1;
                if !s.draw_failing {
                    error!(frame = s.frame_index, error = %err, "draw failed; render loop continues");
                    s.draw_failing = true;
                }
            }
        }
    }

    fn apply_deferred_unmounts(&self) {
        let deferred = std::mem::take(&mut *self.inner.deferred_unmounts.borrow_mut());
        for (id, generation) in deferred {
            self.unmount_generation(&id, Some(generation));
        }
    }

    /// Sets the logical size and pixel ratio, then forces a redraw. The
    /// ratio is clamped to `max_pixel_ratio`.
    pub fn resize(&self, width: f64, height: f64, pixel_ratio: f64) -> Result<SurfaceSize, SurfaceError> {
        if !width.is_finite() || !height.is_finite() || width < 0.0 || height < 0.0 {
            return Err(SurfaceError::InvalidSize { width, height });
        }
        let size = {
            let mut s = self.inner.state.borrow_mut();
            let ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
                pixel_ratio.min(s.config.max_pixel_ratio.max(1.0))
            } else {
                1.0
            };
            let size = SurfaceSize::new(width, height, ratio);
            s.size = size;
            s.camera.set_viewport(width, height);
            s.backend.resize(size);
            size
        };
        self.invalidate();
        Ok(size)
    }

    pub fn size(&self) -> SurfaceSize {
        self.inner.state.borrow().size
    }

    pub fn camera(&self) -> Camera {
        self.inner.state.borrow().camera
    }

    /// Owner of the nearest quad under `ndc`.
    pub fn pick(&self, ndc: Vec2) -> Option<Id> {
        let state = self.inner.state.borrow();
        let ray = state.camera.unproject(ndc)?;
        scene::pick(&state.graph, ray)?.owner
    }

    pub fn set_camera(&self, camera: Camera) {
        self.inner.state.borrow_mut().camera = camera;
        self.invalidate();
    }

    pub fn set_continuous(&self, continuous: bool) {
        self.inner.state.borrow_mut().config.continuous = continuous;
        self.invalidate();
    }

    pub fn set_reduced_motion(&self, reduced: bool) {
        self.inner.state.borrow_mut().config.reduced_motion = reduced;
        self.invalidate();
    }

    pub fn reduced_motion(&self) -> bool {
        self.inner.state.borrow().config.reduced_motion
    }

    pub fn config(&self) -> SurfaceConfig {
        self.inner.state.borrow().config.clone()
    }

    /// Lets the draw skip mounts whose view is off-screen.
    pub fn set_views(&self, views: ViewRegistry) {
        self.inner.state.borrow_mut().views = Some(views);
    }

    pub fn stats(&self) -> RenderStats {
        self.inner.state.borrow().stats
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.inner
            .state
            .borrow()
            .events
            .events()
            .map(|e| e.kind.clone())
            .collect()
    }

    /// Texture sources registered since the last call, for the host to
    /// fetch and hand back through [`SharedSurface::complete_texture`].
    pub fn take_pending_loads(&self) -> Vec<(ResourceId, String)> {
        std::mem::take(&mut self.inner.state.borrow_mut().pending_loads)
    }

    pub fn texture_state(&self, id: ResourceId) -> Option<TextureState> {
        self.inner.state.borrow().resources.texture_state(id).cloned()
    }

    /// Finishes an out-of-band texture load and requests a redraw.
    ///
    /// Failures (fetch, decode or upload) are logged once and recorded as
    /// [`TextureState::Failed`]. Returns `false` when the texture is no longer
    /// loading, e.g. because its owner unmounted meanwhile.
    pub fn complete_texture(&self, id: ResourceId, result: Result<TextureData, String>) -> bool {
        let completed = {
            let mut guard = self.inner.state.borrow_mut();
            let s = &mut *guard;
            let Some(entry) = s.resources.get(id) else {
                debug!(resource = %id, "texture completed after its owner unmounted");
                return false;
            };
            if entry.texture != Some(TextureState::Loading) {
                return false;
            }
            let owner = entry.owner.clone();
            let state = match result {
                Ok(data) => match s.backend.upload_texture(id, &data) {
                    Ok(()) => TextureState::Ready {
                        width: data.width,
                        height: data.height,
                    },
                    Err(err) => TextureState::Failed(err.to_string()),
                },
                Err(reason) => TextureState::Failed(reason),
            };
            if let TextureState::Failed(reason) = &state {
                warn!(resource = %id, owner = %owner, %reason, "texture failed to load; using fallback");
                let index = s.frame_index;
                s.events.emit(
                    index,
                    SurfaceEvent::ResourceFailed {
                        id,
                        reason: reason.clone(),
                    },
                );
            }
            s.resources.complete_texture(id, state)
        };
        self.invalidate();
        completed
    }
}
