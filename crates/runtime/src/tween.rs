//! Tween engine: id-keyed scalar interpolations driven by the frame clock.
//!
//! At most one tween is live per id. Registering an id that is already
//! animating drops the previous tween silently: its `on_complete` never
//! runs. Effects rely on this to retarget hover and progress scalars
//! mid-flight.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use foundation::Id;
use foundation::math::{clamp01, lerp};
use foundation::time::Time;

use crate::clock::{FrameClock, Subscription, priority};
use crate::easing::Easing;
use crate::frame::Frame;
use crate::scalar::AnimatedScalar;

type UpdateFn = Rc<RefCell<dyn FnMut(f64)>>;
type CompleteFn = Box<dyn FnOnce()>;

#[derive(Debug, Clone, PartialEq)]
pub enum TweenError {
    NonPositiveDuration(f64),
    NonFiniteValue,
    /// A custom easing failed `ease(0) = 0` / `ease(1) = 1`.
    InvalidEasing,
}

impl fmt::Display for TweenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TweenError::NonPositiveDuration(d) => {
                write!(f, "tween duration must be positive, got {d}")
            }
            TweenError::NonFiniteValue => write!(f, "tween endpoints and delay must be finite"),
            TweenError::InvalidEasing => {
                write!(f, "easing must map 0 to 0 and 1 to 1")
            }
        }
    }
}

impl std::error::Error for TweenError {}

/// Optional parameters of [`TweenEngine::animate`].
#[derive(Default)]
pub struct TweenOptions {
    pub ease: Easing,
    /// Seconds to wait before progress starts.
    pub delay: f64,
    /// Mounted content the tween belongs to; see [`TweenEngine::stop_owner`].
    pub owner: Option<Id>,
    on_update: Option<UpdateFn>,
    on_complete: Option<CompleteFn>,
}

impl TweenOptions {
    pub fn ease(mut self, ease: Easing) -> Self {
        self.ease = ease;
        self
    }

    pub fn delay(mut self, seconds: f64) -> Self {
        self.delay = seconds;
        self
    }

    pub fn owner(mut self, owner: impl Into<Id>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn on_update(mut self, f: impl FnMut(f64) + 'static) -> Self {
        self.on_update = Some(Rc::new(RefCell::new(f)));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for TweenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TweenOptions")
            .field("ease", &self.ease)
            .field("delay", &self.delay)
            .field("owner", &self.owner)
            .field("on_update", &self.on_update.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

struct Tween {
    id: Id,
    /// Distinguishes a tween from a later one registered under the same id.
    serial: u64,
    from: f64,
    to: f64,
    duration: f64,
    start: Time,
    ease: Easing,
    owner: Option<Id>,
    current: f64,
    on_update: Option<UpdateFn>,
    on_complete: Option<CompleteFn>,
}

#[derive(Default)]
struct EngineState {
    tweens: Vec<Tween>,
    next_serial: u64,
    now: Time,
}

impl EngineState {
    fn position(&self, id: &Id) -> Option<usize> {
        self.tweens.iter().position(|t| &t.id == id)
    }

    fn is_live(&self, id: &Id, serial: u64) -> bool {
        self.tweens.iter().any(|t| t.serial == serial && &t.id == id)
    }
}

/// Shared handle to a tween registry. Clones refer to the same registry.
#[derive(Clone, Default)]
pub struct TweenEngine {
    state: Rc<RefCell<EngineState>>,
}

impl fmt::Debug for TweenEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("TweenEngine")
            .field("active", &s.tweens.len())
            .field("now", &s.now)
            .finish()
    }
}

impl TweenEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drives this engine from `clock` at the tween tier.
    pub fn attach(&self, clock: &FrameClock) -> Subscription {
        let engine = self.clone();
        clock.subscribe(priority::TWEENS, move |frame| engine.update(frame))
    }

    /// Starts interpolating `from -> to` over `duration` seconds.
    ///
    /// Progress is measured from the last frame this engine saw, plus
    /// `opts.delay`. Any live tween with the same id is dropped without
    /// completing.
    pub fn animate(
        &self,
        id: impl Into<Id>,
        from: f64,
        to: f64,
        duration: f64,
        opts: TweenOptions,
    ) -> Result<(), TweenError> {
        if !(duration > 0.0) || !duration.is_finite() {
            return Err(TweenError::NonPositiveDuration(duration));
        }
        if !from.is_finite() || !to.is_finite() || !opts.delay.is_finite() {
            return Err(TweenError::NonFiniteValue);
        }
        if !opts.ease.validate() {
            return Err(TweenError::InvalidEasing);
        }

        let id = id.into();
        let replaced;
        let mut s = self.state.borrow_mut();
        let serial = s.next_serial;
        s.next_serial += 1;
        let tween = Tween {
            id: id.clone(),
            serial,
            from,
            to,
            duration,
            start: s.now.offset(opts.delay.max(0.0)),
            ease: opts.ease,
            owner: opts.owner,
            current: from,
            on_update: opts.on_update,
            on_complete: opts.on_complete,
        };
        match s.position(&id) {
            Some(pos) => {
                tracing::trace!(tween = %id, "replacing in-flight tween");
                replaced = Some(std::mem::replace(&mut s.tweens[pos], tween));
            }
            None => {
                replaced = None;
                s.tweens.push(tween);
            }
        }
        // Captured state of the dropped tween is released outside the borrow.
        drop(s);
        drop(replaced);
        Ok(())
    }

    /// Tweens `scalar` from its current value toward `to`, writing every
    /// step back into it. Retargeting mid-flight therefore stays continuous.
    pub fn animate_scalar(
        &self,
        id: impl Into<Id>,
        scalar: &AnimatedScalar,
        to: f64,
        duration: f64,
        mut opts: TweenOptions,
    ) -> Result<(), TweenError> {
        let target = scalar.clone();
        let user = opts.on_update.take();
        opts.on_update = Some(Rc::new(RefCell::new(move |v: f64| {
            target.set(v);
            if let Some(user) = &user {
                (*user.borrow_mut())(v);
            }
        })));
        self.animate(id, scalar.get(), to, duration, opts)
    }

    /// Cancels a tween without running its completion. Returns whether one
    /// was live.
    pub fn stop(&self, id: &Id) -> bool {
        let removed = {
            let mut s = self.state.borrow_mut();
            s.position(id).map(|pos| s.tweens.remove(pos))
        };
        removed.is_some()
    }

    /// Cancels every tween registered with `owner`. Returns how many were
    /// cancelled.
    pub fn stop_owner(&self, owner: &Id) -> usize {
        let removed: Vec<Tween> = {
            let mut s = self.state.borrow_mut();
            let (gone, kept) = std::mem::take(&mut s.tweens)
                .into_iter()
                .partition(|t| t.owner.as_ref() == Some(owner));
            s.tweens = kept;
            gone
        };
        removed.len()
    }

    pub fn is_active(&self, id: &Id) -> bool {
        self.state.borrow().position(id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.state.borrow().tweens.len()
    }

    /// Last value produced for `id`.
    pub fn value(&self, id: &Id) -> Option<f64> {
        let s = self.state.borrow();
        s.position(id).map(|pos| s.tweens[pos].current)
    }

    /// Advances every live tween to `frame.time`.
    pub fn update(&self, frame: Frame) {
        let steps: Vec<(Id, u64, f64, Option<UpdateFn>, bool)> = {
            let mut s = self.state.borrow_mut();
            s.now = frame.time;
            let now = frame.time;
            s.tweens
                .iter_mut()
                .filter(|t| now >= t.start)
                .map(|t| {
                    let progress = clamp01(now.since(t.start) / t.duration);
                    t.current = if progress >= 1.0 {
                        t.to
                    } else {
                        lerp(t.from, t.to, t.ease.ease(progress))
                    };
                    (
                        t.id.clone(),
                        t.serial,
                        t.current,
                        t.on_update.clone(),
                        progress >= 1.0,
                    )
                })
                .collect()
        };

        for (id, serial, value, on_update, done) in steps {
            // An earlier callback in this pass may have stopped or replaced it.
            if !self.state.borrow().is_live(&id, serial) {
                continue;
            }
            if let Some(on_update) = on_update {
                match on_update.try_borrow_mut() {
                    Ok(mut cb) => cb(value),
                    Err(_) => tracing::warn!(tween = %id, "tween update callback re-entered"),
                }
            }
            if !done {
                continue;
            }
            let finished = {
                let mut s = self.state.borrow_mut();
                let pos = s
                    .tweens
                    .iter()
                    .position(|t| t.serial == serial && t.id == id);
                pos.map(|pos| s.tweens.remove(pos))
            };
            if let Some(on_complete) = finished.and_then(|t| t.on_complete) {
                on_complete();
            }
        }
    }
}
