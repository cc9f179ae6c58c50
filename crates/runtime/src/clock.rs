//! Process-wide frame clock.
//!
//! [`FrameClock`] is ticked once per display refresh by the host (the web
//! app forwards its `requestAnimationFrame` timestamp) and fans the resulting
//! [`Frame`] out to every subscribed listener.
//!
//! Ordering contract:
//! - Listeners run in ascending `priority`; ties run in subscription order.
//! - A listener subscribed during a tick first runs on the next tick.
//! - A listener unsubscribed during a tick is not invoked later in that tick.
//!
//! While paused, ticks invoke nothing and clock time does not advance, so
//! resuming never produces a catch-up burst.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use foundation::time::Time;
use serde::Deserialize;

use crate::frame::Frame;

/// Fixed listener tiers. Lower runs earlier in a tick.
pub mod priority {
    /// View visibility recomputation.
    pub const VIEWS: i32 = -300;
    /// Timeline cursors and markers.
    pub const TIMELINES: i32 = -200;
    /// Tween interpolation.
    pub const TWEENS: i32 = -100;
    /// Effect primitives writing their uniforms.
    pub const EFFECTS: i32 = 0;
    /// The shared surface's draw. Always after every update tier.
    pub const RENDER: i32 = 1000;
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClockConfig {
    /// Upper bound on a single tick's delta (seconds).
    pub max_delta: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { max_delta: 0.1 }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

type Callback = Rc<RefCell<dyn FnMut(Frame)>>;

struct Listener {
    id: ListenerId,
    priority: i32,
    callback: Callback,
}

struct ClockState {
    config: ClockConfig,
    /// Sorted by `(priority, id)`; ids are issued in subscription order.
    listeners: Vec<Listener>,
    /// Subscribed during the current tick; merged once it ends.
    pending: Vec<Listener>,
    next_id: u64,
    last_host: Option<Time>,
    frame: Frame,
    ticks: u64,
    paused: bool,
    ticking: bool,
}

impl ClockState {
    fn insert_sorted(&mut self, listener: Listener) {
        let key = (listener.priority, listener.id);
        let at = self
            .listeners
            .partition_point(|l| (l.priority, l.id) <= key);
        self.listeners.insert(at, listener);
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        if let Some(pos) = self.listeners.iter().position(|l| l.id == id) {
            self.listeners.remove(pos);
            return true;
        }
        if let Some(pos) = self.pending.iter().position(|l| l.id == id) {
            self.pending.remove(pos);
            return true;
        }
        false
    }

    fn is_live(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|l| l.id == id)
    }
}

/// Closes a tick, including one a listener panicked out of: clears the
/// ticking flag and merges listeners subscribed during it.
struct TickEnd<'a>(&'a RefCell<ClockState>);

impl Drop for TickEnd<'_> {
    fn drop(&mut self) {
        let Ok(mut s) = self.0.try_borrow_mut() else {
            return;
        };
        s.ticking = false;
        let pending = std::mem::take(&mut s.pending);
        for listener in pending {
            s.insert_sorted(listener);
        }
    }
}

/// Shared handle to the frame clock. Clones refer to the same clock.
#[derive(Clone)]
pub struct FrameClock {
    state: Rc<RefCell<ClockState>>,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(ClockConfig::default())
    }
}

impl fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("FrameClock")
            .field("listeners", &s.listeners.len())
            .field("pending", &s.pending.len())
            .field("frame", &s.frame)
            .field("paused", &s.paused)
            .finish()
    }
}

impl FrameClock {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(ClockState {
                config,
                listeners: Vec::new(),
                pending: Vec::new(),
                next_id: 0,
                last_host: None,
                frame: Frame::start(),
                ticks: 0,
                paused: false,
                ticking: false,
            })),
        }
    }

    /// Registers `callback` at `priority`. Dropping the returned
    /// [`Subscription`] unsubscribes it.
    pub fn subscribe(
        &self,
        priority: i32,
        callback: impl FnMut(Frame) + 'static,
    ) -> Subscription {
        let mut s = self.state.borrow_mut();
        let id = ListenerId(s.next_id);
        s.next_id += 1;
        let listener = Listener {
            id,
            priority,
            callback: Rc::new(RefCell::new(callback)),
        };
        if s.ticking {
            s.pending.push(listener);
        } else {
            s.insert_sorted(listener);
        }
        Subscription {
            clock: Rc::downgrade(&self.state),
            id,
            active: true,
        }
    }

    /// Advances the clock to host time `now` and runs every listener once.
    ///
    /// Returns the delivered frame, or `None` when paused or when called
    /// re-entrantly from inside a listener.
    pub fn tick(&self, now: Time) -> Option<Frame> {
        let (frame, snapshot) = {
            let mut s = self.state.borrow_mut();
            if s.ticking {
                tracing::warn!("frame clock ticked re-entrantly; nested tick ignored");
                return None;
            }
            let delta = s.last_host.map(|prev| now.since(prev)).unwrap_or(0.0);
            s.last_host = Some(now);
            if s.paused {
                return None;
            }

            let dt = delta.min(s.config.max_delta.max(0.0));
            let frame = Frame {
                index: s.ticks,
                dt_s: dt,
                time: s.frame.time.offset(dt),
            };
            s.ticks += 1;
            s.frame = frame;
            s.ticking = true;

            let snapshot: Vec<(ListenerId, Callback)> = s
                .listeners
                .iter()
                .map(|l| (l.id, Rc::clone(&l.callback)))
                .collect();
            (frame, snapshot)
        };

        let _end = TickEnd(&self.state);
        for (id, callback) in snapshot {
            if !self.state.borrow().is_live(id) {
                continue;
            }
            match callback.try_borrow_mut() {
                Ok(mut cb) => cb(frame),
                Err(_) => tracing::warn!(listener = id.0, "clock listener is already running"),
            }
        }
        Some(frame)
    }

    pub fn pause(&self) {
        self.state.borrow_mut().paused = true;
    }

    /// Resumes ticking. The first tick after resuming has a zero delta.
    pub fn resume(&self) {
        let mut s = self.state.borrow_mut();
        if s.paused {
            s.paused = false;
            s.last_host = None;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    /// The most recently delivered frame.
    pub fn frame(&self) -> Frame {
        self.state.borrow().frame
    }

    pub fn listener_count(&self) -> usize {
        let s = self.state.borrow();
        s.listeners.len() + s.pending.len()
    }
}

/// RAII guard for a clock listener.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    clock: Weak<RefCell<ClockState>>,
    id: ListenerId,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active && self.clock.strong_count() > 0
    }

    /// Unsubscribes now. Equivalent to dropping the guard.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(state) = self.clock.upgrade() {
            state.borrow_mut().remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ClockConfig, FrameClock, Subscription, priority};
    use foundation::time::Time;
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> impl FnMut(super::Frame) + use<> {
        let log = Rc::clone(log);
        move |_| log.borrow_mut().push(tag)
    }

    #[test]
    fn listeners_run_in_priority_then_registration_order() {
        let clock = FrameClock::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _render = clock.subscribe(priority::RENDER, recorder(&log, "render"));
        let _a = clock.subscribe(priority::EFFECTS, recorder(&log, "effect-a"));
        let _tween = clock.subscribe(priority::TWEENS, recorder(&log, "tween"));
        let _b = clock.subscribe(priority::EFFECTS, recorder(&log, "effect-b"));

        clock.tick(Time(0.0));
        assert_eq!(
            *log.borrow(),
            vec!["tween", "effect-a", "effect-b", "render"]
        );
    }

    #[test]
    fn delta_is_time_since_previous_tick() {
        let clock = FrameClock::new(ClockConfig { max_delta: 1.0 });
        let first = clock.tick(Time(1.0)).unwrap();
        assert_eq!(first.dt_s, 0.0);
        let second = clock.tick(Time(1.25)).unwrap();
        assert_eq!(second.dt_s, 0.25);
        assert_eq!(second.time, Time(0.25));
        assert_eq!(second.index, 1);
    }

    #[test]
    fn long_stall_is_clamped() {
        let clock = FrameClock::new(ClockConfig { max_delta: 0.1 });
        clock.tick(Time(0.0));
        let frame = clock.tick(Time(5.0)).unwrap();
        assert_eq!(frame.dt_s, 0.1);
    }

    #[test]
    fn listener_added_during_tick_waits_for_next_tick() {
        let clock = FrameClock::default();
        let late_calls = Rc::new(Cell::new(0));
        let late_sub: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let _adder = {
            let clock2 = clock.clone();
            let late_calls = Rc::clone(&late_calls);
            let late_sub = Rc::clone(&late_sub);
            clock.subscribe(0, move |_| {
                if late_sub.borrow().is_none() {
                    let late_calls = Rc::clone(&late_calls);
                    // Higher priority value would sort after us: still must not run now.
                    let sub = clock2.subscribe(10, move |_| late_calls.set(late_calls.get() + 1));
                    *late_sub.borrow_mut() = Some(sub);
                }
            })
        };

        clock.tick(Time(0.0));
        assert_eq!(late_calls.get(), 0);
        clock.tick(Time(0.016));
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn listener_removed_during_tick_is_not_invoked() {
        let clock = FrameClock::default();
        let victim_calls = Rc::new(Cell::new(0));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let _killer = {
            let victim = Rc::clone(&victim);
            clock.subscribe(0, move |_| {
                victim.borrow_mut().take();
            })
        };
        {
            let victim_calls = Rc::clone(&victim_calls);
            let sub = clock.subscribe(1, move |_| victim_calls.set(victim_calls.get() + 1));
            *victim.borrow_mut() = Some(sub);
        }

        clock.tick(Time(0.0));
        clock.tick(Time(0.016));
        assert_eq!(victim_calls.get(), 0);
        assert_eq!(clock.listener_count(), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let clock = FrameClock::default();
        let calls = Rc::new(Cell::new(0));
        let sub = {
            let calls = Rc::clone(&calls);
            clock.subscribe(0, move |_| calls.set(calls.get() + 1))
        };
        clock.tick(Time(0.0));
        drop(sub);
        clock.tick(Time(0.016));
        assert_eq!(calls.get(), 1);
        assert_eq!(clock.listener_count(), 0);
    }

    #[test]
    fn cancel_unsubscribes_without_dropping_others() {
        let clock = FrameClock::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = clock.subscribe(0, recorder(&log, "a"));
        let _b = clock.subscribe(0, recorder(&log, "b"));
        a.cancel();
        clock.tick(Time(0.0));
        assert_eq!(*log.borrow(), vec!["b"]);
        assert_eq!(clock.listener_count(), 1);
    }

    #[test]
    fn pause_suppresses_listeners_and_time() {
        let clock = FrameClock::new(ClockConfig { max_delta: 10.0 });
        let calls = Rc::new(Cell::new(0));
        let _sub = {
            let calls = Rc::clone(&calls);
            clock.subscribe(0, move |_| calls.set(calls.get() + 1))
        };

        clock.tick(Time(0.0));
        clock.tick(Time(1.0));
        clock.pause();
        assert!(clock.tick(Time(2.0)).is_none());
        assert!(clock.tick(Time(3.0)).is_none());
        assert_eq!(calls.get(), 2);

        clock.resume();
        let resumed = clock.tick(Time(4.0)).unwrap();
        assert_eq!(resumed.dt_s, 0.0);
        assert_eq!(resumed.time, Time(1.0));
        let next = clock.tick(Time(4.5)).unwrap();
        assert_eq!(next.time, Time(1.5));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn nested_tick_is_ignored() {
        let clock = FrameClock::default();
        let nested = Rc::new(Cell::new(None));
        let _sub = {
            let clock2 = clock.clone();
            let nested = Rc::clone(&nested);
            clock.subscribe(0, move |_| nested.set(Some(clock2.tick(Time(9.0)).is_none())))
        };
        clock.tick(Time(0.0));
        assert_eq!(nested.get(), Some(true));
    }

    #[test]
    fn panicking_listener_does_not_wedge_the_clock() {
        let clock = FrameClock::default();
        let calls = Rc::new(Cell::new(0));
        let _sub = {
            let calls = Rc::clone(&calls);
            clock.subscribe(0, move |_| {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    panic!("listener failure");
                }
            })
        };
        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| clock.tick(Time(0.0))));
        assert!(unwound.is_err());
        assert!(clock.tick(Time(0.016)).is_some());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: ClockConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ClockConfig::default());
        let cfg: ClockConfig = serde_json::from_str(r#"{"maxDelta":0.5}"#).unwrap();
        assert_eq!(cfg.max_delta, 0.5);
    }
}
