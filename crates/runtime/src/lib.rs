//! Frame-driven time sources: the frame clock every consumer subscribes to,
//! and the tween and timeline engines it drives.
//!
//! Everything here is single-threaded and cooperative. Callbacks run on the
//! thread that calls [`FrameClock::tick`], in listener-priority order.

pub mod clock;
pub mod easing;
pub mod event_bus;
pub mod frame;
pub mod scalar;
pub mod timeline;
pub mod tween;

pub use clock::*;
pub use easing::*;
pub use event_bus::*;
pub use frame::*;
pub use scalar::*;
pub use timeline::*;
pub use tween::*;
