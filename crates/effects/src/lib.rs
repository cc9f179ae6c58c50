//! Shader-backed effect primitives that mount into the shared surface:
//! glass, fluid overlay, distortion image plane and carousel transition
//! plane. Each one owns its mount, its uniforms and its per-frame update.

pub mod block;
pub mod carousel;
pub mod distortion;
pub mod effect;
pub mod fluid;
pub mod glass;
pub mod shaders;

pub use block::*;
pub use carousel::*;
pub use distortion::*;
pub use effect::*;
pub use fluid::*;
pub use glass::*;
