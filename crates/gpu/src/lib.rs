//! The shared render surface and everything that draws into it: the draw
//! backend seam, per-owner GPU resources, the content mount protocol and
//! the [`Stage`] context object.

pub mod backend;
pub mod mount;
pub mod renderer;
pub mod resources;
pub mod stage;
pub mod surface;

pub use backend::*;
pub use mount::*;
pub use renderer::*;
pub use resources::*;
pub use stage::*;
pub use surface::*;
