//! Scene-side state of the shared render surface: the node graph mounted
//! content lives in, typed uniforms, view visibility, camera and pointer.

pub mod camera;
pub mod components;
pub mod graph;
pub mod picking;
pub mod pointer;
pub mod views;

pub use camera::*;
pub use graph::*;
pub use picking::*;
pub use pointer::*;
pub use views::*;
