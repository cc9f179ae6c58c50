pub mod drawable;
pub mod resource;
pub mod transform;
pub mod uniforms;

pub use drawable::*;
pub use resource::*;
pub use transform::*;
pub use uniforms::*;
