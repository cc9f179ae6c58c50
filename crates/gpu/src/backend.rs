use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use scene::components::ResourceId;

use crate::renderer::{RenderFrame, SurfaceSize};
use crate::resources::TextureData;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The drawing context went away (e.g. WebGL context loss).
    ContextLost,
    Upload { id: ResourceId, reason: String },
    Draw(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::ContextLost => write!(f, "drawing context lost"),
            BackendError::Upload { id, reason } => write!(f, "upload of {id} failed: {reason}"),
            BackendError::Draw(reason) => write!(f, "draw failed: {reason}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// The GPU-facing half of the shared surface. Exactly one exists per
/// surface; it is created lazily when the surface is first acquired.
pub trait DrawBackend {
    fn resize(&mut self, size: SurfaceSize);

    fn upload_texture(&mut self, id: ResourceId, data: &TextureData) -> Result<(), BackendError>;

    fn draw(&mut self, frame: &RenderFrame) -> Result<(), BackendError>;

    /// Frees whatever the backend holds for `id`. Unknown ids are ignored.
    fn release(&mut self, id: ResourceId);
}

#[derive(Debug, Default)]
struct Recording {
    draws: u64,
    last_frame: Option<RenderFrame>,
    sizes: Vec<SurfaceSize>,
    uploads: Vec<ResourceId>,
    released: Vec<ResourceId>,
    failing_draws: u32,
}

/// Headless backend that records what it was asked to do.
///
/// Clones share one recording, so a caller can keep a clone to inspect
/// after handing the backend to a surface.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    log: Rc<RefCell<Recording>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draws(&self) -> u64 {
        self.log.borrow().draws
    }

    pub fn last_frame(&self) -> Option<RenderFrame> {
        self.log.borrow().last_frame.clone()
    }

    pub fn last_size(&self) -> Option<SurfaceSize> {
        self.log.borrow().sizes.last().copied()
    }

    pub fn uploads(&self) -> Vec<ResourceId> {
        self.log.borrow().uploads.clone()
    }

    pub fn released(&self) -> Vec<ResourceId> {
        self.log.borrow().released.clone()
    }

    /// Makes the next `n` draws fail.
    pub fn fail_next_draws(&self, n: u32) {
        self.log.borrow_mut().failing_draws = n;
    }
}

impl DrawBackend for RecordingBackend {
    fn resize(&mut self, size: SurfaceSize) {
        self.log.borrow_mut().sizes.push(size);
    }

    fn upload_texture(&mut self, id: ResourceId, data: &TextureData) -> Result<(), BackendError> {
        if !data.is_valid() {
            return Err(BackendError::Upload {
                id,
                reason: format!("{}x{} image with {} bytes", data.width, data.height, data.rgba.len()),
            });
        }
        self.log.borrow_mut().uploads.push(id);
        Ok(())
    }

    fn draw(&mut self, frame: &RenderFrame) -> Result<(), BackendError> {
        let mut log = self.log.borrow_mut();
        if log.failing_draws > 0 {
            log.failing_draws -= 1;
            return Err(BackendError::Draw("injected failure".into()));
        }
        log.draws += 1;
        log.last_frame = Some(frame.clone());
        Ok(())
    }

    fn release(&mut self, id: ResourceId) {
        self.log.borrow_mut().released.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendError, DrawBackend, RecordingBackend};
    use crate::renderer::{RenderFrame, SurfaceSize};
    use crate::resources::TextureData;
    use scene::components::ResourceId;

    fn empty_frame() -> RenderFrame {
        RenderFrame {
            index: 0,
            size: SurfaceSize::default(),
            clear_color: [0.0; 4],
            view_proj: [[0.0; 4]; 4],
            commands: Vec::new(),
            culled: 0,
        }
    }

    #[test]
    fn clones_share_the_recording() {
        let probe = RecordingBackend::new();
        let mut backend = probe.clone();
        backend.draw(&empty_frame()).unwrap();
        backend.release(ResourceId(3));
        assert_eq!(probe.draws(), 1);
        assert_eq!(probe.released(), vec![ResourceId(3)]);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let mut backend = RecordingBackend::new();
        backend.fail_next_draws(1);
        assert!(matches!(backend.draw(&empty_frame()), Err(BackendError::Draw(_))));
        assert!(backend.draw(&empty_frame()).is_ok());
        assert_eq!(backend.draws(), 1);
    }

    #[test]
    fn malformed_textures_are_rejected() {
        let mut backend = RecordingBackend::new();
        let bad = TextureData::new(2, 2, vec![0; 3]);
        assert!(backend.upload_texture(ResourceId(1), &bad).is_err());
        assert!(backend.uploads().is_empty());
    }
}
