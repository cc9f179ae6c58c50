use std::cell::Cell;
use std::rc::Rc;

/// A shared scalar written by tweens and read by effects (`uHover`,
/// `uProgress`). Clones share the same cell.
#[derive(Debug, Clone, Default)]
pub struct AnimatedScalar(Rc<Cell<f64>>);

impl AnimatedScalar {
    pub fn new(value: f64) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    pub fn get(&self) -> f64 {
        self.0.get()
    }

    pub fn set(&self, value: f64) {
        self.0.set(value);
    }

    pub fn shares_with(&self, other: &AnimatedScalar) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
