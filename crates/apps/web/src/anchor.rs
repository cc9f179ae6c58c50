//! View anchors backed by DOM elements.

use foundation::bounds::Rect;
use scene::ViewAnchor;

/// A page element measured with `getBoundingClientRect` on every flush.
pub struct ElementAnchor {
    element: web_sys::Element,
}

impl ElementAnchor {
    pub fn new(element: web_sys::Element) -> Self {
        Self { element }
    }
}

impl ViewAnchor for ElementAnchor {
    fn bounds(&self) -> Rect {
        let r = self.element.get_bounding_client_rect();
        Rect::new(r.x(), r.y(), r.width(), r.height())
    }
}
