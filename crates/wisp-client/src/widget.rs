#![forbid(unsafe_code)]

//! Widget-tree collaborator interface.
//!
//! Windows hold their children as [`WidgetRef`]s and talk to them through
//! [`Widget`]: event dispatch and clip updates. Concrete widgets live outside
//! this crate; [`Panel`] is a plain rectangle with an optional handler.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use wisp_core::event::WindowEvent;
use wisp_core::geometry::Rect;
use wisp_core::region::{Region, RegionError};

/// A node in a window's widget tree. Extents are in screen coordinates.
pub trait Widget {
    fn extent(&self) -> Rect;

    fn clip(&self) -> &Region;

    /// Rebuild the clip from the parent's clip.
    ///
    /// The result must lie within `parent_clip`.
    fn update_clip(&mut self, parent_clip: &Region) -> Result<(), RegionError>;

    /// Handle a pointer, key, or paint event. Returns whether it was consumed.
    fn handle_event(&mut self, event: &WindowEvent) -> bool;

    /// Shift the widget with its window.
    fn translate(&mut self, dx: i32, dy: i32);
}

/// Shared handle to a widget.
pub type WidgetRef = Rc<RefCell<dyn Widget>>;

/// Wrap a widget for use as a window child.
pub fn widget_ref<W: Widget + 'static>(widget: W) -> WidgetRef {
    Rc::new(RefCell::new(widget))
}

/// `parent_clip` cut to `extent`.
pub fn clip_to_extent(parent_clip: &Region, extent: Rect) -> Result<Region, RegionError> {
    let mut clip = parent_clip.clone();
    clip.intersect_rect(&extent)?;
    Ok(clip)
}

type Handler = Box<dyn FnMut(&WindowEvent) -> bool>;

/// Rectangular widget that forwards events to a closure.
pub struct Panel {
    extent: Rect,
    clip: Region,
    handler: Option<Handler>,
}

impl fmt::Debug for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Panel")
            .field("extent", &self.extent)
            .field("clip", &self.clip)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl Panel {
    pub fn new(extent: Rect) -> Self {
        Self {
            extent,
            clip: Region::new(),
            handler: None,
        }
    }

    #[must_use]
    pub fn with_handler(mut self, handler: impl FnMut(&WindowEvent) -> bool + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }
}

impl Widget for Panel {
    fn extent(&self) -> Rect {
        self.extent
    }

    fn clip(&self) -> &Region {
        &self.clip
    }

    fn update_clip(&mut self, parent_clip: &Region) -> Result<(), RegionError> {
        self.clip = clip_to_extent(parent_clip, self.extent)?;
        Ok(())
    }

    fn handle_event(&mut self, event: &WindowEvent) -> bool {
        self.handler.as_mut().is_some_and(|h| h(event))
    }

    fn translate(&mut self, dx: i32, dy: i32) {
        self.extent = self.extent.translate(dx, dy);
        self.clip.translate(dx, dy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use wisp_core::event::MouseEvent;

    #[test]
    fn panel_clip_stays_inside_parent() {
        let mut parent = Region::from_rect(Rect::new(0, 0, 100, 100));
        parent.subtract_rect(&Rect::new(40, 0, 60, 50)).unwrap();
        let mut panel = Panel::new(Rect::new(20, 20, 50, 50));
        panel.update_clip(&parent).unwrap();
        let clip = panel.clip();
        assert!(clip.subtract(&parent).unwrap().is_empty());
        assert_eq!(clip.contains_point(45, 30), None);
        assert!(clip.contains_point(45, 60).is_some());
    }

    #[test]
    fn panel_forwards_to_handler() {
        let hits = Rc::new(Cell::new(0));
        let seen = Rc::clone(&hits);
        let mut panel = Panel::new(Rect::new(0, 0, 10, 10)).with_handler(move |event| {
            seen.set(seen.get() + 1);
            event.is_input()
        });
        assert!(panel.handle_event(&WindowEvent::Mouse(MouseEvent::down(1, 1))));
        assert!(!panel.handle_event(&WindowEvent::Paint {
            dirty: Rect::new(0, 0, 1, 1)
        }));
        assert_eq!(hits.get(), 2);
        assert!(!Panel::new(Rect::default()).handle_event(&WindowEvent::Activate));
    }

    #[test]
    fn translate_moves_extent_and_clip() {
        let mut panel = Panel::new(Rect::new(0, 0, 10, 10));
        panel
            .update_clip(&Region::from_rect(Rect::new(0, 0, 100, 100)))
            .unwrap();
        panel.translate(5, 7);
        assert_eq!(panel.extent(), Rect::new(5, 7, 10, 10));
        assert_eq!(panel.clip().extents(), Rect::new(5, 7, 10, 10));
    }
}
