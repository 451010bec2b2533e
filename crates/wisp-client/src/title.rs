#![forbid(unsafe_code)]

//! Title-bar decoration and the chrome metrics that size it.
//!
//! The decoration covers the window frame: everything in the outer extent
//! that is not content. Its clip is the outer clip minus the content extent.
//! Bordered windows without a title get a frame-only decoration with no bar
//! and no close box.

use wisp_core::geometry::{Rect, Sides};
use wisp_core::region::{Region, RegionError};

use crate::dc::{ClientDc, Color, GraphicDriver};

/// Frame metrics shared by every decorated window of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chrome {
    pub border: u16,
    pub title_height: u16,
    /// Width and height of the close box.
    pub close_box: (u16, u16),
}

impl Default for Chrome {
    fn default() -> Self {
        Self {
            border: 2,
            title_height: 20,
            close_box: (16, 16),
        }
    }
}

impl Chrome {
    /// Outer extent of a content rectangle.
    ///
    /// `border` grows every side; `titled` additionally grows the top by the
    /// title height.
    pub fn outer_extent(&self, content: Rect, border: bool, titled: bool) -> Rect {
        let mut sides = if border || titled {
            Sides::all(self.border)
        } else {
            Sides::default()
        };
        if titled {
            sides = sides.with_extra_top(self.title_height);
        }
        content.outer(sides)
    }

    /// Title bar strip inside an outer extent.
    pub fn title_bar(&self, outer: Rect) -> Rect {
        let b = i32::from(self.border);
        Rect::from_edges(
            outer.left() + b,
            outer.top() + b,
            outer.right() - b,
            outer.top() + b + i32::from(self.title_height),
        )
    }

    /// Close box at the right end of the title bar.
    pub fn close_box(&self, outer: Rect) -> Rect {
        let bar = self.title_bar(outer);
        let (w, h) = self.close_box;
        let x = bar.right() - i32::from(w) - 2;
        let y = bar.top() + (i32::from(self.title_height) - i32::from(h)) / 2;
        Rect::new(x, y, w, h)
    }
}

/// Frame and title-bar decoration of one window.
#[derive(Debug, Clone)]
pub struct Title {
    chrome: Chrome,
    extent: Rect,
    clip: Region,
    titled: bool,
    closable: bool,
    active: bool,
    needs_repaint: bool,
}

const ACTIVE_BAR: Color = Color::rgb(0x20, 0x40, 0xa0);
const INACTIVE_BAR: Color = Color::rgb(0x80, 0x80, 0x80);
const CLOSE_BOX: Color = Color::rgb(0xc0, 0x20, 0x20);

impl Title {
    /// Frame plus title bar, with a close box if `closable`.
    pub fn new(chrome: Chrome, outer: Rect, closable: bool) -> Self {
        Self {
            chrome,
            extent: outer,
            clip: Region::new(),
            titled: true,
            closable,
            active: false,
            needs_repaint: true,
        }
    }

    /// Frame only.
    pub fn framed(chrome: Chrome, outer: Rect) -> Self {
        Self {
            titled: false,
            ..Self::new(chrome, outer, false)
        }
    }

    /// The decoration covers the whole outer extent.
    #[inline]
    pub fn extent(&self) -> Rect {
        self.extent
    }

    #[inline]
    pub fn clip(&self) -> &Region {
        &self.clip
    }

    pub fn bar(&self) -> Option<Rect> {
        self.titled.then(|| self.chrome.title_bar(self.extent))
    }

    pub fn close_box(&self) -> Option<Rect> {
        (self.titled && self.closable).then(|| self.chrome.close_box(self.extent))
    }

    /// True if `(x, y)` is on the visible part of the close box.
    pub fn hit_close_box(&self, x: i32, y: i32) -> bool {
        self.close_box().is_some_and(|r| r.contains(x, y)) && self.clip.contains_point(x, y).is_some()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Switch the active look and schedule a repaint.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.needs_repaint = true;
    }

    pub fn invalidate(&mut self) {
        self.needs_repaint = true;
    }

    pub fn needs_repaint(&self) -> bool {
        self.needs_repaint
    }

    pub(crate) fn set_extent(&mut self, outer: Rect) {
        self.extent = outer;
        self.needs_repaint = true;
    }

    pub(crate) fn translate(&mut self, dx: i32, dy: i32) {
        self.extent = self.extent.translate(dx, dy);
        self.clip.translate(dx, dy);
    }

    /// Decoration clip: the outer clip minus the content.
    pub fn update_clip(&mut self, outer_clip: &Region, content: Rect) -> Result<(), RegionError> {
        let mut clip = outer_clip.clone();
        clip.subtract_rect(&content)?;
        self.clip = clip;
        Ok(())
    }

    /// Draw the bar and close box if a repaint is pending.
    ///
    /// Returns whether anything was drawn.
    pub fn paint<D: GraphicDriver + ?Sized>(&mut self, driver: &mut D) -> bool {
        if !self.needs_repaint {
            return false;
        }
        self.needs_repaint = false;
        let origin = self.extent.origin();
        let mut dc = ClientDc::new(driver, origin, self.clip.clone());
        let local = |r: Rect| r.translate(-origin.x, -origin.y);

        let bar_color = if self.active { ACTIVE_BAR } else { INACTIVE_BAR };
        dc.fill_rect(local(self.extent), INACTIVE_BAR);
        if let Some(bar) = self.bar() {
            dc.fill_rect(local(bar), bar_color);
        }
        if let Some(close) = self.close_box() {
            dc.fill_rect(local(close), CLOSE_BOX);
        }
        tracing::trace!(extent = ?self.extent, active = self.active, "title painted");
        true
    }
}
