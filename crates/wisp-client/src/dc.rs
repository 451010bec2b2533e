#![forbid(unsafe_code)]

//! Clipped drawing context over a device driver.
//!
//! Coordinates passed to [`ClientDc`] are relative to the owner's origin and
//! translated to screen coordinates before clipping. Every primitive is cut
//! against the owner's clip region, so a window never draws over a window
//! stacked above it.

use smallvec::SmallVec;
use wisp_core::geometry::{Point, Rect};
use wisp_core::region::Region;

/// A device pixel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0x00_00_00);
    pub const WHITE: Color = Color(0xff_ff_ff);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }
}

/// Pixel primitives supplied by the display driver.
///
/// Horizontal spans are half-open: `x1..x2`.
pub trait GraphicDriver {
    fn set_pixel(&mut self, x: i32, y: i32, color: Color);
    fn draw_hline(&mut self, x1: i32, x2: i32, y: i32, color: Color);
    fn draw_vline(&mut self, x: i32, y1: i32, y2: i32, color: Color);
    /// Copy `pixels` to the screen starting at `(x, y)`.
    fn draw_raw_hline(&mut self, x: i32, y: i32, pixels: &[Color]);
    fn bits_per_pixel(&self) -> u8;
    fn screen_rect(&self) -> Rect;
}

/// Drawing context bound to one owner's origin and clip.
pub struct ClientDc<'a, D: GraphicDriver + ?Sized> {
    driver: &'a mut D,
    origin: Point,
    clip: Region,
}

impl<'a, D: GraphicDriver + ?Sized> ClientDc<'a, D> {
    /// `clip` is in screen coordinates; it is cut to the driver's screen.
    pub fn new(driver: &'a mut D, origin: Point, mut clip: Region) -> Self {
        let screen = driver.screen_rect();
        if !screen.contains_rect(&clip.extents())
            && let Err(err) = clip.intersect_rect(&screen)
        {
            tracing::warn!(%err, "clip could not be cut to the screen; drawing disabled");
            clip.clear();
        }
        Self {
            driver,
            origin,
            clip,
        }
    }

    pub fn clip(&self) -> &Region {
        &self.clip
    }

    #[inline]
    fn to_screen(&self, x: i32, y: i32) -> (i32, i32) {
        (x.saturating_add(self.origin.x), y.saturating_add(self.origin.y))
    }

    /// Clip rectangles that cross row `y`, as `(left, right)` spans.
    fn row_spans(&self, y: i32) -> SmallVec<[(i32, i32); 4]> {
        self.clip
            .rects()
            .iter()
            .skip_while(|r| r.bottom() <= y)
            .take_while(|r| r.top() <= y)
            .map(|r| (r.left(), r.right()))
            .collect()
    }

    pub fn draw_point(&mut self, x: i32, y: i32, color: Color) {
        let (x, y) = self.to_screen(x, y);
        if self.clip.contains_point(x, y).is_some() {
            self.driver.set_pixel(x, y, color);
        }
    }

    /// Horizontal line over `x1..x2` on row `y`.
    pub fn draw_hline(&mut self, x1: i32, x2: i32, y: i32, color: Color) {
        let (start, y) = self.to_screen(x1.min(x2), y);
        let end = x1.max(x2).saturating_add(self.origin.x);
        for (left, right) in self.row_spans(y) {
            let from = start.max(left);
            let to = end.min(right);
            if from < to {
                self.driver.draw_hline(from, to, y, color);
            }
        }
    }

    /// Vertical line over `y1..y2` on column `x`.
    pub fn draw_vline(&mut self, x: i32, y1: i32, y2: i32, color: Color) {
        let (x, top) = self.to_screen(x, y1.min(y2));
        let bottom = y1.max(y2).saturating_add(self.origin.y);
        for r in self.clip.rects() {
            if x < r.left() || x >= r.right() {
                continue;
            }
            let from = top.max(r.top());
            let to = bottom.min(r.bottom());
            if from < to {
                self.driver.draw_vline(x, from, to, color);
            }
        }
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let rect = rect.translate(self.origin.x, self.origin.y);
        let pieces: SmallVec<[Rect; 8]> = self
            .clip
            .rects()
            .iter()
            .filter_map(|r| r.intersection_opt(&rect))
            .collect();
        for piece in pieces {
            for y in piece.top()..piece.bottom() {
                self.driver.draw_hline(piece.left(), piece.right(), y, color);
            }
        }
    }

    /// Copy a row of pixels to `(x, y)`.
    ///
    /// A flat clip needs one clipped copy; otherwise each clip rectangle on
    /// the row gets its own.
    pub fn blit_line(&mut self, x: i32, y: i32, pixels: &[Color]) {
        let (x, y) = self.to_screen(x, y);
        let len = i32::try_from(pixels.len()).unwrap_or(i32::MAX);
        let end = x.saturating_add(len);

        if self.clip.is_flat() {
            let ext = self.clip.extents();
            if y < ext.top() || y >= ext.bottom() {
                return;
            }
            self.blit_span(x, end, y, pixels, (ext.left(), ext.right()));
            return;
        }
        for span in self.row_spans(y) {
            self.blit_span(x, end, y, pixels, span);
        }
    }

    fn blit_span(&mut self, x: i32, end: i32, y: i32, pixels: &[Color], (left, right): (i32, i32)) {
        let from = x.max(left);
        let to = end.min(right);
        if from >= to {
            return;
        }
        let skip = (from - x) as usize;
        let take = (to - from) as usize;
        self.driver.draw_raw_hline(from, y, &pixels[skip..skip + take]);
    }
}
