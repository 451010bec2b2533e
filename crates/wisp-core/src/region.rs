#![forbid(unsafe_code)]

//! Rectangle-set algebra for clip regions.
//!
//! A [`Region`] is a set of non-overlapping, axis-aligned rectangles kept in
//! band order (sorted by top edge, then left edge) together with its bounding
//! `extents`.
//!
//! # Representation
//!
//! - **Empty**: no rectangles, zero-area extents.
//! - **Flat**: exactly one rectangle, which *is* the extents. Hot drawing paths
//!   test [`Region::is_flat`] to pick a single clipped copy over a
//!   per-rectangle loop.
//! - **Banded**: two or more rectangles.
//!
//! # Algorithm
//!
//! The general operations sweep the union of every top/bottom edge of both
//! operands. Between two consecutive edges each input rectangle either covers
//! the band completely or misses it, so each band reduces to two sorted lists
//! of horizontal spans combined with a linear merge. Rectangles that merely
//! touch stay separate, both within a band and across band boundaries: the
//! result is exact rather than compact.
//!
//! # Failure Modes
//!
//! Output storage is reserved with `try_reserve`. When that fails the
//! operation returns [`RegionError::OutOfMemory`]. A result whose extents or
//! any merged rectangle would be wider or taller than `u16::MAX` fails with
//! [`RegionError::TooLarge`]. In both cases the in-place variants leave `self`
//! exactly as it was.

use std::fmt;

use smallvec::SmallVec;

use crate::geometry::Rect;

/// A region operation could not produce its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    /// Rectangle storage could not be grown.
    OutOfMemory,
    /// The result spans more than `u16::MAX` pixels on one axis.
    TooLarge,
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "region rectangle storage exhausted"),
            Self::TooLarge => write!(f, "region spans more than {} pixels", u16::MAX),
        }
    }
}

impl std::error::Error for RegionError {}

/// How a rectangle relates to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// No part of the rectangle is in the region.
    Out,
    /// The whole rectangle is in the region.
    In,
    /// Some, but not all, of the rectangle is in the region.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum Repr {
    #[default]
    Empty,
    Flat,
    Banded(Vec<Rect>),
}

/// A set of non-overlapping rectangles.
///
/// Equality is structural: two regions covering the same pixels but split
/// into different rectangles compare unequal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Region {
    extents: Rect,
    repr: Repr,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Union,
    Intersect,
    Subtract,
}

type Spans = SmallVec<[(i32, i32); 8]>;

impl Region {
    /// An empty region.
    pub const fn new() -> Self {
        Self {
            extents: Rect::new(0, 0, 0, 0),
            repr: Repr::Empty,
        }
    }

    /// A flat region covering `rect`, or an empty one if `rect` has no area.
    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            Self::new()
        } else {
            Self {
                extents: rect,
                repr: Repr::Flat,
            }
        }
    }

    /// Build a region from rectangles already sorted in band order and known
    /// not to overlap.
    fn from_sorted(mut rects: Vec<Rect>) -> Result<Self, RegionError> {
        rects.retain(|r| !r.is_empty());
        let region = match rects.len() {
            0 => Self::new(),
            1 => Self::from_rect(rects[0]),
            _ => {
                let extents = rects
                    .iter()
                    .try_fold(Rect::default(), |acc, r| acc.checked_union(r))
                    .ok_or(RegionError::TooLarge)?;
                Self {
                    extents,
                    repr: Repr::Banded(rects),
                }
            }
        };
        Ok(region)
    }

    /// Bounding box of every rectangle.
    #[inline]
    pub const fn extents(&self) -> Rect {
        self.extents
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        matches!(self.repr, Repr::Empty)
    }

    /// True when the region is a single rectangle equal to its extents.
    #[inline]
    pub const fn is_flat(&self) -> bool {
        matches!(self.repr, Repr::Flat)
    }

    /// Number of rectangles.
    pub fn len(&self) -> usize {
        self.rects().len()
    }

    /// The rectangles in band order.
    pub fn rects(&self) -> &[Rect] {
        match &self.repr {
            Repr::Empty => &[],
            Repr::Flat => std::slice::from_ref(&self.extents),
            Repr::Banded(rects) => rects,
        }
    }

    /// Total covered area.
    pub fn area(&self) -> u64 {
        self.rects().iter().map(|r| u64::from(r.area())).sum()
    }

    /// Drop every rectangle.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Replace the contents with a single rectangle.
    pub fn reset(&mut self, rect: Rect) {
        *self = Self::from_rect(rect);
    }

    /// Return the rectangle containing `(x, y)`, if any.
    pub fn contains_point(&self, x: i32, y: i32) -> Option<Rect> {
        if !self.extents.contains(x, y) {
            return None;
        }
        match &self.repr {
            Repr::Empty => None,
            Repr::Flat => Some(self.extents),
            Repr::Banded(rects) => rects
                .iter()
                .take_while(|r| r.top() <= y)
                .find(|r| r.contains(x, y))
                .copied(),
        }
    }

    /// Classify `rect` against the region.
    pub fn contains_rect(&self, rect: &Rect) -> Containment {
        if rect.is_empty() || !self.extents.intersects(rect) {
            return Containment::Out;
        }
        let covered: u64 = self
            .rects()
            .iter()
            .map(|r| u64::from(r.intersection(rect).area()))
            .sum();
        if covered == 0 {
            Containment::Out
        } else if covered == u64::from(rect.area()) {
            Containment::In
        } else {
            Containment::Partial
        }
    }

    /// Shift every rectangle by `(dx, dy)`.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        self.extents = self.extents.translate(dx, dy);
        if let Repr::Banded(rects) = &mut self.repr {
            for r in rects.iter_mut() {
                *r = r.translate(dx, dy);
            }
        }
    }

    /// `self ∪ other`.
    pub fn union(&self, other: &Region) -> Result<Region, RegionError> {
        combine(self, other, Op::Union)
    }

    /// `self ∩ other`.
    pub fn intersect(&self, other: &Region) -> Result<Region, RegionError> {
        combine(self, other, Op::Intersect)
    }

    /// `self \ other`.
    pub fn subtract(&self, other: &Region) -> Result<Region, RegionError> {
        combine(self, other, Op::Subtract)
    }

    /// In-place `self ∪ rect`. On error `self` is unchanged.
    pub fn union_rect(&mut self, rect: &Rect) -> Result<(), RegionError> {
        *self = combine(self, &Region::from_rect(*rect), Op::Union)?;
        Ok(())
    }

    /// In-place `self ∩ rect`. On error `self` is unchanged.
    pub fn intersect_rect(&mut self, rect: &Rect) -> Result<(), RegionError> {
        *self = combine(self, &Region::from_rect(*rect), Op::Intersect)?;
        Ok(())
    }

    /// In-place `self \ rect`. On error `self` is unchanged.
    pub fn subtract_rect(&mut self, rect: &Rect) -> Result<(), RegionError> {
        *self = combine(self, &Region::from_rect(*rect), Op::Subtract)?;
        Ok(())
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}

fn combine(a: &Region, b: &Region, op: Op) -> Result<Region, RegionError> {
    if let Some(shortcut) = fast_path(a, b, op)? {
        return Ok(shortcut);
    }
    sweep(a, b, op)
}

/// Cases that never need the band sweep.
fn fast_path(a: &Region, b: &Region, op: Op) -> Result<Option<Region>, RegionError> {
    let disjoint = !a.extents.intersects(&b.extents);
    let shortcut = match op {
        Op::Union => {
            if b.is_empty() {
                Some(a.clone())
            } else if a.is_empty() {
                Some(b.clone())
            } else if a.is_flat() && a.extents.contains_rect(&b.extents) {
                Some(a.clone())
            } else if b.is_flat() && b.extents.contains_rect(&a.extents) {
                Some(b.clone())
            } else {
                None
            }
        }
        Op::Intersect => {
            if a.is_empty() || b.is_empty() || disjoint {
                Some(Region::new())
            } else if a.is_flat() && b.is_flat() {
                Some(Region::from_rect(a.extents.intersection(&b.extents)))
            } else if a.is_flat() {
                Some(clip_to_rect(b, &a.extents)?)
            } else if b.is_flat() {
                Some(clip_to_rect(a, &b.extents)?)
            } else {
                None
            }
        }
        Op::Subtract => {
            if a.is_empty() || b.is_empty() || disjoint {
                Some(a.clone())
            } else if b.is_flat() && b.extents.contains_rect(&a.extents) {
                Some(Region::new())
            } else {
                None
            }
        }
    };
    Ok(shortcut)
}

/// Intersect every rectangle of `region` with `clip`.
fn clip_to_rect(region: &Region, clip: &Rect) -> Result<Region, RegionError> {
    if clip.contains_rect(&region.extents) {
        return Ok(region.clone());
    }
    let mut out = Vec::new();
    out.try_reserve(region.len())
        .map_err(|_| RegionError::OutOfMemory)?;
    out.extend(region.rects().iter().filter_map(|r| r.intersection_opt(clip)));
    // Clipping can raise a rectangle's top edge past a neighbour's.
    out.sort_by_key(|r| (r.y, r.x));
    Region::from_sorted(out)
}

fn sweep(a: &Region, b: &Region, op: Op) -> Result<Region, RegionError> {
    let mut edges: Vec<i32> = Vec::new();
    edges
        .try_reserve(2 * (a.len() + b.len()))
        .map_err(|_| RegionError::OutOfMemory)?;
    for r in a.rects().iter().chain(b.rects()) {
        edges.push(r.top());
        edges.push(r.bottom());
    }
    edges.sort_unstable();
    edges.dedup();

    let mut out: Vec<Rect> = Vec::new();
    for band in edges.windows(2) {
        let (top, bottom) = (band[0], band[1]);
        let spans_a = band_spans(a.rects(), top, bottom);
        let spans_b = band_spans(b.rects(), top, bottom);
        let spans = match op {
            Op::Union => union_spans(&spans_a, &spans_b),
            Op::Intersect => intersect_spans(&spans_a, &spans_b),
            Op::Subtract => subtract_spans(&spans_a, &spans_b),
        };
        out.try_reserve(spans.len())
            .map_err(|_| RegionError::OutOfMemory)?;
        for &(x1, x2) in &spans {
            let rect =
                Rect::checked_from_edges(x1, top, x2, bottom).ok_or(RegionError::TooLarge)?;
            out.push(rect);
        }
    }
    Region::from_sorted(out)
}

/// Horizontal spans of the rectangles covering `[top, bottom)`, sorted by left edge.
fn band_spans(rects: &[Rect], top: i32, bottom: i32) -> Spans {
    let mut spans: Spans = rects
        .iter()
        .filter(|r| r.top() < bottom && r.bottom() > top)
        .map(|r| (r.left(), r.right()))
        .collect();
    spans.sort_unstable();
    spans
}

fn union_spans(a: &Spans, b: &Spans) -> Spans {
    let mut all: Spans = a.iter().chain(b.iter()).copied().collect();
    all.sort_unstable();

    let mut merged = Spans::new();
    for (x1, x2) in all {
        match merged.last_mut() {
            // Overlap only: touching spans stay separate.
            Some(last) if x1 < last.1 => last.1 = last.1.max(x2),
            _ => merged.push((x1, x2)),
        }
    }
    merged
}

fn intersect_spans(a: &Spans, b: &Spans) -> Spans {
    let mut out = Spans::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let x1 = a[i].0.max(b[j].0);
        let x2 = a[i].1.min(b[j].1);
        if x1 < x2 {
            out.push((x1, x2));
        }
        if a[i].1 < b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

fn subtract_spans(a: &Spans, b: &Spans) -> Spans {
    let mut out = Spans::new();
    for &(x1, x2) in a {
        let mut cursor = x1;
        for &(cut1, cut2) in b.iter() {
            if cut2 <= cursor || cut1 >= x2 {
                continue;
            }
            if cut1 > cursor {
                out.push((cursor, cut1));
            }
            cursor = cursor.max(cut2);
            if cursor >= x2 {
                break;
            }
        }
        if cursor < x2 {
            out.push((cursor, x2));
        }
    }
    out
}
