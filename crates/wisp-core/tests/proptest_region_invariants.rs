//! Property-based invariant tests for region algebra.
//!
//! 1. Results never contain overlapping rectangles.
//! 2. Results are in band order (top edge, then left edge).
//! 3. `extents(A ∪ B)` is the bounding box of `extents(A)` and `extents(B)`.
//! 4. `A \ A` is empty.
//! 5. Point membership matches set semantics for ∪, ∩ and \.
//! 6. Inclusion-exclusion holds for areas.
//! 7. `extents` is the minimal bounding box of the rectangles.
//! 8. Far-apart operands either keep exact extents or fail with `TooLarge`;
//!    they are never truncated.

use proptest::prelude::*;
use wisp_core::geometry::Rect;
use wisp_core::region::{Region, RegionError};

// ── Helpers ─────────────────────────────────────────────────────────────

const FIELD: i32 = 40;

fn rect_strategy() -> impl Strategy<Value = Rect> {
    (-4i32..FIELD, -4i32..FIELD, 0u16..24, 0u16..24).prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

fn far_rect_strategy() -> impl Strategy<Value = Rect> {
    (-50_000i32..50_000, -50_000i32..50_000, 1u16..2_000, 1u16..2_000)
        .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

fn span(lo: i32, hi: i32) -> i64 {
    i64::from(hi) - i64::from(lo)
}

fn region_strategy() -> impl Strategy<Value = Region> {
    prop::collection::vec(rect_strategy(), 0..6).prop_map(|rects| {
        let mut region = Region::new();
        for rect in rects {
            region.union_rect(&rect).expect("union");
        }
        region
    })
}

fn has_overlap(region: &Region) -> bool {
    let rects = region.rects();
    rects
        .iter()
        .enumerate()
        .any(|(i, a)| rects[i + 1..].iter().any(|b| a.intersects(b)))
}

fn band_ordered(region: &Region) -> bool {
    region
        .rects()
        .windows(2)
        .all(|pair| (pair[0].y, pair[0].x) < (pair[1].y, pair[1].x))
}

fn inside(region: &Region, x: i32, y: i32) -> bool {
    region.contains_point(x, y).is_some()
}

fn points() -> impl Iterator<Item = (i32, i32)> {
    (-6..FIELD + 26).step_by(3).flat_map(|x| (-6..FIELD + 26).step_by(3).map(move |y| (x, y)))
}

fn bounding(region: &Region) -> Rect {
    region
        .rects()
        .iter()
        .fold(Rect::default(), |acc, r| acc.union(r))
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Structure
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn results_are_disjoint_and_ordered(a in region_strategy(), b in region_strategy()) {
        for result in [a.union(&b).unwrap(), a.intersect(&b).unwrap(), a.subtract(&b).unwrap()] {
            prop_assert!(!has_overlap(&result), "overlap in {:?}", result);
            prop_assert!(band_ordered(&result), "unordered {:?}", result);
            prop_assert_eq!(result.extents(), bounding(&result));
            prop_assert_eq!(result.is_flat(), result.len() == 1);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Union extents
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn union_extents_is_bounding_box(a in region_strategy(), b in region_strategy()) {
        let u = a.union(&b).unwrap();
        prop_assert_eq!(u.extents(), a.extents().union(&b.extents()));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Self subtraction
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn subtract_self_is_empty(a in region_strategy()) {
        let d = a.subtract(&a).unwrap();
        prop_assert!(d.is_empty());
        prop_assert_eq!(d.extents().area(), 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Pointwise semantics
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn pointwise_set_semantics(a in region_strategy(), b in region_strategy()) {
        let u = a.union(&b).unwrap();
        let i = a.intersect(&b).unwrap();
        let d = a.subtract(&b).unwrap();
        for (x, y) in points() {
            let in_a = inside(&a, x, y);
            let in_b = inside(&b, x, y);
            prop_assert_eq!(inside(&u, x, y), in_a || in_b, "union at ({}, {})", x, y);
            prop_assert_eq!(inside(&i, x, y), in_a && in_b, "intersect at ({}, {})", x, y);
            prop_assert_eq!(inside(&d, x, y), in_a && !in_b, "subtract at ({}, {})", x, y);
        }
    }
}

proptest! {
    #[test]
    fn contains_point_returns_member_rect(a in region_strategy(), px in -6i32..70, py in -6i32..70) {
        if let Some(hit) = a.contains_point(px, py) {
            prop_assert!(hit.contains(px, py));
            prop_assert!(a.rects().contains(&hit));
        } else {
            prop_assert!(a.rects().iter().all(|r| !r.contains(px, py)));
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Inclusion-exclusion
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn areas_satisfy_inclusion_exclusion(a in region_strategy(), b in region_strategy()) {
        let u = a.union(&b).unwrap();
        let i = a.intersect(&b).unwrap();
        let d = a.subtract(&b).unwrap();
        prop_assert_eq!(u.area() + i.area(), a.area() + b.area());
        prop_assert_eq!(d.area() + i.area(), a.area());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. Rect-variant agreement
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn rect_variants_match_region_ops(a in region_strategy(), r in rect_strategy()) {
        let as_region = Region::from_rect(r);

        let mut u = a.clone();
        u.union_rect(&r).unwrap();
        prop_assert_eq!(u.area(), a.union(&as_region).unwrap().area());

        let mut i = a.clone();
        i.intersect_rect(&r).unwrap();
        prop_assert_eq!(i.area(), a.intersect(&as_region).unwrap().area());

        let mut d = a.clone();
        d.subtract_rect(&r).unwrap();
        prop_assert_eq!(d.area(), a.subtract(&as_region).unwrap().area());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 8. Far-apart operands
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn far_apart_union_is_exact_or_rejected(a in far_rect_strategy(), b in far_rect_strategy()) {
        let wide = span(a.left().min(b.left()), a.right().max(b.right())) > i64::from(u16::MAX);
        let tall = span(a.top().min(b.top()), a.bottom().max(b.bottom())) > i64::from(u16::MAX);
        match Region::from_rect(a).union(&Region::from_rect(b)) {
            Ok(u) => {
                prop_assert!(!wide && !tall);
                prop_assert_eq!(u.extents(), bounding(&u));
                prop_assert_eq!(u.extents(), a.union(&b));
                for r in [a, b] {
                    prop_assert!(u.contains_point(r.x, r.y).is_some());
                    prop_assert!(u.contains_point(r.right() - 1, r.bottom() - 1).is_some());
                }
            }
            Err(err) => {
                prop_assert_eq!(err, RegionError::TooLarge);
                prop_assert!(wide || tall);
            }
        }
    }
}
