//! Cross-section outline: monotone-chain hull split into left/right
//! rasterization chains, and the column clip applied to each chain.
//!
//! Both chains run from the lowest-row point to the highest-row point.
//! The left chain bounds the cross-section from the low-column side, the
//! right chain from the high-column side. Local space is already mirrored
//! so that "left" never depends on the view direction.

use super::section::SectionPoint;

/// Turn direction of `o -> a -> b` in the (row, column) plane.
#[inline]
fn turn(o: SectionPoint, a: SectionPoint, b: SectionPoint) -> f32 {
    (a.row - o.row) * (b.col - o.col) - (a.col - o.col) * (b.row - o.row)
}

/// Sorts `points` by row, breaking ties by column, and builds both chains.
///
/// Collinear points are dropped from the chains. An empty input produces
/// empty chains.
pub(crate) fn build_chains(
    points: &mut [SectionPoint],
    left: &mut Vec<SectionPoint>,
    right: &mut Vec<SectionPoint>,
) {
    points.sort_unstable_by(|a, b| a.row.total_cmp(&b.row).then(a.col.total_cmp(&b.col)));

    left.clear();
    for &p in points.iter() {
        while left.len() >= 2 && turn(left[left.len() - 2], left[left.len() - 1], p) <= 0.0 {
            left.pop();
        }
        left.push(p);
    }

    right.clear();
    for &p in points.iter().rev() {
        while right.len() >= 2 && turn(right[right.len() - 2], right[right.len() - 1], p) <= 0.0 {
            right.pop();
        }
        right.push(p);
    }
    right.reverse();
}

/// Where a chain sits relative to the valid column range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChainClip {
    /// Some part of the chain lies within the range.
    Inside,
    /// Every point lies below the range.
    Below,
    /// Every point lies above the range.
    Above,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Zone {
    Below,
    Inside,
    Above,
}

fn zone(col: f32, lo: f32, hi: f32) -> Zone {
    if col < lo {
        Zone::Below
    } else if col > hi {
        Zone::Above
    } else {
        Zone::Inside
    }
}

/// Point of the segment `a -> b` at column `bound`.
fn at_column(a: SectionPoint, b: SectionPoint, bound: f32) -> SectionPoint {
    let span = b.col - a.col;
    if span == 0.0 {
        return SectionPoint::new(a.row, bound);
    }
    let t = (bound - a.col) / span;
    SectionPoint::new(a.row + t * (b.row - a.row), bound)
}

/// Clamps a chain to columns `[lo, hi]` in a single pass.
///
/// Every point is kept with its column clamped, and a point is inserted
/// wherever the chain crosses a bound, so the clipped chain still follows
/// the original exactly inside the range. Rows stay non-decreasing.
pub(crate) fn clip_chain(chain: &[SectionPoint], lo: f32, hi: f32, out: &mut Vec<SectionPoint>) -> ChainClip {
    out.clear();
    let mut seen_inside = false;
    let mut seen_below = false;
    let mut seen_above = false;
    let mut prev: Option<(SectionPoint, Zone)> = None;

    for &p in chain {
        let z = zone(p.col, lo, hi);
        if let Some((q, qz)) = prev {
            match (qz, z) {
                (Zone::Below, Zone::Inside) | (Zone::Inside, Zone::Below) => out.push(at_column(q, p, lo)),
                (Zone::Above, Zone::Inside) | (Zone::Inside, Zone::Above) => out.push(at_column(q, p, hi)),
                (Zone::Below, Zone::Above) => {
                    out.push(at_column(q, p, lo));
                    out.push(at_column(q, p, hi));
                }
                (Zone::Above, Zone::Below) => {
                    out.push(at_column(q, p, hi));
                    out.push(at_column(q, p, lo));
                }
                _ => {}
            }
        }
        out.push(SectionPoint::new(p.row, p.col.clamp(lo, hi)));

        match z {
            Zone::Below => seen_below = true,
            Zone::Inside => seen_inside = true,
            Zone::Above => seen_above = true,
        }
        prev = Some((p, z));
    }

    match (seen_inside, seen_below, seen_above) {
        (false, true, false) => ChainClip::Below,
        (false, false, true) => ChainClip::Above,
        _ => ChainClip::Inside,
    }
}
