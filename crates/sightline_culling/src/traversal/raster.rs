//! Row rasterization of a clipped chain.
//!
//! For a row band `[lo, hi]` the extreme column of a chain is reached at
//! one of three places: where the chain enters the band, where it leaves
//! it, or at a chain vertex inside the band. Segments heading away from
//! the extremum ("outward") are consumed whole; the segment straddling a
//! band edge is intersected with it.

use super::section::SectionPoint;

/// Which extreme of the chain to report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Extreme {
    /// Smallest column (left chain).
    Min,
    /// Largest column (right chain).
    Max,
}

impl Extreme {
    #[inline]
    fn pick(self, current: Option<f32>, candidate: f32) -> Option<f32> {
        Some(match (self, current) {
            (_, None) => candidate,
            (Self::Min, Some(c)) => c.min(candidate),
            (Self::Max, Some(c)) => c.max(candidate),
        })
    }
}

/// Column of the segment `a -> b` at row `row`; `a.row < row < b.row`.
#[inline]
fn column_at(a: SectionPoint, b: SectionPoint, row: f32) -> f32 {
    let t = (row - a.row) / (b.row - a.row);
    a.col + t * (b.col - a.col)
}

/// Walks a chain band by band. Bands must be requested in increasing row
/// order; the cursor never moves backwards.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ChainWalker {
    /// Index of the segment start at or just before the current band.
    cursor: usize,
}

impl ChainWalker {
    pub(crate) fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Extreme column of `chain` over rows `[lo, hi]`.
    ///
    /// `None` when the chain has no point in the band.
    pub(crate) fn extent(&mut self, chain: &[SectionPoint], lo: f32, hi: f32, extreme: Extreme) -> Option<f32> {
        // Skip segments that end before the band
        while self.cursor + 1 < chain.len() && chain[self.cursor + 1].row < lo {
            self.cursor += 1;
        }

        let mut best = None;
        let start = self.cursor;

        // Entry point: the band's lower edge cuts the current segment
        if let (Some(&a), Some(&b)) = (chain.get(start), chain.get(start + 1)) {
            if a.row < lo && b.row > lo {
                best = extreme.pick(best, column_at(a, b, lo));
            }
        }

        for (i, &p) in chain.iter().enumerate().skip(start) {
            if p.row > hi {
                // Exit point: the band's upper edge cuts the segment ending here
                if i > 0 && chain[i - 1].row < hi && chain[i - 1].row >= lo {
                    best = extreme.pick(best, column_at(chain[i - 1], p, hi));
                }
                break;
            }
            if p.row >= lo {
                best = extreme.pick(best, p.col);
            }
        }

        // A single segment spanning the whole band
        if let (Some(&a), Some(&b)) = (chain.get(start), chain.get(start + 1)) {
            if a.row < lo && b.row > hi {
                best = extreme.pick(best, column_at(a, b, hi));
            }
        }

        best
    }
}
