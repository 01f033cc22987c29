//! 3×3 non-maximum suppression by scanline run tracking (Tuan Q. Pham).
//!
//! Columns are scanned top to bottom. A rising run along the column skips
//! every pixel that has a larger successor, and a two-scanline skip mask
//! remembers pixels of the next column that are already known to be smaller
//! than a visited neighbour. Each surviving candidate is compared with its
//! three next-column neighbours first (marking the smaller ones) and then
//! with its three previous-column neighbours.
//!
//! A pixel is reported when no 8-neighbour exceeds it. The outermost
//! 1-pixel frame is never reported.
use crate::image::ImageF32;
use crate::progress::Progress;

/// Local maxima as `(x, y)` pixel coordinates, column-major order.
///
/// Polls cancellation once per column; `None` means interrupted.
pub fn scanline_nms(img: &ImageF32, progress: &Progress) -> Option<Vec<(usize, usize)>> {
    let (w, h) = (img.w, img.h);
    let mut peaks = Vec::new();
    if w < 3 || h < 3 {
        return Some(peaks);
    }
    let at = |r: usize, c: usize| img.data[r * w + c];
    let mut skip_cur = vec![false; h];
    let mut skip_next = vec![false; h];

    for c in 1..w - 1 {
        if !progress.tick(c, w - 2) {
            return None;
        }
        let mut r = 1;
        while r < h - 1 {
            if skip_cur[r] {
                r += 1;
                continue;
            }
            if at(r, c) < at(r + 1, c) {
                r += 1;
                while r < h - 1 && at(r, c) < at(r + 1, c) {
                    r += 1;
                }
                if r == h - 1 {
                    break;
                }
            } else if at(r, c) < at(r - 1, c) {
                r += 1;
                continue;
            }
            let v = at(r, c);
            if v > at(r + 1, c) {
                skip_cur[r + 1] = true;
            }

            let mut beaten = false;
            for dr in [r - 1, r, r + 1] {
                let n = at(dr, c + 1);
                if v < n {
                    beaten = true;
                    break;
                }
                if v > n {
                    skip_next[dr] = true;
                }
            }
            if beaten || v < at(r - 1, c - 1) || v < at(r, c - 1) || v < at(r + 1, c - 1) {
                r += 1;
                continue;
            }
            peaks.push((c, r));
            r += 1;
        }
        std::mem::swap(&mut skip_cur, &mut skip_next);
        skip_next.fill(false);
    }
    Some(peaks)
}
