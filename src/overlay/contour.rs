//! External contour extraction from binary masks.
//!
//! Border following is done by `imageproc` (Suzuki-Abe). Only top-level outer
//! borders are kept: holes are ignored, and so is any region sitting inside
//! another region's hole. Each border is then compressed by dropping every
//! point that continues a straight horizontal, vertical or diagonal run, so a
//! filled rectangle comes back as its four corners.

use imageproc::contours::{find_contours, BorderType};

use crate::segment::Mask;

/// A closed polygon in pixel coordinates, in tracing order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    pub points: Vec<(i32, i32)>,
}

/// Find the external contours of every region in `mask`.
pub fn find_external_contours(mask: &Mask) -> Vec<Contour> {
    if mask.width() == 0 || mask.height() == 0 {
        return Vec::new();
    }
    find_contours::<i32>(mask.as_gray())
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            let chain: Vec<(i32, i32)> = c.points.iter().map(|p| (p.x, p.y)).collect();
            Contour {
                points: simplify_chain(&chain),
            }
        })
        .collect()
}

/// Drop points that continue a straight run of the closed chain.
fn simplify_chain(chain: &[(i32, i32)]) -> Vec<(i32, i32)> {
    let mut chain = chain.to_vec();
    chain.dedup();
    while chain.len() > 1 && chain.first() == chain.last() {
        chain.pop();
    }
    if chain.len() <= 2 {
        return chain;
    }
    let n = chain.len();
    let step = |a: (i32, i32), b: (i32, i32)| ((b.0 - a.0).signum(), (b.1 - a.1).signum());
    (0..n)
        .filter(|&i| {
            let prev = chain[(i + n - 1) % n];
            let next = chain[(i + 1) % n];
            step(prev, chain[i]) != step(chain[i], next)
        })
        .map(|i| chain[i])
        .collect()
}
