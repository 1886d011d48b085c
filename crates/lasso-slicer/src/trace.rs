//! Contour tracing.
//!
//! Turns a raster into closed contours made of sharp corners and cubic
//! Bézier curves, in the manner of Potrace:
//!
//! 1. Walk the pixel edges between occupied and empty cells into closed
//!    lattice loops, occupied cells on the left.
//! 2. Straighten each loop into a polygon (collinear runs merged,
//!    staircases removed with a closed Douglas-Peucker pass).
//! 3. Decide per polygon vertex whether it is a corner or the middle of a
//!    smooth curve, using Potrace's `alpha` measure.
//!
//! Holes come out as separate, clockwise contours. Nesting is not
//! reported; all loops of a raster form one flat list.

use lasso_math::{Point2, Tolerance};

use crate::raster::Raster;
use crate::toolpath::Toolpath;

/// Flatness criterion for Bézier subdivision.
pub const FLATNESS_TOLERANCE: f64 = 0.1;

/// Maximum Bézier subdivision depth.
pub const MAX_SUBDIVISION_DEPTH: u32 = 16;

/// Douglas-Peucker tolerance in cells.
const SIMPLIFY_TOLERANCE: f64 = 0.75;

/// Vertices with `alpha` at or above this become corners.
const ALPHA_MAX: f64 = 1.0;

/// Lower bound for the curve control-point position.
const ALPHA_MIN: f64 = 0.55;

// Lattice step per direction: +x, +y, -x, -y.
const DX: [i64; 4] = [1, 0, -1, 0];
const DY: [i64; 4] = [0, 1, 0, -1];

/// One piece of a contour, ending at `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurveSegment {
    /// Straight to `vertex`, then straight to `end`.
    Corner {
        /// The sharp vertex.
        vertex: Point2,
        /// Segment end.
        end: Point2,
    },
    /// Cubic Bézier to `end`.
    Bezier {
        /// First control point.
        control1: Point2,
        /// Second control point.
        control2: Point2,
        /// Segment end.
        end: Point2,
    },
}

impl CurveSegment {
    /// End point of the segment.
    pub fn end(&self) -> Point2 {
        match *self {
            CurveSegment::Corner { end, .. } | CurveSegment::Bezier { end, .. } => end,
        }
    }
}

/// A closed boundary. It starts at the last segment's end.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    /// Segments in drawing order.
    pub segments: Vec<CurveSegment>,
}

impl Contour {
    /// Start (and end) point.
    pub fn start(&self) -> Option<Point2> {
        self.segments.last().map(CurveSegment::end)
    }

    /// The contour as a polyline: the start point followed by every
    /// corner and flattened curve point, ending back at the start.
    pub fn flatten(&self) -> Vec<Point2> {
        let Some(start) = self.start() else {
            return Vec::new();
        };
        let mut points = vec![start];
        let mut prev = start;
        for seg in &self.segments {
            match *seg {
                CurveSegment::Corner { vertex, end } => {
                    points.push(vertex);
                    points.push(end);
                }
                CurveSegment::Bezier {
                    control1,
                    control2,
                    end,
                } => flatten_bezier(prev, control1, control2, end, &mut points),
            }
            prev = seg.end();
        }
        points
    }

    /// Signed area of the flattened contour, positive for
    /// counter-clockwise outlines.
    pub fn signed_area(&self) -> f64 {
        let pts = self.flatten();
        let n = pts.len();
        let mut area = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            area += pts[i].x * pts[j].y - pts[j].x * pts[i].y;
        }
        area / 2.0
    }
}

/// Trace every boundary of `raster` into world-space contours.
///
/// An empty raster gives an empty list.
pub fn trace(raster: &Raster) -> Vec<Contour> {
    let grid = *raster.grid();
    lattice_loops(raster)
        .into_iter()
        .filter_map(|lattice| {
            let polygon = straighten(&lattice);
            (polygon.len() >= 3).then(|| smooth(&polygon))
        })
        .map(|contour| to_world(contour, |p| grid.lattice_to_world(p.x, p.y)))
        .collect()
}

/// Append one closed path per contour to `toolpath` at height `z`.
pub fn emit_contours(contours: &[Contour], toolpath: &mut Toolpath, z: f64) {
    for contour in contours {
        let points = contour.flatten();
        let Some((start, rest)) = points.split_first() else {
            continue;
        };
        toolpath.start_path(start.x, start.y, z);
        for p in rest {
            toolpath.continue_path(p.x, p.y, z);
        }
        toolpath.close_path();
    }
}

/// Flatten the cubic Bézier `p1..p4`, appending the interior points and
/// `p4` to `out` (not `p1`).
pub fn flatten_bezier(p1: Point2, p2: Point2, p3: Point2, p4: Point2, out: &mut Vec<Point2>) {
    recursive_bezier(p1, p2, p3, p4, 0, out);
    out.push(p4);
}

fn recursive_bezier(
    p1: Point2,
    p2: Point2,
    p3: Point2,
    p4: Point2,
    depth: u32,
    out: &mut Vec<Point2>,
) {
    let chord = p4 - p1;
    let chord_sq = chord.norm_squared();
    if Tolerance::DEFAULT.is_zero(chord_sq) {
        return;
    }

    let p12 = midpoint(p1, p2);
    let p23 = midpoint(p2, p3);
    let p34 = midpoint(p3, p4);
    let p123 = midpoint(p12, p23);
    let p234 = midpoint(p23, p34);
    let p1234 = midpoint(p123, p234);

    if depth >= MAX_SUBDIVISION_DEPTH {
        out.push(p1234);
        return;
    }

    let d2 = ((p2.x - p4.x) * chord.y - (p2.y - p4.y) * chord.x).abs();
    let d3 = ((p3.x - p4.x) * chord.y - (p3.y - p4.y) * chord.x).abs();
    if (d2 + d3) * (d2 + d3) < FLATNESS_TOLERANCE * chord_sq {
        out.push(p1234);
        return;
    }

    recursive_bezier(p1, p12, p123, p1234, depth + 1, out);
    recursive_bezier(p1234, p234, p34, p4, depth + 1, out);
}

fn midpoint(a: Point2, b: Point2) -> Point2 {
    lerp(a, b, 0.5)
}

fn lerp(a: Point2, b: Point2, t: f64) -> Point2 {
    a + (b - a) * t
}

/// Closed lattice loops around occupied regions, as turning points in
/// absolute lattice coordinates.
///
/// At a saddle vertex (two occupied cells touching diagonally) the walk
/// prefers a left turn, so diagonal neighbours stay separate loops.
fn lattice_loops(raster: &Raster) -> Vec<Vec<(i64, i64)>> {
    let Some(window) = raster.occupied_bounds() else {
        return Vec::new();
    };
    let (c0, r0) = (window.col0 as i64, window.row0 as i64);
    let vw = (window.col1 - window.col0 + 1) as i64;
    let vh = (window.row1 - window.row0 + 1) as i64;

    // Bit d set at a vertex = unused boundary edge leaving it in direction d.
    let mut outgoing = vec![0u8; (vw * vh) as usize];
    let vertex = |x: i64, y: i64| (y * vw + x) as usize;
    for row in window.row0..window.row1 {
        for col in window.col0..window.col1 {
            if !raster.get(col, row) {
                continue;
            }
            let (c, r) = (col as i64, row as i64);
            let (x, y) = (c - c0, r - r0);
            if !raster.occupied(c, r - 1) {
                outgoing[vertex(x, y)] |= 1 << 0;
            }
            if !raster.occupied(c + 1, r) {
                outgoing[vertex(x + 1, y)] |= 1 << 1;
            }
            if !raster.occupied(c, r + 1) {
                outgoing[vertex(x + 1, y + 1)] |= 1 << 2;
            }
            if !raster.occupied(c - 1, r) {
                outgoing[vertex(x, y + 1)] |= 1 << 3;
            }
        }
    }

    let mut loops = Vec::new();
    for start in 0..outgoing.len() {
        while outgoing[start] != 0 {
            let start_dir = outgoing[start].trailing_zeros() as usize;
            outgoing[start] &= !(1 << start_dir);
            let (sx, sy) = (start as i64 % vw, start as i64 / vw);

            let mut corners = vec![(sx + c0, sy + r0)];
            let (mut x, mut y, mut dir) = (sx + DX[start_dir], sy + DY[start_dir], start_dir);
            loop {
                let here = vertex(x, y);
                let at_start = here == start;
                let next = [(dir + 1) % 4, dir, (dir + 3) % 4].into_iter().find(|&d| {
                    outgoing[here] & (1 << d) != 0 || (at_start && d == start_dir)
                });
                let Some(next) = next else {
                    // Unbalanced edge set; cannot happen for a raster boundary.
                    break;
                };
                if at_start && next == start_dir {
                    if dir == start_dir {
                        corners.remove(0);
                    }
                    break;
                }
                outgoing[here] &= !(1 << next);
                if next != dir {
                    corners.push((x + c0, y + r0));
                }
                x += DX[next];
                y += DY[next];
                dir = next;
            }
            if corners.len() >= 3 {
                loops.push(corners);
            }
        }
    }
    loops
}

/// Merge staircases into straight edges.
fn straighten(lattice: &[(i64, i64)]) -> Vec<Point2> {
    let points: Vec<Point2> = lattice
        .iter()
        .map(|&(x, y)| Point2::new(x as f64, y as f64))
        .collect();
    let simplified = simplify_closed(&points, SIMPLIFY_TOLERANCE);
    if simplified.len() >= 3 {
        simplified
    } else {
        points
    }
}

/// Douglas-Peucker on a closed ring, anchored at the first point and the
/// point farthest from it.
fn simplify_closed(points: &[Point2], tolerance: f64) -> Vec<Point2> {
    let n = points.len();
    if n <= 3 {
        return points.to_vec();
    }
    let far = (1..n)
        .max_by(|&a, &b| {
            let da = (points[a] - points[0]).norm_squared();
            let db = (points[b] - points[0]).norm_squared();
            da.total_cmp(&db)
        })
        .unwrap_or(n / 2);

    let mut ring = points.to_vec();
    ring.push(points[0]);
    let mut keep = vec![false; n + 1];
    keep[0] = true;
    keep[far] = true;
    douglas_peucker(&ring, 0, far, tolerance, &mut keep);
    douglas_peucker(&ring, far, n, tolerance, &mut keep);

    (0..n).filter(|&i| keep[i]).map(|i| points[i]).collect()
}

fn douglas_peucker(points: &[Point2], first: usize, last: usize, tolerance: f64, keep: &mut [bool]) {
    if last <= first + 1 {
        return;
    }
    let a = points[first];
    let ab = points[last] - a;
    let len = ab.norm();
    let distance = |p: Point2| {
        if len > 0.0 {
            (ab.x * (p.y - a.y) - ab.y * (p.x - a.x)).abs() / len
        } else {
            (p - a).norm()
        }
    };
    let (index, max) = (first + 1..last)
        .map(|i| (i, distance(points[i])))
        .fold((first, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
    if max > tolerance {
        keep[index] = true;
        douglas_peucker(points, first, index, tolerance, keep);
        douglas_peucker(points, index, last, tolerance, keep);
    }
}

/// Corner-or-curve decision per polygon vertex.
fn smooth(v: &[Point2]) -> Contour {
    let m = v.len();
    let segments = (0..m)
        .map(|j| {
            let i = (j + m - 1) % m;
            let k = (j + 1) % m;
            let end = midpoint(v[j], v[k]);
            let denom = ddenom(v[i], v[k]);
            let alpha = if denom != 0.0 {
                let dd = (dpara(v[i], v[j], v[k]) / denom).abs();
                let a = if dd > 1.0 { 1.0 - 1.0 / dd } else { 0.0 };
                a / 0.75
            } else {
                4.0 / 3.0
            };
            if alpha >= ALPHA_MAX {
                CurveSegment::Corner { vertex: v[j], end }
            } else {
                let alpha = alpha.clamp(ALPHA_MIN, 1.0);
                let t = 0.5 + 0.5 * alpha;
                CurveSegment::Bezier {
                    control1: lerp(v[i], v[j], t),
                    control2: lerp(v[k], v[j], t),
                    end,
                }
            }
        })
        .collect();
    Contour { segments }
}

/// Parallelogram area spanned by `p0->p1` and `p0->p2`.
fn dpara(p0: Point2, p1: Point2, p2: Point2) -> f64 {
    (p1.x - p0.x) * (p2.y - p0.y) - (p2.x - p0.x) * (p1.y - p0.y)
}

/// Denominator of the alpha measure: the extent of `p0->p2` against
/// the L-infinity normal of that direction.
fn ddenom(p0: Point2, p2: Point2) -> f64 {
    let ry = sign(p2.x - p0.x);
    let rx = -sign(p2.y - p0.y);
    ry * (p2.x - p0.x) - rx * (p2.y - p0.y)
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn to_world(contour: Contour, map: impl Fn(Point2) -> Point2) -> Contour {
    let segments = contour
        .segments
        .into_iter()
        .map(|seg| match seg {
            CurveSegment::Corner { vertex, end } => CurveSegment::Corner {
                vertex: map(vertex),
                end: map(end),
            },
            CurveSegment::Bezier {
                control1,
                control2,
                end,
            } => CurveSegment::Bezier {
                control1: map(control1),
                control2: map(control2),
                end: map(end),
            },
        })
        .collect();
    Contour { segments }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::RasterGrid;
    use approx::assert_relative_eq;

    fn grid(w: usize, h: usize, res: f64) -> RasterGrid {
        RasterGrid::new(Point2::new(5.0, 5.0), res, w, h)
    }

    fn fill_rect(r: &mut Raster, col0: usize, row0: usize, col1: usize, row1: usize) {
        for row in row0..row1 {
            for col in col0..col1 {
                r.set(col, row, true);
            }
        }
    }

    #[test]
    fn test_empty_raster_has_no_contours() {
        let r = Raster::new(grid(10, 10, 1.0));
        assert!(trace(&r).is_empty());
    }

    #[test]
    fn test_rectangle_traces_to_corners() {
        let mut r = Raster::new(grid(40, 40, 0.5));
        fill_rect(&mut r, 4, 6, 24, 18);
        let contours = trace(&r);
        assert_eq!(contours.len(), 1);
        let c = &contours[0];
        assert_eq!(c.segments.len(), 4);
        assert!(c
            .segments
            .iter()
            .all(|s| matches!(s, CurveSegment::Corner { .. })));
        // 10mm x 6mm, counter-clockwise
        assert_relative_eq!(c.signed_area(), 60.0, epsilon = 1e-9);
        let corners: Vec<Point2> = c
            .segments
            .iter()
            .map(|s| match s {
                CurveSegment::Corner { vertex, .. } => *vertex,
                _ => unreachable!(),
            })
            .collect();
        assert!(corners.contains(&Point2::new(7.0, 8.0)));
        assert!(corners.contains(&Point2::new(17.0, 14.0)));
    }

    #[test]
    fn test_rectangle_round_trip_is_exact() {
        let mut r = Raster::new(grid(40, 40, 0.5));
        fill_rect(&mut r, 4, 6, 24, 18);
        let loops: Vec<Vec<Point2>> = trace(&r).iter().map(Contour::flatten).collect();
        let mut back = Raster::new(*r.grid());
        back.fill_polygons(&loops);
        assert_eq!(back, r);
    }

    #[test]
    fn test_disc_round_trip_within_tolerance() {
        let g = grid(60, 60, 0.2);
        let mut r = Raster::new(g);
        for row in 0..60 {
            for col in 0..60 {
                let dx = col as f64 + 0.5 - 30.0;
                let dy = row as f64 + 0.5 - 30.0;
                r.set(col, row, dx * dx + dy * dy < 20.0 * 20.0);
            }
        }
        let contours = trace(&r);
        assert_eq!(contours.len(), 1);
        assert!(contours[0]
            .segments
            .iter()
            .any(|s| matches!(s, CurveSegment::Bezier { .. })));

        let loops: Vec<Vec<Point2>> = contours.iter().map(Contour::flatten).collect();
        let mut back = Raster::new(g);
        back.fill_polygons(&loops);

        let mut extra = back.clone();
        extra.and_not(Some(&r)).unwrap();
        let mut missing = r.clone();
        missing.and_not(Some(&back)).unwrap();
        let differing = extra.count() + missing.count();
        // at most a fraction of the boundary cells may flip
        assert!(differing < 126, "{differing} cells differ");
    }

    #[test]
    fn test_hole_gives_clockwise_contour() {
        let mut r = Raster::new(grid(40, 40, 1.0));
        fill_rect(&mut r, 2, 2, 32, 32);
        for row in 10..22 {
            for col in 10..22 {
                r.set(col, row, false);
            }
        }
        let contours = trace(&r);
        assert_eq!(contours.len(), 2);
        let mut areas: Vec<f64> = contours.iter().map(Contour::signed_area).collect();
        areas.sort_by(f64::total_cmp);
        assert_relative_eq!(areas[0], -144.0, epsilon = 1e-9);
        assert_relative_eq!(areas[1], 900.0, epsilon = 1e-9);
    }

    #[test]
    fn test_diagonal_neighbours_stay_separate() {
        let mut r = Raster::new(grid(30, 30, 1.0));
        fill_rect(&mut r, 2, 2, 12, 12);
        fill_rect(&mut r, 12, 12, 22, 22);
        assert_eq!(trace(&r).len(), 2);
    }

    #[test]
    fn test_flatten_bezier_ends_at_end() {
        let mut out = Vec::new();
        let p1 = Point2::new(0.0, 0.0);
        let p4 = Point2::new(10.0, 0.0);
        flatten_bezier(p1, Point2::new(0.0, 10.0), Point2::new(10.0, 10.0), p4, &mut out);
        assert_eq!(*out.last().unwrap(), p4);
        assert!(out.len() > 4);
        // the curve peaks at 7.5
        let top = out.iter().map(|p| p.y).fold(0.0, f64::max);
        assert!(top > 7.0 && top <= 7.5 + 1e-9);
    }

    #[test]
    fn test_flatten_straight_bezier() {
        let mut out = Vec::new();
        flatten_bezier(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(3.0, 0.0),
            &mut out,
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_flatten_zero_chord_terminates() {
        let mut out = Vec::new();
        let p = Point2::new(1.0, 1.0);
        flatten_bezier(p, Point2::new(5.0, 5.0), Point2::new(-5.0, 5.0), p, &mut out);
        assert_eq!(out, vec![p]);
    }

    #[test]
    fn test_emit_contours() {
        let mut r = Raster::new(grid(40, 40, 0.5));
        fill_rect(&mut r, 4, 6, 24, 18);
        let mut tp = Toolpath::new(0.3);
        emit_contours(&trace(&r), &mut tp, 0.3);
        let rapids = tp.motions().filter(|m| m.rapid).count();
        assert_eq!(rapids, 1);
        assert_eq!(tp.len(), 9);
        assert_relative_eq!(tp.print_length(), 32.0, epsilon = 1e-9);
        assert_eq!(tp.cursor(), tp.first());
        assert!(tp.motions().all(|m| m.end.z == 0.3));
    }
}
