//! Raster layer buffer.
//!
//! A [`Raster`] is the occupancy bitmap of one cross-section: a cell is
//! occupied when its centre lies inside the model. Rasters live on a
//! [`RasterGrid`] aligned to the build plate, so every layer of a slicing
//! run shares one lattice and boolean operations work cell by cell.

use std::f64::consts::SQRT_2;

use image::{GrayImage, Luma};
use lasso_math::Point2;

use crate::error::{Result, SlicerError};
use crate::toolpath::Toolpath;

/// Placement of a raster on the build plate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGrid {
    /// World position of the lower-left corner of cell (0, 0).
    pub origin: Point2,
    /// Cell edge length (mm).
    pub resolution: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl RasterGrid {
    /// Create a grid.
    pub fn new(origin: Point2, resolution: f64, width: usize, height: usize) -> Self {
        Self {
            origin,
            resolution,
            width,
            height,
        }
    }

    /// A grid covering a whole `bed_x` by `bed_y` build plate.
    pub fn for_build_plate(bed_x: f64, bed_y: f64, resolution: f64) -> Self {
        let width = (bed_x / resolution - CELL_EPSILON).ceil().max(0.0) as usize;
        let height = (bed_y / resolution - CELL_EPSILON).ceil().max(0.0) as usize;
        Self::new(Point2::origin(), resolution, width, height)
    }

    /// The part of this grid covering `min..max` grown by `margin`.
    ///
    /// The lattice is kept, only the window shrinks, so rasters on
    /// cropped grids still line up with the plate.
    pub fn cropped_to(&self, min: Point2, max: Point2, margin: f64) -> Self {
        let res = self.resolution;
        let col0 = clamp_index(((min.x - margin - self.origin.x) / res).floor(), self.width);
        let col1 = clamp_index(((max.x + margin - self.origin.x) / res).ceil(), self.width).max(col0);
        let row0 = clamp_index(((min.y - margin - self.origin.y) / res).floor(), self.height);
        let row1 = clamp_index(((max.y + margin - self.origin.y) / res).ceil(), self.height).max(row0);
        Self {
            origin: Point2::new(
                self.origin.x + col0 as f64 * res,
                self.origin.y + row0 as f64 * res,
            ),
            resolution: res,
            width: col1 - col0,
            height: row1 - row0,
        }
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    /// Total number of cells, `None` when it overflows `usize`.
    pub fn checked_cell_count(&self) -> Option<usize> {
        self.width.checked_mul(self.height)
    }

    /// World position of the centre of a cell.
    pub fn cell_center(&self, col: usize, row: usize) -> Point2 {
        self.lattice_to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// World position of a (fractional) lattice coordinate.
    pub fn lattice_to_world(&self, x: f64, y: f64) -> Point2 {
        Point2::new(
            self.origin.x + x * self.resolution,
            self.origin.y + y * self.resolution,
        )
    }

    /// Lattice coordinate of a world position.
    pub fn world_to_lattice(&self, p: Point2) -> (f64, f64) {
        (
            (p.x - self.origin.x) / self.resolution,
            (p.y - self.origin.y) / self.resolution,
        )
    }

    /// First cell index whose centre is at or after lattice coordinate `t`.
    fn first_center_at_or_after(t: f64, len: usize) -> usize {
        clamp_index((t - 0.5).ceil(), len)
    }
}

/// Slack, in cells, for plate sizes that are an exact multiple of the
/// resolution.
const CELL_EPSILON: f64 = 1e-9;

fn clamp_index(v: f64, len: usize) -> usize {
    v.clamp(0.0, len as f64) as usize
}

/// Half-open cell window `col0..col1` by `row0..row1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellWindow {
    /// First column.
    pub col0: usize,
    /// First row.
    pub row0: usize,
    /// One past the last column.
    pub col1: usize,
    /// One past the last row.
    pub row1: usize,
}

/// Occupancy bitmap of one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    grid: RasterGrid,
    cells: Vec<bool>,
}

impl Raster {
    /// An empty raster on `grid`.
    ///
    /// Aborts like any `Vec` when the buffer cannot be allocated; use
    /// [`Raster::try_new`] for grids derived from user settings.
    pub fn new(grid: RasterGrid) -> Self {
        Self {
            grid,
            cells: vec![false; grid.cell_count()],
        }
    }

    /// An empty raster on `grid`, reporting allocation failure.
    pub fn try_new(grid: RasterGrid) -> Result<Self> {
        let failed = || SlicerError::RasterAllocation {
            width: grid.width,
            height: grid.height,
        };
        let count = grid.checked_cell_count().ok_or_else(failed)?;
        let mut cells = Vec::new();
        cells.try_reserve_exact(count).map_err(|_| failed())?;
        cells.resize(count, false);
        Ok(Self { grid, cells })
    }

    /// The grid this raster lives on.
    pub fn grid(&self) -> &RasterGrid {
        &self.grid
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.grid.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.grid.height
    }

    /// Whether a cell is occupied. Cells outside the grid are empty.
    pub fn get(&self, col: usize, row: usize) -> bool {
        col < self.grid.width && row < self.grid.height && self.cells[row * self.grid.width + col]
    }

    /// Signed lookup used by neighbourhood scans.
    pub(crate) fn occupied(&self, col: i64, row: i64) -> bool {
        col >= 0 && row >= 0 && self.get(col as usize, row as usize)
    }

    /// Set a cell. Writes outside the grid are ignored.
    pub fn set(&mut self, col: usize, row: usize, value: bool) {
        if col < self.grid.width && row < self.grid.height {
            self.cells[row * self.grid.width + col] = value;
        }
    }

    /// Number of occupied cells.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// True when no cell is occupied.
    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&c| c)
    }

    /// Make every cell empty.
    pub fn clear(&mut self) {
        self.cells.fill(false);
    }

    /// Overwrite this raster with `other`, reusing the allocation.
    pub fn copy_from(&mut self, other: &Raster) {
        self.grid = other.grid;
        self.cells.clear();
        self.cells.extend_from_slice(&other.cells);
    }

    fn check_grid(&self, other: &Raster) -> Result<()> {
        if self.grid != other.grid {
            return Err(SlicerError::GridMismatch {
                expected: self.grid,
                found: other.grid,
            });
        }
        Ok(())
    }

    /// Intersect in place. A missing operand counts as all empty.
    pub fn and(&mut self, other: Option<&Raster>) -> Result<()> {
        match other {
            Some(other) => {
                self.check_grid(other)?;
                for (cell, &o) in self.cells.iter_mut().zip(&other.cells) {
                    *cell &= o;
                }
            }
            None => self.clear(),
        }
        Ok(())
    }

    /// Subtract in place. A missing operand leaves the raster unchanged.
    pub fn and_not(&mut self, other: Option<&Raster>) -> Result<()> {
        if let Some(other) = other {
            self.check_grid(other)?;
            for (cell, &o) in self.cells.iter_mut().zip(&other.cells) {
                *cell &= !o;
            }
        }
        Ok(())
    }

    /// Keep only occupied cells on diagonal strips.
    ///
    /// Strips are `line_width` wide and separated by gaps of `spacing`,
    /// both measured across the strip in mm. Even layers run at +45°,
    /// odd layers at -45°, so consecutive layers cross-hatch. Strips are
    /// anchored in world coordinates and line up between layers of the
    /// same parity.
    pub fn overlay_infill_pattern(&mut self, layer_index: usize, spacing: f64, line_width: f64) {
        let period = spacing + line_width;
        if period <= 0.0 || line_width <= 0.0 {
            self.clear();
            return;
        }
        let Some(window) = self.occupied_bounds() else {
            return;
        };
        let rising = layer_index % 2 == 0;
        for row in window.row0..window.row1 {
            for col in window.col0..window.col1 {
                let idx = row * self.grid.width + col;
                if !self.cells[idx] {
                    continue;
                }
                let c = self.grid.cell_center(col, row);
                let across = (if rising { c.y - c.x } else { c.x + c.y }) / SQRT_2;
                if across.rem_euclid(period) >= line_width {
                    self.cells[idx] = false;
                }
            }
        }
    }

    /// Smallest window containing every occupied cell.
    pub fn occupied_bounds(&self) -> Option<CellWindow> {
        let w = self.grid.width;
        let mut window: Option<CellWindow> = None;
        for (idx, _) in self.cells.iter().enumerate().filter(|(_, &c)| c) {
            let (col, row) = (idx % w, idx / w);
            let win = window.get_or_insert(CellWindow {
                col0: col,
                row0: row,
                col1: col + 1,
                row1: row + 1,
            });
            win.col0 = win.col0.min(col);
            win.col1 = win.col1.max(col + 1);
            win.row1 = row + 1;
        }
        window
    }

    /// Even-odd fill of closed world-space loops, sampled at cell centres.
    ///
    /// Cells inside are set; cells already occupied stay occupied.
    pub fn fill_polygons(&mut self, loops: &[Vec<Point2>]) {
        let edges = loops.iter().flat_map(|ring| {
            let n = ring.len();
            (0..n).map(move |i| (ring[i], ring[(i + 1) % n]))
        });
        self.fill_edges(edges);
    }

    /// Even-odd fill from unchained boundary segments, as produced by
    /// cutting a closed mesh with a plane.
    pub fn fill_segments(&mut self, segments: &[(Point2, Point2)]) {
        self.fill_edges(segments.iter().copied());
    }

    fn fill_edges(&mut self, edges: impl Iterator<Item = (Point2, Point2)>) {
        let grid = self.grid;
        let mut crossings: Vec<Vec<f64>> = vec![Vec::new(); grid.height];
        for (a, b) in edges {
            if a.y == b.y {
                continue;
            }
            let (lo, hi) = if a.y < b.y { (a, b) } else { (b, a) };
            let (_, lo_row) = grid.world_to_lattice(lo);
            let (_, hi_row) = grid.world_to_lattice(hi);
            let r0 = RasterGrid::first_center_at_or_after(lo_row, grid.height);
            let r1 = RasterGrid::first_center_at_or_after(hi_row, grid.height);
            for (row, xs) in crossings.iter_mut().enumerate().take(r1).skip(r0) {
                let y = grid.cell_center(0, row).y;
                let t = (y - lo.y) / (hi.y - lo.y);
                xs.push(lo.x + t * (hi.x - lo.x));
            }
        }
        for (row, xs) in crossings.iter_mut().enumerate() {
            xs.sort_by(f64::total_cmp);
            for pair in xs.chunks_exact(2) {
                let c0 = RasterGrid::first_center_at_or_after(
                    (pair[0] - grid.origin.x) / grid.resolution,
                    grid.width,
                );
                let c1 = RasterGrid::first_center_at_or_after(
                    (pair[1] - grid.origin.x) / grid.resolution,
                    grid.width,
                );
                let start = row * grid.width;
                for cell in &mut self.cells[start + c0..start + c1.max(c0)] {
                    *cell = true;
                }
            }
        }
    }

    /// Shrink the occupied region.
    ///
    /// Keeps only cells whose centre is farther than `distance` (mm) from
    /// the centre of every empty cell. Cells outside the grid count as
    /// empty. Uses an exact Euclidean distance transform over the
    /// occupied window.
    pub fn erode(&mut self, distance: f64) {
        if distance <= 0.0 {
            return;
        }
        let Some(window) = self.occupied_bounds() else {
            return;
        };
        // One empty cell of padding guarantees every nearest empty cell
        // lies inside the transformed window.
        let pw = window.col1 - window.col0 + 2;
        let ph = window.row1 - window.row0 + 2;
        let mut dist = vec![0.0f64; pw * ph];
        for py in 1..ph - 1 {
            for px in 1..pw - 1 {
                if self.get(window.col0 + px - 1, window.row0 + py - 1) {
                    dist[py * pw + px] = UNREACHED;
                }
            }
        }

        let longest = pw.max(ph);
        let mut f = vec![0.0; longest];
        let mut d = vec![0.0; longest];
        let mut v = vec![0usize; longest];
        let mut z = vec![0.0; longest + 1];

        for px in 0..pw {
            for py in 0..ph {
                f[py] = dist[py * pw + px];
            }
            distance_transform_1d(&f[..ph], &mut d[..ph], &mut v, &mut z);
            for py in 0..ph {
                dist[py * pw + px] = d[py];
            }
        }
        for py in 0..ph {
            f[..pw].copy_from_slice(&dist[py * pw..(py + 1) * pw]);
            distance_transform_1d(&f[..pw], &mut d[..pw], &mut v, &mut z);
            dist[py * pw..(py + 1) * pw].copy_from_slice(&d[..pw]);
        }

        let limit = distance / self.grid.resolution;
        let limit_sq = limit * limit;
        for py in 1..ph - 1 {
            for px in 1..pw - 1 {
                if dist[py * pw + px] <= limit_sq {
                    self.set(window.col0 + px - 1, window.row0 + py - 1, false);
                }
            }
        }
    }

    /// Clear every cell whose centre lies closer than `width / 2` to the
    /// segment `a..b`.
    pub fn stroke_clear(&mut self, a: Point2, b: Point2, width: f64) {
        let grid = self.grid;
        let half = width / 2.0;
        let (ax, ay) = grid.world_to_lattice(a);
        let (bx, by) = grid.world_to_lattice(b);
        let r = half / grid.resolution;
        let c0 = RasterGrid::first_center_at_or_after(ax.min(bx) - r, grid.width);
        let c1 = clamp_index((ax.max(bx) + r + 0.5).floor(), grid.width);
        let r0 = RasterGrid::first_center_at_or_after(ay.min(by) - r, grid.height);
        let r1 = clamp_index((ay.max(by) + r + 0.5).floor(), grid.height);
        let ab = b - a;
        let len_sq = ab.norm_squared();
        for row in r0..r1 {
            for col in c0..c1 {
                let p = grid.cell_center(col, row);
                let t = if len_sq > 0.0 {
                    ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let nearest = a + ab * t;
                if (p - nearest).norm() < half {
                    self.cells[row * grid.width + col] = false;
                }
            }
        }
    }

    /// Clear the area swept by every printing motion of `toolpath`
    /// extruded at `width`.
    pub fn clear_footprint(&mut self, toolpath: &Toolpath, width: f64) {
        for m in toolpath.motions().filter(|m| !m.rapid) {
            self.stroke_clear(m.start.xy(), m.end.xy(), width);
        }
    }

    /// Export as a grayscale image, occupied cells white, +Y up.
    pub fn to_image(&self) -> GrayImage {
        let (w, h) = (self.grid.width as u32, self.grid.height as u32);
        GrayImage::from_fn(w, h, |x, y| {
            let row = (h - 1 - y) as usize;
            Luma([if self.get(x as usize, row) { 255 } else { 0 }])
        })
    }
}

const UNREACHED: f64 = 1e20;

/// Felzenszwalb-Huttenlocher squared distance transform of one line.
///
/// `v` needs `f.len()` slots and `z` one more.
fn distance_transform_1d(f: &[f64], d: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let parabola_cross = |q: usize, p: usize| {
        let (qf, pf) = (q as f64, p as f64);
        ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
    };
    let mut k = 0;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in 1..n {
        let mut s = parabola_cross(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = parabola_cross(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }
    k = 0;
    for (q, out) in d.iter_mut().enumerate().take(n) {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let dq = q as f64 - v[k] as f64;
        *out = dq * dq + f[v[k]];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_grid(w: usize, h: usize) -> RasterGrid {
        RasterGrid::new(Point2::origin(), 1.0, w, h)
    }

    fn rect(grid: RasterGrid, col0: usize, row0: usize, col1: usize, row1: usize) -> Raster {
        let mut r = Raster::new(grid);
        for row in row0..row1 {
            for col in col0..col1 {
                r.set(col, row, true);
            }
        }
        r
    }

    #[test]
    fn test_boolean_identities() {
        let a = rect(unit_grid(20, 20), 3, 4, 12, 15);
        let empty = Raster::new(unit_grid(20, 20));

        let mut r = a.clone();
        r.and(Some(&a)).unwrap();
        assert_eq!(r, a);

        let mut r = a.clone();
        r.and_not(Some(&a)).unwrap();
        assert!(r.is_empty());

        let mut r = a.clone();
        r.and(Some(&empty)).unwrap();
        assert!(r.is_empty());

        let mut r = a.clone();
        r.and_not(Some(&empty)).unwrap();
        assert_eq!(r, a);
    }

    #[test]
    fn test_missing_operand() {
        let a = rect(unit_grid(10, 10), 2, 2, 8, 8);
        let mut r = a.clone();
        r.and(None).unwrap();
        assert!(r.is_empty());

        let mut r = a.clone();
        r.and_not(None).unwrap();
        assert_eq!(r, a);
    }

    #[test]
    fn test_grid_mismatch() {
        let mut a = rect(unit_grid(10, 10), 2, 2, 8, 8);
        let b = Raster::new(unit_grid(11, 10));
        assert!(matches!(
            a.and(Some(&b)),
            Err(SlicerError::GridMismatch { .. })
        ));
        assert_eq!(a.count(), 36);
    }

    #[test]
    fn test_fill_rectangle_exact() {
        let mut r = Raster::new(RasterGrid::new(Point2::origin(), 0.5, 40, 40));
        r.fill_polygons(&[vec![
            Point2::new(2.0, 3.0),
            Point2::new(8.0, 3.0),
            Point2::new(8.0, 5.5),
            Point2::new(2.0, 5.5),
        ]]);
        // 6mm x 2.5mm at 0.5mm cells
        assert_eq!(r.count(), 12 * 5);
        assert!(r.get(4, 6));
        assert!(!r.get(3, 6));
        assert_eq!(
            r.occupied_bounds(),
            Some(CellWindow {
                col0: 4,
                row0: 6,
                col1: 16,
                row1: 11
            })
        );
    }

    #[test]
    fn test_fill_with_hole() {
        let mut r = Raster::new(unit_grid(20, 20));
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        let hole = vec![
            Point2::new(3.0, 3.0),
            Point2::new(3.0, 7.0),
            Point2::new(7.0, 7.0),
            Point2::new(7.0, 3.0),
        ];
        r.fill_polygons(&[outer, hole]);
        assert_eq!(r.count(), 100 - 16);
        assert!(!r.get(5, 5));
    }

    #[test]
    fn test_erode_square() {
        let mut r = rect(unit_grid(60, 60), 5, 5, 55, 55);
        r.erode(1.0);
        assert_eq!(r.occupied_bounds().unwrap().col0, 6);
        assert_eq!(r.count(), 48 * 48);
        r.erode(2.0);
        assert_eq!(r.count(), 44 * 44);
    }

    #[test]
    fn test_erode_touching_grid_edge() {
        let mut r = rect(unit_grid(10, 10), 0, 0, 10, 10);
        r.erode(1.0);
        assert_eq!(r.count(), 8 * 8);
        assert!(!r.get(0, 5));
    }

    #[test]
    fn test_erode_to_nothing() {
        let mut r = rect(unit_grid(10, 10), 2, 2, 6, 6);
        r.erode(2.0);
        assert!(r.is_empty());
    }

    #[test]
    fn test_overlay_is_subset_and_alternates() {
        let grid = RasterGrid::new(Point2::origin(), 0.1, 200, 200);
        let full = rect(grid, 0, 0, 200, 200);

        let mut even = full.clone();
        even.overlay_infill_pattern(0, 1.2, 0.4);
        let mut odd = full.clone();
        odd.overlay_infill_pattern(1, 1.2, 0.4);

        assert!(!even.is_empty());
        assert_ne!(even, odd);
        // roughly a quarter of the cells stay
        let ratio = even.count() as f64 / full.count() as f64;
        assert!((ratio - 0.25).abs() < 0.05);

        let mut outside = even.clone();
        outside.and_not(Some(&full)).unwrap();
        assert!(outside.is_empty());
    }

    #[test]
    fn test_overlay_never_sets_cells() {
        let mut r = rect(unit_grid(20, 20), 5, 5, 10, 10);
        r.overlay_infill_pattern(0, 0.5, 3.0);
        assert!(r.count() <= 25);
        assert!(!r.get(2, 2));
    }

    #[test]
    fn test_stroke_clear() {
        let mut r = rect(unit_grid(20, 20), 0, 0, 20, 20);
        r.stroke_clear(Point2::new(2.0, 10.5), Point2::new(18.0, 10.5), 1.0);
        assert!(!r.get(10, 10));
        assert!(r.get(10, 12));
        assert!(r.get(0, 10));
        assert_eq!(r.count(), 400 - 16);
    }

    #[test]
    fn test_cropped_grid_keeps_lattice() {
        let plate = RasterGrid::for_build_plate(220.0, 220.0, 0.1);
        assert_eq!(plate.width, 2200);
        let crop = plate.cropped_to(Point2::new(10.04, 20.0), Point2::new(20.0, 30.0), 1.0);
        let (cx, _) = plate.world_to_lattice(crop.origin);
        assert!((cx - cx.round()).abs() < 1e-9);
        assert!(crop.origin.x <= 9.04 + 1e-9);
        assert!(crop.lattice_to_world(crop.width as f64, 0.0).x >= 21.0 - 1e-9);
        assert!(crop.width < 150);
    }

    #[test]
    fn test_copy_from_and_image() {
        let a = rect(unit_grid(8, 4), 1, 0, 3, 1);
        let mut b = Raster::new(unit_grid(2, 2));
        b.copy_from(&a);
        assert_eq!(a, b);
        let img = b.to_image();
        assert_eq!(img.dimensions(), (8, 4));
        assert_eq!(img.get_pixel(1, 3).0[0], 255);
        assert_eq!(img.get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn test_try_new() {
        let r = Raster::try_new(unit_grid(6, 3)).unwrap();
        assert_eq!(r.width(), 6);
        assert!(r.is_empty());

        let huge = RasterGrid::new(Point2::origin(), 1.0, usize::MAX, 2);
        assert!(huge.checked_cell_count().is_none());
        assert!(matches!(
            Raster::try_new(huge),
            Err(SlicerError::RasterAllocation { .. })
        ));
    }
}
