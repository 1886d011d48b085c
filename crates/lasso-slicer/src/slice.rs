//! Mesh slicing - intersect the triangle mesh with horizontal planes
//! and rasterize the cross-sections.

use lasso_math::Point2;

use crate::error::Result;
use crate::mesh::Triangle;
use crate::raster::{Raster, RasterGrid};

/// Z heights of the layers for a model spanning `min_z..max_z`.
///
/// Layer `i` sits at `min_z + (first_layer_factor + i) * layer_height`;
/// layers are generated while below `max_z`. Computing each height from
/// its index keeps rounding drift from accumulating.
pub fn layer_heights(min_z: f64, max_z: f64, layer_height: f64, first_layer_factor: f64) -> Vec<f64> {
    let mut heights = Vec::new();
    let span = max_z - min_z;
    let finite = layer_height.is_finite() && span.is_finite() && first_layer_factor.is_finite();
    if !(finite && layer_height > 0.0 && span > 0.0) {
        return heights;
    }
    let limit = (span / layer_height).ceil() as usize + 1;
    for i in 0..=limit {
        let z = min_z + (first_layer_factor + i as f64) * layer_height;
        if !(z < max_z) {
            break;
        }
        heights.push(z);
    }
    heights
}

/// Cross-section boundary segments of `triangles` at height `z`.
///
/// Segments are not chained; the raster fill only needs the edge set.
pub fn plane_segments(triangles: &[Triangle], z: f64) -> Vec<(Point2, Point2)> {
    triangles
        .iter()
        .filter(|tri| tri.z_min <= z && tri.z_max >= z)
        .filter_map(|tri| triangle_plane_intersection(tri, z))
        .collect()
}

/// Rasterize the cross-section of `triangles` at `z` onto `grid`.
pub fn rasterize_layer(triangles: &[Triangle], z: f64, grid: RasterGrid) -> Result<Raster> {
    let mut raster = Raster::try_new(grid)?;
    raster.fill_segments(&plane_segments(triangles, z));
    Ok(raster)
}

/// Intersect a triangle with the plane at `z`.
///
/// A vertex counts as above when `v.z >= z`, so a vertex exactly on the
/// plane never produces a lone touching point: every triangle yields
/// either no crossing or exactly two.
fn triangle_plane_intersection(tri: &Triangle, z: f64) -> Option<(Point2, Point2)> {
    let [v0, v1, v2] = tri.vertices;
    let mut points = [Point2::origin(); 2];
    let mut found = 0;
    for (a, b) in [(v0, v1), (v1, v2), (v2, v0)] {
        if (a.z >= z) == (b.z >= z) {
            continue;
        }
        let t = (z - a.z) / (b.z - a.z);
        if found < 2 {
            points[found] = Point2::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y));
        }
        found += 1;
    }
    (found == 2).then_some((points[0], points[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::TriangleMesh;

    fn make_cube_mesh(size: f32) -> TriangleMesh {
        let vertices = vec![
            // Bottom face (z=0)
            0.0, 0.0, 0.0, size, 0.0, 0.0, size, size, 0.0, 0.0, size, 0.0,
            // Top face (z=size)
            0.0, 0.0, size, size, 0.0, size, size, size, size, 0.0, size, size,
        ];
        let indices = vec![
            0, 2, 1, 0, 3, 2, // Bottom
            4, 5, 6, 4, 6, 7, // Top
            0, 1, 5, 0, 5, 4, // Front
            2, 3, 7, 2, 7, 6, // Back
            0, 4, 7, 0, 7, 3, // Left
            1, 2, 6, 1, 6, 5, // Right
        ];
        TriangleMesh {
            vertices,
            indices,
            normals: Vec::new(),
        }
    }

    #[test]
    fn test_layer_heights() {
        let heights = layer_heights(0.0, 10.0, 0.2, 0.9);
        assert_eq!(heights.len(), 50);
        assert!((heights[0] - 0.18).abs() < 1e-12);
        assert!(*heights.last().unwrap() < 10.0);
        assert!(layer_heights(5.0, 5.0, 0.2, 0.9).is_empty());
        assert!(layer_heights(0.0, 1.0, 0.0, 0.9).is_empty());
    }

    #[test]
    fn test_layer_heights_non_finite() {
        assert!(layer_heights(0.0, 10.0, f64::NAN, 0.9).is_empty());
        assert!(layer_heights(0.0, 10.0, 0.2, f64::NAN).is_empty());
        assert!(layer_heights(f64::NAN, 10.0, 0.2, 0.9).is_empty());
        assert!(layer_heights(0.0, f64::INFINITY, 0.2, 0.9).is_empty());
        // bounded even for a tiny layer height
        assert_eq!(layer_heights(0.0, 1.0, 1e-3, 0.5).len(), 1000);
    }

    #[test]
    fn test_cube_section() {
        let tris = make_cube_mesh(10.0).triangles().unwrap();
        let segments = plane_segments(&tris, 5.0);
        // two triangles per side face
        assert_eq!(segments.len(), 8);

        let grid = RasterGrid::new(Point2::new(-1.0, -1.0), 0.5, 24, 24);
        let raster = rasterize_layer(&tris, 5.0, grid).unwrap();
        assert_eq!(raster.count(), 20 * 20);
    }

    #[test]
    fn test_plane_through_vertices() {
        // plane exactly at the bottom face: faces lying in the plane
        // and side faces touching it never produce stray segments
        let tris = make_cube_mesh(10.0).triangles().unwrap();
        let segments = plane_segments(&tris, 0.0);
        assert_eq!(segments.len() % 2, 0);
        let grid = RasterGrid::new(Point2::new(-1.0, -1.0), 0.5, 24, 24);
        let raster = rasterize_layer(&tris, 0.0, grid).unwrap();
        assert!(raster.count() == 0 || raster.count() == 400);
    }

    #[test]
    fn test_outside_z_is_empty() {
        let tris = make_cube_mesh(10.0).triangles().unwrap();
        assert!(plane_segments(&tris, 12.0).is_empty());
    }
}
