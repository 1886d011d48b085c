//! Triangle mesh input.

use lasso_math::{Bounds3, Point3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlicerError};

/// Triangulated input geometry.
///
/// Flat buffers as produced by a mesh reader: `vertices` holds xyz
/// triples, `indices` holds one vertex-index triple per triangle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    /// Vertex positions, three floats per vertex (mm).
    pub vertices: Vec<f32>,
    /// Triangle corner indices, three per triangle.
    pub indices: Vec<u32>,
    /// Optional per-vertex normals, three floats per vertex.
    #[serde(default)]
    pub normals: Vec<f32>,
}

/// A triangle with its vertices and bounding Z range.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    /// Corner positions.
    pub vertices: [Point3; 3],
    /// Lowest corner Z.
    pub z_min: f64,
    /// Highest corner Z.
    pub z_max: f64,
}

impl TriangleMesh {
    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// True when the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Position of vertex `i`.
    pub fn vertex(&self, i: usize) -> Option<Point3> {
        let v = self.vertices.get(i * 3..i * 3 + 3)?;
        Some(Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
    }

    /// Axis-aligned bounds of all vertices, `None` for an empty mesh.
    pub fn bounds(&self) -> Option<Bounds3> {
        Bounds3::from_points((0..self.vertex_count()).filter_map(|i| self.vertex(i)))
    }

    /// Check that the buffers are consistent and every triangle
    /// references existing vertices.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(SlicerError::EmptyMesh);
        }
        if self.vertices.len() % 3 != 0 {
            return Err(SlicerError::DegenerateMesh(format!(
                "vertex buffer length {} is not a multiple of 3",
                self.vertices.len()
            )));
        }
        if self.indices.len() % 3 != 0 {
            return Err(SlicerError::DegenerateMesh(format!(
                "index buffer length {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let count = self.vertex_count();
        if let Some((pos, idx)) = self
            .indices
            .iter()
            .enumerate()
            .find(|(_, &idx)| idx as usize >= count)
        {
            return Err(SlicerError::DegenerateMesh(format!(
                "triangle {} references vertex {} of {}",
                pos / 3,
                idx,
                count
            )));
        }
        Ok(())
    }

    /// Extract triangles for slicing.
    pub fn triangles(&self) -> Result<Vec<Triangle>> {
        self.validate()?;
        let triangles = self
            .indices
            .chunks_exact(3)
            .filter_map(|tri| {
                let v0 = self.vertex(tri[0] as usize)?;
                let v1 = self.vertex(tri[1] as usize)?;
                let v2 = self.vertex(tri[2] as usize)?;
                Some(Triangle {
                    vertices: [v0, v1, v2],
                    z_min: v0.z.min(v1.z).min(v2.z),
                    z_max: v0.z.max(v1.z).max(v2.z),
                })
            })
            .collect();
        Ok(triangles)
    }
}
