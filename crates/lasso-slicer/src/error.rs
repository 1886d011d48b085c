//! Error types for the slicer.

use thiserror::Error;

use crate::raster::RasterGrid;

/// Errors that can occur during slicing.
#[derive(Error, Debug)]
pub enum SlicerError {
    /// Mesh has no triangles.
    #[error("mesh is empty")]
    EmptyMesh,

    /// Mesh has degenerate geometry.
    #[error("mesh has degenerate geometry: {0}")]
    DegenerateMesh(String),

    /// Invalid slice settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Two rasters combined by a boolean operation live on different grids.
    #[error("raster grid mismatch: {expected:?} vs {found:?}")]
    GridMismatch {
        /// Grid of the receiving raster.
        expected: RasterGrid,
        /// Grid of the operand.
        found: RasterGrid,
    },

    /// A raster buffer could not be allocated.
    #[error("cannot allocate a {width}x{height} raster")]
    RasterAllocation {
        /// Columns requested.
        width: usize,
        /// Rows requested.
        height: usize,
    },

    /// Texture image could not be loaded.
    #[error("texture image: {0}")]
    Image(#[from] image::ImageError),

    /// Slicing operation failed.
    #[error("slicing failed: {0}")]
    SliceFailed(String),
}

/// Result type for slicer operations.
pub type Result<T> = std::result::Result<T, SlicerError>;
