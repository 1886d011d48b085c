#![warn(missing_docs)]

//! Raster slicing pipeline for FDM printing.
//!
//! Each layer of a triangle mesh is rasterized into an occupancy bitmap.
//! Shells are peeled off the bitmap by repeatedly tracing its outline and
//! eroding it ("lasso and contract"), neighbouring layers decide where
//! solid lids are needed, and the rest is filled with a diagonal hatch.
//! The result is a [`MachineToolpath`] ready for G-code generation.
//!
//! # Example
//!
//! ```ignore
//! use lasso_slicer::{slice, SliceSettings, TriangleMesh};
//!
//! let mesh: TriangleMesh = serde_json::from_str(&json)?;
//! let mut toolpath = slice(&mesh, &SliceSettings::default())?;
//! toolpath.optimize();
//!
//! println!("Layers: {}", toolpath.layer_count());
//! ```

pub mod colorize;
pub mod compositor;
pub mod error;
pub mod machine;
pub mod mesh;
pub mod offset;
pub mod pipeline;
pub mod raster;
pub mod slice;
pub mod toolpath;
pub mod trace;

pub use colorize::{apply_texture, ColorMode, TextureSampler};
pub use compositor::{compose_layer, infill_spacing, Neighbourhood, ScratchRasters};
pub use error::{Result, SlicerError};
pub use machine::{LayerKey, MachineToolpath, NearestNeighbor, ToolpathOptimizer};
pub use mesh::{Triangle, TriangleMesh};
pub use offset::{contract_rings, fill_concentric, lasso, lasso_and_contract, RingSet};
pub use pipeline::{slice, Progress, SliceContext, SliceControl, SlicePass, SliceStatus};
pub use raster::{CellWindow, Raster, RasterGrid};
pub use slice::{layer_heights, plane_segments, rasterize_layer};
pub use toolpath::{Fragment, Motion, PathRole, Rgb, Toolpath, ToolpathElement};
pub use trace::{emit_contours, trace, Contour, CurveSegment};

use serde::{Deserialize, Serialize};

/// Most shells a layer can have.
pub const MAX_SHELLS: u32 = 3;

/// Most lid layers on top and bottom.
pub const MAX_LIDS: u32 = 2;

/// How solid lid regions are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LidPattern {
    /// Dense diagonal strips, direction alternating per layer.
    #[default]
    Zigzag,
    /// Rings contracting toward the centre.
    Concentric,
}

/// Slicing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceSettings {
    /// Layer height (mm).
    pub layer_height: f64,
    /// Nozzle diameter, also the extrusion width (mm).
    pub nozzle_diameter: f64,
    /// Number of perimeter shells.
    pub shells: u32,
    /// Number of solid layers at the top and bottom.
    pub lids: u32,
    /// Lid fill pattern.
    pub lid_pattern: LidPattern,
    /// Infill density (percent, 0 to 100).
    pub infill_density: f64,
    /// Raster cell size (mm).
    pub raster_resolution: f64,
    /// Build plate width (mm).
    pub bed_x: f64,
    /// Build plate depth (mm).
    pub bed_y: f64,
    /// Height of the first layer as a fraction of `layer_height`.
    pub first_layer_factor: f64,
}

impl Default for SliceSettings {
    fn default() -> Self {
        Self {
            layer_height: 0.2,
            nozzle_diameter: 0.4,
            shells: 2,
            lids: 2,
            lid_pattern: LidPattern::Zigzag,
            infill_density: 20.0,
            raster_resolution: 0.1,
            bed_x: 220.0,
            bed_y: 220.0,
            first_layer_factor: 0.9,
        }
    }
}

impl SliceSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.layer_height > 0.0 && self.layer_height <= 1.0) {
            return Err(SlicerError::InvalidSettings(
                "layer_height must be between 0 and 1mm".into(),
            ));
        }
        if !(self.nozzle_diameter > 0.0 && self.nozzle_diameter.is_finite()) {
            return Err(SlicerError::InvalidSettings(
                "nozzle_diameter must be positive".into(),
            ));
        }
        if self.shells > MAX_SHELLS {
            return Err(SlicerError::InvalidSettings(format!(
                "shells must be at most {MAX_SHELLS}"
            )));
        }
        if self.lids > MAX_LIDS {
            return Err(SlicerError::InvalidSettings(format!(
                "lids must be at most {MAX_LIDS}"
            )));
        }
        if !(0.0..=100.0).contains(&self.infill_density) {
            return Err(SlicerError::InvalidSettings(
                "infill_density must be between 0 and 100".into(),
            ));
        }
        if !(self.raster_resolution > 0.0 && self.raster_resolution <= self.nozzle_diameter) {
            return Err(SlicerError::InvalidSettings(
                "raster_resolution must be positive and no coarser than the nozzle".into(),
            ));
        }
        if !(self.bed_x > 0.0 && self.bed_x.is_finite() && self.bed_y > 0.0 && self.bed_y.is_finite()) {
            return Err(SlicerError::InvalidSettings(
                "build plate size must be positive".into(),
            ));
        }
        if !(self.first_layer_factor > 0.0 && self.first_layer_factor <= 1.0) {
            return Err(SlicerError::InvalidSettings(
                "first_layer_factor must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }

    /// Raster grid covering the whole build plate.
    pub fn plate_grid(&self) -> RasterGrid {
        RasterGrid::for_build_plate(self.bed_x, self.bed_y, self.raster_resolution)
    }
}
