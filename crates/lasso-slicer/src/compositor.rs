//! Lid and infill composition.
//!
//! A layer needs a solid lid wherever material is missing in one of its
//! vertical neighbours; everything else is sparse infill. The split is
//! pure raster algebra over the rolling window of layer rasters.

use crate::error::Result;
use crate::offset::{fill_concentric, lasso};
use crate::raster::{Raster, RasterGrid};
use crate::toolpath::{PathRole, Toolpath};
use crate::{LidPattern, SliceSettings};

/// Layers above and below a layer that decide its lids.
pub const LID_WINDOW: usize = 2;

/// Infill densities at or below this (percent) produce no infill.
pub const MIN_INFILL_DENSITY: f64 = 0.01;

/// Rasters around the layer being composed. Missing layers (above the
/// top or below the bottom of the model) are `None` and count as empty.
#[derive(Debug, Clone, Copy)]
pub struct Neighbourhood<'a> {
    /// `below[0]` is the layer directly below, `below[1]` the one under it.
    pub below: [Option<&'a Raster>; LID_WINDOW],
    /// The layer itself.
    pub current: &'a Raster,
    /// `above[0]` is the layer directly above, `above[1]` the one over it.
    pub above: [Option<&'a Raster>; LID_WINDOW],
}

/// Reusable work buffers for [`compose_layer`].
#[derive(Debug, Clone)]
pub struct ScratchRasters {
    mask: Raster,
    lid: Raster,
    infill: Raster,
}

impl ScratchRasters {
    /// Buffers sized for `grid`.
    pub fn new(grid: RasterGrid) -> Result<Self> {
        Ok(Self {
            mask: Raster::try_new(grid)?,
            lid: Raster::try_new(grid)?,
            infill: Raster::try_new(grid)?,
        })
    }
}

/// Spacing between infill strips for a density in percent.
///
/// 100 % leaves no gap, 50 % leaves a gap of three line widths.
pub fn infill_spacing(nozzle_diameter: f64, density: f64) -> f64 {
    2.0 * nozzle_diameter * (100.0 / density) - nozzle_diameter
}

/// Add the lid and infill toolpaths of layer `index` to `out`.
///
/// Lids come first, then infill. Lid paths are cleared from the infill
/// region before the infill pattern is stamped, so no cell is printed
/// twice.
pub fn compose_layer(
    index: usize,
    z: f64,
    neighbours: &Neighbourhood<'_>,
    settings: &SliceSettings,
    scratch: &mut ScratchRasters,
    out: &mut Toolpath,
) -> Result<()> {
    let ScratchRasters { mask, lid, infill } = scratch;
    let n = settings.nozzle_diameter;
    infill.copy_from(neighbours.current);

    if settings.lids > 0 {
        let two_lids = settings.lids > 1;
        match neighbours.above[0] {
            Some(above) => mask.copy_from(above),
            None => {
                mask.copy_from(neighbours.current);
                mask.clear();
            }
        }
        if two_lids {
            mask.and(neighbours.above[1])?;
        }
        mask.and(neighbours.below[0])?;
        if two_lids {
            mask.and(neighbours.below[1])?;
        }

        lid.copy_from(neighbours.current);
        lid.and_not(Some(&*mask))?;
        infill.and(Some(&*mask))?;

        match settings.lid_pattern {
            LidPattern::Zigzag => {
                lid.overlay_infill_pattern(index, n, n);
                if let Some(path) = lasso(lid, z) {
                    infill.clear_footprint(&path, n);
                    out.add_fragment(&path, PathRole::Lid, 0);
                }
            }
            LidPattern::Concentric => {
                let set = fill_concentric(lid, z, n, Some(&mut *infill));
                for (k, ring) in set.rings.iter().enumerate() {
                    out.add_fragment(ring, PathRole::Lid, k);
                }
            }
        }
    }

    if settings.infill_density > MIN_INFILL_DENSITY {
        infill.overlay_infill_pattern(index, infill_spacing(n, settings.infill_density), n);
        if let Some(path) = lasso(infill, z) {
            out.add_fragment(&path, PathRole::Infill, 0);
        }
    }
    Ok(())
}
