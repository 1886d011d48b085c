//! Two-pass slicing pipeline.
//!
//! Pass 1 rasterizes every layer and peels its shells off, in parallel
//! batches. Pass 2 walks the layers bottom to top and splits what is left
//! of each raster into lids and infill by looking at its neighbours.
//! A layer is added to the [`MachineToolpath`] only once both passes are
//! done with it.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::compositor::{compose_layer, Neighbourhood, ScratchRasters, LID_WINDOW};
use crate::error::{Result, SlicerError};
use crate::machine::MachineToolpath;
use crate::mesh::{Triangle, TriangleMesh};
use crate::offset::contract_rings;
use crate::raster::{Raster, RasterGrid};
use crate::slice::{layer_heights, rasterize_layer};
use crate::toolpath::{PathRole, Toolpath};
use crate::SliceSettings;

/// Extra space kept around the model footprint on the raster grid (mm).
pub const GRID_MARGIN: f64 = 1.0;

/// Most cells a layer raster may have.
pub const MAX_RASTER_CELLS: usize = 1 << 26;

/// Which half of the pipeline is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlicePass {
    /// Rasterizing layers and building shells.
    Shells,
    /// Building lids and infill.
    LidsAndInfill,
}

/// Reported after every finished layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Current pass.
    pub pass: SlicePass,
    /// Layers finished in this pass, starting at 1.
    pub layer: usize,
    /// Layers in the model.
    pub total: usize,
    /// Overall progress, 0 to 100. Each pass covers half.
    pub percent: u32,
}

impl Progress {
    fn new(pass: SlicePass, layer: usize, total: usize) -> Self {
        let offset = match pass {
            SlicePass::Shells => 0,
            SlicePass::LidsAndInfill => 50,
        };
        let percent = offset + (layer * 50 / total.max(1)) as u32;
        Self {
            pass,
            layer,
            total,
            percent,
        }
    }
}

/// Answer of a progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceControl {
    /// Keep going.
    Continue,
    /// Stop as soon as possible.
    Cancel,
}

/// How a slicing run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceStatus {
    /// Every layer was built.
    Complete,
    /// Stopped by the progress callback.
    Cancelled {
        /// Layers present in the machine toolpath.
        completed_layers: usize,
    },
}

/// Everything one slicing run needs: the mesh, the settings and the
/// derived layer heights and raster grid.
#[derive(Debug, Clone)]
pub struct SliceContext<'a> {
    settings: &'a SliceSettings,
    triangles: Vec<Triangle>,
    heights: Vec<f64>,
    grid: RasterGrid,
}

impl<'a> SliceContext<'a> {
    /// Validate the inputs and lay out layers and grid.
    pub fn new(mesh: &TriangleMesh, settings: &'a SliceSettings) -> Result<Self> {
        settings.validate()?;
        let triangles = mesh.triangles()?;
        let bounds = mesh.bounds().ok_or(SlicerError::EmptyMesh)?;

        let heights = layer_heights(
            bounds.min.z,
            bounds.max.z,
            settings.layer_height,
            settings.first_layer_factor,
        );
        if heights.is_empty() {
            return Err(SlicerError::SliceFailed("model too thin to slice".into()));
        }

        if bounds.min.x < 0.0
            || bounds.min.y < 0.0
            || bounds.max.x > settings.bed_x
            || bounds.max.y > settings.bed_y
        {
            warn!(
                bed_x = settings.bed_x,
                bed_y = settings.bed_y,
                "model extends past the build plate and will be clipped"
            );
        }
        let grid = settings
            .plate_grid()
            .cropped_to(bounds.min.xy(), bounds.max.xy(), GRID_MARGIN);
        match grid.checked_cell_count() {
            Some(cells) if cells <= MAX_RASTER_CELLS => {}
            _ => {
                return Err(SlicerError::RasterAllocation {
                    width: grid.width,
                    height: grid.height,
                });
            }
        }

        Ok(Self {
            settings,
            triangles,
            heights,
            grid,
        })
    }

    /// Z height of every layer, bottom to top.
    pub fn layer_heights(&self) -> &[f64] {
        &self.heights
    }

    /// Grid shared by all layer rasters.
    pub fn grid(&self) -> &RasterGrid {
        &self.grid
    }

    /// Slice into `out`, replacing its contents.
    ///
    /// `progress` is called once per finished layer in each pass. On
    /// [`SliceControl::Cancel`] the run stops and `out` keeps the layers
    /// that were fully built.
    ///
    /// Pass 1 rasterizes `rayon::current_num_threads()` layers per batch
    /// and reports them after the batch, so a cancel in pass 1 can come
    /// after up to one batch of extra rasterization, which is discarded.
    pub fn run<F>(&self, out: &mut MachineToolpath, mut progress: F) -> Result<SliceStatus>
    where
        F: FnMut(&Progress) -> SliceControl,
    {
        out.clear();
        let total = self.heights.len();
        let batch = rayon::current_num_threads().max(1);
        info!(
            layers = total,
            width = self.grid.width,
            height = self.grid.height,
            "building shells"
        );

        let mut rasters: Vec<Option<Raster>> = Vec::with_capacity(total);
        let mut shells: Vec<Vec<Toolpath>> = Vec::with_capacity(total);
        for start in (0..total).step_by(batch) {
            let end = (start + batch).min(total);
            let built: Vec<(Raster, Vec<Toolpath>)> = (start..end)
                .into_par_iter()
                .map(|i| self.build_shells(i))
                .collect::<Result<_>>()?;
            for (raster, rings) in built {
                rasters.push(Some(raster));
                shells.push(rings);
                let report = Progress::new(SlicePass::Shells, rasters.len(), total);
                if progress(&report) == SliceControl::Cancel {
                    warn!(pass = ?report.pass, layer = report.layer, "slicing cancelled");
                    return Ok(SliceStatus::Cancelled {
                        completed_layers: 0,
                    });
                }
            }
        }

        info!(layers = total, "building lids and infill");
        let mut scratch = ScratchRasters::new(self.grid)?;
        for (i, &z) in self.heights.iter().enumerate() {
            let mut layer = Toolpath::new(z);
            for (k, ring) in shells[i].iter().enumerate() {
                layer.add_fragment(ring, PathRole::Shell, k);
            }
            shells[i].clear();
            {
                let at = |j: Option<usize>| j.and_then(|j| rasters.get(j)).and_then(Option::as_ref);
                let current = at(Some(i)).ok_or_else(|| {
                    SlicerError::SliceFailed(format!("raster for layer {i} was released early"))
                })?;
                let neighbours = Neighbourhood {
                    below: [at(i.checked_sub(1)), at(i.checked_sub(2))],
                    current,
                    above: [at(Some(i + 1)), at(Some(i + 2))],
                };
                compose_layer(i, z, &neighbours, self.settings, &mut scratch, &mut layer)?;
            }
            debug!(
                layer = i,
                z,
                elements = layer.len(),
                fragments = layer.fragments().len(),
                "layer done"
            );
            *out.create_layer(z) = layer;

            // no later layer reads this far down
            if let Some(old) = i.checked_sub(LID_WINDOW) {
                rasters[old] = None;
            }

            let report = Progress::new(SlicePass::LidsAndInfill, i + 1, total);
            if progress(&report) == SliceControl::Cancel {
                warn!(pass = ?report.pass, layer = report.layer, "slicing cancelled");
                return Ok(SliceStatus::Cancelled {
                    completed_layers: out.layer_count(),
                });
            }
        }

        info!(layers = out.layer_count(), "slicing complete");
        Ok(SliceStatus::Complete)
    }

    /// Rasterize layer `i` and peel its shells off. Returns the raster
    /// left inside the innermost shell and the shell rings, outer first.
    fn build_shells(&self, i: usize) -> Result<(Raster, Vec<Toolpath>)> {
        let z = self.heights[i];
        let mut raster = rasterize_layer(&self.triangles, z, self.grid)?;
        let shells = self.settings.shells as usize;
        let rings = if shells > 0 {
            contract_rings(&mut raster, z, self.settings.nozzle_diameter, shells, None).rings
        } else {
            Vec::new()
        };
        debug!(layer = i, z, shells = rings.len(), "layer rasterized");
        Ok((raster, rings))
    }
}

/// Slice `mesh` start to finish.
pub fn slice(mesh: &TriangleMesh, settings: &SliceSettings) -> Result<MachineToolpath> {
    let context = SliceContext::new(mesh, settings)?;
    let mut out = MachineToolpath::new();
    context.run(&mut out, |_| SliceControl::Continue)?;
    Ok(out)
}
