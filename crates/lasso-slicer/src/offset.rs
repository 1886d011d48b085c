//! Lasso and contract.
//!
//! Shells and concentric fills are made by tracing the current raster
//! outline ("lasso") and then eroding the raster by one extrusion width
//! ("contract") so the next trace yields the next ring inward.

use tracing::warn;

use crate::raster::Raster;
use crate::toolpath::Toolpath;
use crate::trace::{emit_contours, trace};

/// Safety cap for concentric contraction loops.
pub const MAX_CONCENTRIC_RINGS: usize = 300;

/// Rings produced by [`contract_rings`].
#[derive(Debug, Clone, Default)]
pub struct RingSet {
    /// One toolpath per ring, outermost first.
    pub rings: Vec<Toolpath>,
    /// Material was left when the ring limit was reached.
    pub capped: bool,
}

/// Trace the outline of `raster` into a toolpath at height `z`.
///
/// `None` when the raster holds no material.
pub fn lasso(raster: &Raster, z: f64) -> Option<Toolpath> {
    let contours = trace(raster);
    if contours.is_empty() {
        return None;
    }
    let mut toolpath = Toolpath::new(z);
    emit_contours(&contours, &mut toolpath, z);
    Some(toolpath)
}

/// Trace the outline of `raster`, then erode it by `distance`.
pub fn lasso_and_contract(raster: &mut Raster, z: f64, distance: f64) -> Option<Toolpath> {
    let toolpath = lasso(raster, z);
    raster.erode(distance);
    toolpath
}

/// Peel up to `max_rings` rings of width `step` off `raster`.
///
/// The raster is first eroded by half a step so the first ring runs on
/// the centre line of the outermost extrusion, then traced and eroded by
/// `step` per ring until no material remains. On return `raster` holds
/// whatever is left inside the last ring. When `infill` is given, each
/// ring's extruded footprint is cleared from it.
///
/// `max_rings` is limited to [`MAX_CONCENTRIC_RINGS`].
pub fn contract_rings(
    raster: &mut Raster,
    z: f64,
    step: f64,
    max_rings: usize,
    mut infill: Option<&mut Raster>,
) -> RingSet {
    let limit = max_rings.min(MAX_CONCENTRIC_RINGS);
    let mut set = RingSet::default();
    raster.erode(step / 2.0);
    while set.rings.len() < limit {
        let Some(ring) = lasso_and_contract(raster, z, step) else {
            return set;
        };
        if let Some(infill) = infill.as_deref_mut() {
            infill.clear_footprint(&ring, step);
        }
        set.rings.push(ring);
    }
    set.capped = !raster.is_empty();
    set
}

/// Fill `raster` with concentric rings until it is used up.
///
/// Hitting [`MAX_CONCENTRIC_RINGS`] is logged and the rings made so far
/// are kept.
pub fn fill_concentric(raster: &mut Raster, z: f64, step: f64, infill: Option<&mut Raster>) -> RingSet {
    let set = contract_rings(raster, z, step, MAX_CONCENTRIC_RINGS, infill);
    if set.capped {
        warn!(
            z,
            rings = set.rings.len(),
            "concentric fill stopped at ring limit with material left"
        );
    }
    set
}
