//! The toolpath of a whole print, one [`Toolpath`] per layer.

use std::collections::BTreeMap;
use std::ops::Range;

use lasso_math::Point3;

use crate::toolpath::{Motion, Toolpath, ToolpathElement};

/// Layer height in micrometres, so float noise in `z` cannot split a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerKey(pub i64);

impl LayerKey {
    /// Key for height `z` (mm).
    pub fn from_z(z: f64) -> Self {
        Self((z * 1000.0).round() as i64)
    }

    /// Height of the layer (mm).
    pub fn z(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

/// Layer toolpaths ordered bottom to top, with optional paths run before
/// the first and after the last layer.
#[derive(Debug, Clone, Default)]
pub struct MachineToolpath {
    layers: BTreeMap<LayerKey, Toolpath>,
    startup: Option<Toolpath>,
    shutdown: Option<Toolpath>,
}

impl MachineToolpath {
    /// An empty machine toolpath.
    pub fn new() -> Self {
        Self::default()
    }

    /// The layer at `z`, created empty if there is none.
    pub fn create_layer(&mut self, z: f64) -> &mut Toolpath {
        self.layers
            .entry(LayerKey::from_z(z))
            .or_insert_with(|| Toolpath::new(z))
    }

    /// The layer at `z`.
    pub fn find_layer(&self, z: f64) -> Option<&Toolpath> {
        self.layers.get(&LayerKey::from_z(z))
    }

    /// The layer at `z`, mutably.
    pub fn find_layer_mut(&mut self, z: f64) -> Option<&mut Toolpath> {
        self.layers.get_mut(&LayerKey::from_z(z))
    }

    /// Remove and return the layer at `z`.
    pub fn delete_layer(&mut self, z: f64) -> Option<Toolpath> {
        self.layers.remove(&LayerKey::from_z(z))
    }

    /// Drop all layers and the startup and shutdown paths.
    pub fn clear(&mut self) {
        self.layers.clear();
        self.startup = None;
        self.shutdown = None;
    }

    /// Number of layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Layers from bottom to top.
    pub fn layers(&self) -> impl Iterator<Item = (LayerKey, &Toolpath)> {
        self.layers.iter().map(|(k, tp)| (*k, tp))
    }

    /// Layers from bottom to top, mutably.
    pub fn layers_mut(&mut self) -> impl Iterator<Item = (LayerKey, &mut Toolpath)> {
        self.layers.iter_mut().map(|(k, tp)| (*k, tp))
    }

    /// Every element of the print in execution order: startup, layers,
    /// shutdown.
    pub fn elements(&self) -> impl Iterator<Item = &ToolpathElement> {
        self.startup
            .iter()
            .chain(self.layers.values())
            .chain(self.shutdown.iter())
            .flat_map(|tp| tp.elements().iter())
    }

    /// Path run before the first layer.
    pub fn set_startup(&mut self, toolpath: Toolpath) {
        self.startup = Some(toolpath);
    }

    /// Path run after the last layer.
    pub fn set_shutdown(&mut self, toolpath: Toolpath) {
        self.shutdown = Some(toolpath);
    }

    /// Path run before the first layer.
    pub fn startup(&self) -> Option<&Toolpath> {
        self.startup.as_ref()
    }

    /// Path run after the last layer.
    pub fn shutdown(&self) -> Option<&Toolpath> {
        self.shutdown.as_ref()
    }

    /// Shorten travel with the default [`NearestNeighbor`] pass.
    pub fn optimize(&mut self) {
        self.optimize_with(&NearestNeighbor);
    }

    /// Run `optimizer` over every layer.
    pub fn optimize_with(&mut self, optimizer: &dyn ToolpathOptimizer) {
        for toolpath in self.layers.values_mut() {
            optimizer.optimize_layer(toolpath);
        }
    }
}

/// A pass that rewrites a layer toolpath to print faster.
///
/// Implementations must keep the printed geometry of the layer.
pub trait ToolpathOptimizer {
    /// Rewrite one layer in place.
    fn optimize_layer(&self, toolpath: &mut Toolpath);
}

/// Greedy travel reduction.
///
/// Within each fragment, closed paths (each opened by a rapid move) are
/// reordered so that the next one printed is the one starting nearest to
/// where the head is. Fragments keep their order, tool changes stay put,
/// and only the rapid moves between paths change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbor;

impl ToolpathOptimizer for NearestNeighbor {
    fn optimize_layer(&self, toolpath: &mut Toolpath) {
        let groups = reorder_groups(toolpath);
        let mut cursor = Point3::new(0.0, 0.0, toolpath.z());
        let elements = toolpath.elements_mut();
        for group in groups {
            let reordered = reorder_group(&elements[group.clone()], &mut cursor);
            elements[group].clone_from_slice(&reordered);
        }
        toolpath.sync_cursor();
    }
}

/// Consecutive element ranges that may be reordered independently.
fn reorder_groups(toolpath: &Toolpath) -> Vec<Range<usize>> {
    let len = toolpath.len();
    let mut cuts = vec![0, len];
    for f in toolpath.fragments() {
        cuts.push(f.range.start);
        cuts.push(f.range.end);
    }
    for (i, el) in toolpath.elements().iter().enumerate() {
        if let ToolpathElement::ExtruderChange { .. } = el {
            cuts.push(i);
            cuts.push(i + 1);
        }
    }
    cuts.sort_unstable();
    cuts.dedup();
    cuts.windows(2).map(|w| w[0]..w[1]).collect()
}

fn opens_path(el: &ToolpathElement) -> bool {
    matches!(el, ToolpathElement::Motion(m) if m.rapid)
}

/// Reorder the paths in `group` greedily from `cursor`.
///
/// Elements before the first rapid move stay in front. Returns the same
/// number of elements.
fn reorder_group(group: &[ToolpathElement], cursor: &mut Point3) -> Vec<ToolpathElement> {
    let mut out = Vec::with_capacity(group.len());
    let first_open = group.iter().position(opens_path).unwrap_or(group.len());
    for el in &group[..first_open] {
        push_tracking(&mut out, el.clone(), cursor);
    }

    let mut paths: Vec<&[ToolpathElement]> = Vec::new();
    let mut start = first_open;
    for i in first_open + 1..=group.len() {
        if i == group.len() || opens_path(&group[i]) {
            paths.push(&group[start..i]);
            start = i;
        }
    }

    while !paths.is_empty() {
        let here = *cursor;
        let next = paths
            .iter()
            .enumerate()
            .map(|(i, p)| (i, path_start(p).map_or(f64::INFINITY, |s| (s - here).norm_squared())))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(0, |(i, _)| i);
        let path = paths.swap_remove(next);
        for (k, el) in path.iter().enumerate() {
            let el = match el {
                ToolpathElement::Motion(m) if k == 0 => ToolpathElement::Motion(Motion {
                    start: *cursor,
                    ..*m
                }),
                _ => el.clone(),
            };
            push_tracking(&mut out, el, cursor);
        }
    }
    out
}

fn path_start(path: &[ToolpathElement]) -> Option<Point3> {
    path.first().and_then(ToolpathElement::as_motion).map(|m| m.end)
}

fn push_tracking(out: &mut Vec<ToolpathElement>, el: ToolpathElement, cursor: &mut Point3) {
    if let Some(m) = el.as_motion() {
        *cursor = m.end;
    }
    out.push(el);
}
