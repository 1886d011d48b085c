//! Toolpath assembly.
//!
//! A [`Toolpath`] is the ordered list of head motions and tool changes
//! for one layer. Paths are built with [`Toolpath::start_path`],
//! [`Toolpath::continue_path`] and [`Toolpath::close_path`], and layer
//! parts (shells, lids, infill) are merged with [`Toolpath::add_fragment`].

use std::ops::Range;

use lasso_math::Point3;
use serde::{Deserialize, Serialize};

/// An sRGB colour tag carried by a motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
}

impl Rgb {
    /// Create a colour.
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb` notation.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<image::Rgb<u8>> for Rgb {
    fn from(px: image::Rgb<u8>) -> Self {
        Self::new(px.0[0], px.0[1], px.0[2])
    }
}

/// A straight head motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    /// Start point.
    pub start: Point3,
    /// End point.
    pub end: Point3,
    /// Travel without extruding.
    pub rapid: bool,
    /// Optional colour or material marker.
    pub color: Option<Rgb>,
}

impl Motion {
    /// A printing motion.
    pub fn print(start: Point3, end: Point3) -> Self {
        Self {
            start,
            end,
            rapid: false,
            color: None,
        }
    }

    /// A travel motion.
    pub fn rapid(start: Point3, end: Point3) -> Self {
        Self {
            start,
            end,
            rapid: true,
            color: None,
        }
    }

    /// Length of the motion (mm).
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }
}

/// One entry of a toolpath.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolpathElement {
    /// Move the head.
    Motion(Motion),
    /// Switch to another extruder.
    ExtruderChange {
        /// Target tool index.
        tool: u32,
    },
}

impl ToolpathElement {
    /// The motion, if this element is one.
    pub fn as_motion(&self) -> Option<&Motion> {
        match self {
            ToolpathElement::Motion(m) => Some(m),
            ToolpathElement::ExtruderChange { .. } => None,
        }
    }
}

/// What a merged sub-toolpath prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathRole {
    /// Perimeter ring.
    Shell,
    /// Solid top or bottom skin.
    Lid,
    /// Sparse interior fill.
    Infill,
    /// Anything else (startup purge lines, colour splits).
    Other,
}

/// Record of a sub-toolpath merged into a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// What the fragment prints.
    pub role: PathRole,
    /// Position within its role, 0 = outermost ring / first pass.
    pub order: usize,
    /// Elements of the owning toolpath that came from this fragment.
    pub range: Range<usize>,
}

/// Ordered motions and tool changes for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Toolpath {
    z: f64,
    elements: Vec<ToolpathElement>,
    first: Point3,
    cursor: Point3,
    fragments: Vec<Fragment>,
}

impl Toolpath {
    /// An empty toolpath at height `z`, anchored at `(0, 0, z)`.
    pub fn new(z: f64) -> Self {
        let origin = Point3::new(0.0, 0.0, z);
        Self {
            z,
            elements: Vec::new(),
            first: origin,
            cursor: origin,
            fragments: Vec::new(),
        }
    }

    /// Layer height this toolpath belongs to.
    pub fn z(&self) -> f64 {
        self.z
    }

    /// Start point of the current path.
    pub fn first(&self) -> Point3 {
        self.first
    }

    /// Most recently added point.
    pub fn cursor(&self) -> Point3 {
        self.cursor
    }

    /// Begin a new path: travel from the cursor to `(x, y, z)`.
    pub fn start_path(&mut self, x: f64, y: f64, z: f64) {
        let p = Point3::new(x, y, z);
        self.elements
            .push(ToolpathElement::Motion(Motion::rapid(self.cursor, p)));
        self.first = p;
        self.cursor = p;
    }

    /// Print from the cursor to `(x, y, z)`.
    ///
    /// A point equal to the cursor adds nothing.
    pub fn continue_path(&mut self, x: f64, y: f64, z: f64) {
        let p = Point3::new(x, y, z);
        if p != self.cursor {
            self.elements
                .push(ToolpathElement::Motion(Motion::print(self.cursor, p)));
        }
        self.cursor = p;
    }

    /// Print back to the start of the current path unless already there.
    pub fn close_path(&mut self) {
        if self.cursor != self.first {
            self.elements
                .push(ToolpathElement::Motion(Motion::print(self.cursor, self.first)));
        }
        self.cursor = self.first;
    }

    /// Append copies of all elements of `other`, keeping their order.
    pub fn add(&mut self, other: &Toolpath) {
        if other.elements.is_empty() {
            return;
        }
        self.elements.extend(other.elements.iter().cloned());
        self.first = other.first;
        self.cursor = other.cursor;
    }

    /// [`add`](Self::add) and remember where the elements came from.
    pub fn add_fragment(&mut self, other: &Toolpath, role: PathRole, order: usize) {
        let begin = self.elements.len();
        self.add(other);
        if self.elements.len() > begin {
            self.fragments.push(Fragment {
                role,
                order,
                range: begin..self.elements.len(),
            });
        }
    }

    /// Append an extruder change.
    pub fn change_extruder(&mut self, tool: u32) {
        self.elements.push(ToolpathElement::ExtruderChange { tool });
    }

    /// Append a prebuilt motion and move the cursor to its end.
    pub fn push_motion(&mut self, motion: Motion) {
        self.cursor = motion.end;
        self.elements.push(ToolpathElement::Motion(motion));
    }

    /// Drop everything and re-anchor at `(0, 0, z)`.
    pub fn clear(&mut self, z: f64) {
        let origin = Point3::new(0.0, 0.0, z);
        self.z = z;
        self.elements.clear();
        self.fragments.clear();
        self.first = origin;
        self.cursor = origin;
    }

    /// All elements in order.
    pub fn elements(&self) -> &[ToolpathElement] {
        &self.elements
    }

    /// Mutable access for optimizers; fragment ranges must stay valid.
    pub(crate) fn elements_mut(&mut self) -> &mut Vec<ToolpathElement> {
        &mut self.elements
    }

    /// Move the cursor to the end of the last motion, after elements
    /// were rearranged in place.
    pub(crate) fn sync_cursor(&mut self) {
        if let Some(end) = self.motions().last().map(|m| m.end) {
            self.cursor = end;
        }
    }

    /// All motions in order, skipping tool changes.
    pub fn motions(&self) -> impl Iterator<Item = &Motion> {
        self.elements.iter().filter_map(ToolpathElement::as_motion)
    }

    /// Fragments merged into this toolpath.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Fragments of one role.
    pub fn fragments_with_role(&self, role: PathRole) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter().filter(move |f| f.role == role)
    }

    /// Total printed (non-rapid) length (mm).
    pub fn print_length(&self) -> f64 {
        self.motions()
            .filter(|m| !m.rapid)
            .map(Motion::length)
            .sum()
    }

    /// True when there are no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }
}
