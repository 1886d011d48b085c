//! Colour segmentation of printing motions against a texture image.
//!
//! Motions are walked in small steps and split wherever the colour
//! under the nozzle changes, either into two buckets (black and white)
//! for two-extruder prints or into colour-tagged pieces.

use std::path::Path;

use image::RgbImage;
use lasso_math::Point3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SlicerError};
use crate::machine::MachineToolpath;
use crate::toolpath::{Motion, PathRole, Rgb, Toolpath};

/// Texture pixels per millimetre of build plate used by default.
pub const DEFAULT_PIXELS_PER_MM: f64 = 1024.0 / 214.0;

/// Distance between colour samples along a motion (mm).
pub const SAMPLE_STEP: f64 = 0.1;

/// Channel difference above which two colours count as different.
pub const COLOR_THRESHOLD: i16 = 10;

/// Looks up the colour under a build-plate position.
///
/// Image x and y map directly to plate x and y, pixel (0, 0) at the plate
/// origin. Positions outside the image read the nearest edge pixel.
#[derive(Debug, Clone)]
pub struct TextureSampler {
    image: RgbImage,
    pixels_per_mm: f64,
}

impl TextureSampler {
    /// Wrap an image.
    pub fn new(image: RgbImage, pixels_per_mm: f64) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SlicerError::InvalidSettings("texture image is empty".into()));
        }
        if pixels_per_mm <= 0.0 {
            return Err(SlicerError::InvalidSettings(
                "pixels_per_mm must be positive".into(),
            ));
        }
        Ok(Self {
            image,
            pixels_per_mm,
        })
    }

    /// Load an image file.
    pub fn open(path: impl AsRef<Path>, pixels_per_mm: f64) -> Result<Self> {
        let image = image::open(path)?.to_rgb8();
        Self::new(image, pixels_per_mm)
    }

    /// Colour at plate position `p`.
    pub fn sample(&self, p: &Point3) -> Rgb {
        let x = pixel_index(p.x * self.pixels_per_mm, self.image.width());
        let y = pixel_index(p.y * self.pixels_per_mm, self.image.height());
        Rgb::from(*self.image.get_pixel(x, y))
    }

    /// Whether the colour at `p` counts as black.
    pub fn is_black(&self, p: &Point3) -> bool {
        is_black(self.sample(p))
    }
}

fn pixel_index(v: f64, size: u32) -> u32 {
    (v.floor().max(0.0) as u32).min(size - 1)
}

/// All channels below half intensity.
pub fn is_black(c: Rgb) -> bool {
    c.r < 128 && c.g < 128 && c.b < 128
}

/// Any channel differs by more than [`COLOR_THRESHOLD`].
pub fn differ(a: Rgb, b: Rgb) -> bool {
    let d = |x: u8, y: u8| (i16::from(x) - i16::from(y)).abs() > COLOR_THRESHOLD;
    d(a.r, b.r) || d(a.g, b.g) || d(a.b, b.b)
}

/// Walk a motion in [`SAMPLE_STEP`] increments and cut it wherever
/// `changed(previous_key, current_key)` is true.
///
/// Calls `emit(piece, key)` for each piece, key being the value sampled
/// at the piece's start.
fn split_motion<K: Copy>(
    m: &Motion,
    key_at: impl Fn(&Point3) -> K,
    changed: impl Fn(K, K) -> bool,
    mut emit: impl FnMut(Motion, K),
) {
    let delta = m.end - m.start;
    let len = delta.norm();
    let mut piece_start = m.start;
    let mut key = key_at(&m.start);
    for k in 1usize.. {
        let t = k as f64 * SAMPLE_STEP;
        if t >= len {
            break;
        }
        let p = m.start + delta * (t / len);
        let now = key_at(&p);
        if changed(key, now) {
            emit(Motion::print(piece_start, p), key);
            piece_start = p;
            key = now;
        }
    }
    if piece_start != m.end {
        emit(Motion::print(piece_start, m.end), key);
    }
}

impl Toolpath {
    /// Split printing motions into `black` and `white` by the texture.
    ///
    /// Rapid moves are dropped.
    pub fn colorize(&self, sampler: &TextureSampler, black: &mut Toolpath, white: &mut Toolpath) {
        for m in self.motions().filter(|m| !m.rapid) {
            split_motion(
                m,
                |p| sampler.is_black(p),
                |a, b| a != b,
                |piece, dark| {
                    if dark {
                        black.push_motion(piece);
                    } else {
                        white.push_motion(piece);
                    }
                },
            );
        }
    }

    /// Split printing motions wherever the texture colour changes and tag
    /// each piece with its colour.
    ///
    /// Rapid moves are dropped.
    pub fn colorize_soft(&self, sampler: &TextureSampler, dst: &mut Toolpath) {
        for m in self.motions().filter(|m| !m.rapid) {
            split_motion(
                m,
                |p| sampler.sample(p),
                differ,
                |mut piece, color| {
                    piece.color = Some(color);
                    dst.push_motion(piece);
                },
            );
        }
    }
}

/// How a texture is applied to a sliced print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Dark regions on tool 0, light regions on tool 1.
    #[default]
    Dual,
    /// One tool, every piece tagged with its texture colour.
    Soft,
}

/// Recolour every layer of `toolpath` from `sampler`.
///
/// Layers are rebuilt from their printing motions only; in
/// [`ColorMode::Dual`] each non-empty colour group is preceded by an
/// extruder change.
pub fn apply_texture(toolpath: &mut MachineToolpath, sampler: &TextureSampler, mode: ColorMode) {
    for (key, layer) in toolpath.layers_mut() {
        let z = layer.z();
        let mut rebuilt = Toolpath::new(z);
        match mode {
            ColorMode::Dual => {
                let mut black = Toolpath::new(z);
                let mut white = Toolpath::new(z);
                layer.colorize(sampler, &mut black, &mut white);
                for (tool, part) in [(0, &black), (1, &white)] {
                    if !part.is_empty() {
                        rebuilt.change_extruder(tool);
                        rebuilt.add_fragment(part, PathRole::Other, tool as usize);
                    }
                }
            }
            ColorMode::Soft => {
                let mut tagged = Toolpath::new(z);
                layer.colorize_soft(sampler, &mut tagged);
                rebuilt.add_fragment(&tagged, PathRole::Other, 0);
            }
        }
        debug!(layer = key.0, elements = rebuilt.len(), "layer recoloured");
        *layer = rebuilt;
    }
}
