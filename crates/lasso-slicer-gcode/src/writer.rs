//! Stateful G-code writer.
//!
//! The writer mirrors the machine: it remembers where the head is, which
//! tool is active, the value of the extrusion axis and the current colour
//! marker, and emits one command per line.

use std::io::Write;

use lasso_math::{Point3, Tolerance};
use lasso_slicer::Rgb;

use crate::error::Result;
use crate::flavor::render_template;
use crate::GcodeSettings;

/// Format a coordinate with fixed precision.
pub fn format_coord(value: f64, precision: usize) -> String {
    format!("{:.prec$}", value, prec = precision)
}

/// Writes G-code commands to `W` and tracks machine state.
#[derive(Debug)]
pub struct GcodeWriter<'a, W: Write> {
    out: W,
    settings: &'a GcodeSettings,
    position: Point3,
    tool: u32,
    e: f64,
    color: Option<Rgb>,
    lines: usize,
}

impl<'a, W: Write> GcodeWriter<'a, W> {
    /// A writer with the head at the origin and tool 0 active.
    pub fn new(out: W, settings: &'a GcodeSettings) -> Self {
        Self {
            out,
            settings,
            position: Point3::origin(),
            tool: 0,
            e: 0.0,
            color: None,
            lines: 0,
        }
    }

    /// Current head position.
    pub fn position(&self) -> Point3 {
        self.position
    }

    /// Active tool.
    pub fn tool(&self) -> u32 {
        self.tool
    }

    /// Current value of the extrusion axis.
    pub fn e(&self) -> f64 {
        self.e
    }

    /// Current colour marker.
    pub fn color(&self) -> Option<Rgb> {
        self.color
    }

    /// Number of lines written so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Settings the writer was created with.
    pub fn settings(&self) -> &GcodeSettings {
        self.settings
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Return the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{text}")?;
        self.lines += 1;
        Ok(())
    }

    fn template(&mut self, template: &str) -> Result<()> {
        let rendered = render_template(template, self.settings.print_temp, self.settings.bed_temp);
        for line in rendered.lines() {
            self.line(line)?;
        }
        Ok(())
    }

    /// Heat up and home. Leaves the head at the origin with tool 0 and
    /// the extrusion axis at zero.
    pub fn macro_init(&mut self) -> Result<()> {
        self.template(self.settings.printer.flavor.start_gcode())?;
        self.position = Point3::origin();
        self.tool = 0;
        self.e = 0.0;
        self.color = None;
        Ok(())
    }

    /// Cool down and release the motors.
    pub fn macro_shutdown(&mut self) -> Result<()> {
        self.template(self.settings.printer.flavor.end_gcode())
    }

    /// `; text`, or a bare `;` for empty text.
    pub fn comment(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            self.line(";")
        } else {
            self.line(&format!("; {text}"))
        }
    }

    /// Zero the extrusion axis.
    pub fn reset_extruder(&mut self) -> Result<()> {
        self.e = 0.0;
        self.line("G92 E0")
    }

    /// Feed (positive) or retract (negative) filament without moving.
    pub fn extrude(&mut self, delta: f64) -> Result<()> {
        self.e += delta;
        let feed = self.settings.retraction_speed * 60.0;
        self.line(&format!(
            "G1 E{} F{}",
            format_coord(self.e, 5),
            format_coord(feed, 0)
        ))
    }

    /// Travel to `p` without extruding.
    pub fn rapid_move(&mut self, p: Point3) -> Result<()> {
        self.position = p;
        let feed = self.settings.travel_speed * 60.0;
        self.line(&format!(
            "G0 X{} Y{} Z{} F{}",
            format_coord(p.x, 3),
            format_coord(p.y, 3),
            format_coord(p.z, 3),
            format_coord(feed, 0)
        ))
    }

    /// Travel to `(x, y)` at the current height.
    pub fn rapid_move_xy(&mut self, x: f64, y: f64) -> Result<()> {
        self.position.x = x;
        self.position.y = y;
        let feed = self.settings.travel_speed * 60.0;
        self.line(&format!(
            "G0 X{} Y{} F{}",
            format_coord(x, 3),
            format_coord(y, 3),
            format_coord(feed, 0)
        ))
    }

    /// Print a line to `p`. A new `color` is announced with a comment
    /// before the move.
    pub fn move_to(&mut self, p: Point3, color: Option<Rgb>) -> Result<()> {
        if color.is_some() && color != self.color {
            self.color = color;
            if let Some(c) = color {
                self.comment(&format!("color {}", c.to_hex()))?;
            }
        }
        let length = (p - self.position).norm();
        self.e += length * self.settings.extrusion_per_mm();
        self.position = p;
        let feed = self.settings.print_speed * 60.0;
        self.line(&format!(
            "G1 X{} Y{} Z{} E{} F{}",
            format_coord(p.x, 3),
            format_coord(p.y, 3),
            format_coord(p.z, 3),
            format_coord(self.e, 5),
            format_coord(feed, 0)
        ))
    }

    /// Print a line to `(x, y)` at the current height.
    pub fn move_xy(&mut self, x: f64, y: f64) -> Result<()> {
        let p = Point3::new(x, y, self.position.z);
        self.move_to(p, None)
    }

    /// Make tool `t` active.
    pub fn select_extruder(&mut self, t: u32) -> Result<()> {
        self.tool = t;
        self.line(&format!("T{t}"))
    }

    /// Whether the head already sits at `p`.
    pub fn is_at(&self, p: &Point3) -> bool {
        Tolerance::DEFAULT.points_equal(&self.position, p)
    }
}
