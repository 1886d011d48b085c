#![warn(missing_docs)]

//! G-code generation for the lasso slicer.
//!
//! This crate serializes a [`MachineToolpath`] into G-code for FDM
//! printers. It supports multiple printer profiles and G-code flavors.
//!
//! # Example
//!
//! ```ignore
//! use lasso_slicer::{slice, SliceSettings};
//! use lasso_slicer_gcode::{save_gcode, GcodeSettings, PrinterProfile};
//!
//! let toolpath = slice(&mesh, &SliceSettings::default())?;
//!
//! let gcode_settings = GcodeSettings {
//!     print_temp: 215,
//!     ..GcodeSettings::for_printer(PrinterProfile::prusa_mk4())
//! };
//!
//! save_gcode(&toolpath, "output.gcode", &gcode_settings)?;
//! ```

pub mod emit;
pub mod error;
pub mod flavor;
pub mod printer;
pub mod writer;

pub use emit::{write_element, write_machine_toolpath, write_toolpath};
pub use error::{GcodeError, Result};
pub use flavor::GcodeFlavor;
pub use printer::PrinterProfile;
pub use writer::GcodeWriter;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use lasso_slicer::MachineToolpath;
use serde::{Deserialize, Serialize};
use tracing::info;

/// G-code output parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcodeSettings {
    /// Nozzle temperature (°C).
    pub print_temp: u32,
    /// Bed temperature (°C).
    pub bed_temp: u32,
    /// Printing speed (mm/s).
    pub print_speed: f64,
    /// Travel speed (mm/s).
    pub travel_speed: f64,
    /// Filament pulled back before each travel (mm).
    pub retraction_distance: f64,
    /// Retraction speed (mm/s).
    pub retraction_speed: f64,
    /// Layer height the toolpath was sliced with (mm), used for flow.
    pub layer_height: f64,
    /// Flow multiplier.
    pub extrusion_multiplier: f64,
    /// Target printer.
    pub printer: PrinterProfile,
}

impl Default for GcodeSettings {
    fn default() -> Self {
        Self::for_printer(PrinterProfile::generic())
    }
}

impl GcodeSettings {
    /// Settings taking temperatures and retraction from `printer`.
    pub fn for_printer(printer: PrinterProfile) -> Self {
        Self {
            print_temp: printer.default_print_temp,
            bed_temp: if printer.heated_bed {
                printer.default_bed_temp
            } else {
                0
            },
            print_speed: 40.0,
            travel_speed: printer.max_travel_speed.min(120.0),
            retraction_distance: printer.retraction_distance,
            retraction_speed: printer.retraction_speed,
            layer_height: 0.2,
            extrusion_multiplier: 1.0,
            printer,
        }
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v > 0.0 && v.is_finite();
        if !(positive(self.print_speed)
            && positive(self.travel_speed)
            && positive(self.retraction_speed))
        {
            return Err(GcodeError::InvalidSettings(
                "speeds must be positive".into(),
            ));
        }
        if !positive(self.printer.max_travel_speed) || self.travel_speed > self.printer.max_travel_speed {
            return Err(GcodeError::InvalidSettings(format!(
                "travel_speed exceeds the {} mm/s limit of {}",
                self.printer.max_travel_speed, self.printer.name
            )));
        }
        if !(self.retraction_distance >= 0.0 && self.retraction_distance.is_finite()) {
            return Err(GcodeError::InvalidSettings(
                "retraction_distance must not be negative".into(),
            ));
        }
        if !(positive(self.layer_height) && positive(self.extrusion_multiplier)) {
            return Err(GcodeError::InvalidSettings(
                "layer_height and extrusion_multiplier must be positive".into(),
            ));
        }
        if !(positive(self.printer.filament_diameter) && positive(self.printer.nozzle_diameter)) {
            return Err(GcodeError::InvalidSettings(
                "printer nozzle and filament diameters must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Filament fed per millimetre of printed line (mm).
    pub fn extrusion_per_mm(&self) -> f64 {
        let bead = self.printer.nozzle_diameter * self.layer_height;
        bead * self.extrusion_multiplier / self.printer.filament_area()
    }
}

/// Generate G-code for `toolpath` as a string.
pub fn generate_gcode(toolpath: &MachineToolpath, settings: &GcodeSettings) -> Result<String> {
    settings.validate()?;
    let mut writer = GcodeWriter::new(Vec::new(), settings);
    write_machine_toolpath(&mut writer, toolpath)?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// Write G-code for `toolpath` to `path`.
///
/// Output goes to `<path>.part` first and is renamed into place once
/// complete, so `path` never holds a partial file.
pub fn save_gcode(
    toolpath: &MachineToolpath,
    path: impl AsRef<Path>,
    settings: &GcodeSettings,
) -> Result<()> {
    save_through(toolpath, path.as_ref(), settings, BufWriter::new)
}

/// [`save_gcode`] with the output stream built by `wrap`.
fn save_through<W: Write>(
    toolpath: &MachineToolpath,
    path: &Path,
    settings: &GcodeSettings,
    wrap: impl FnOnce(File) -> W,
) -> Result<()> {
    settings.validate()?;
    let part = partial_path(path);
    let file = File::create(&part)?;

    let mut writer = GcodeWriter::new(wrap(file), settings);
    let written = write_machine_toolpath(&mut writer, toolpath)
        .and_then(|()| Ok(writer.flush()?))
        .and_then(|()| Ok(fs::rename(&part, path)?));
    if let Err(e) = written {
        // best effort, the write error is what matters
        let _ = fs::remove_file(&part);
        return Err(e);
    }

    info!(
        path = %path.display(),
        lines = writer.lines(),
        layers = toolpath.layer_count(),
        "G-code saved"
    );
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
