//! TOML configuration for the `lasso` binary.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use lasso_slicer::SliceSettings;
use lasso_slicer_gcode::{GcodeSettings, PrinterProfile};
use serde::{Deserialize, Serialize};

/// Everything a slicing run reads from a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LassoConfig {
    /// Raster slicing parameters.
    pub slice: SliceSettings,
    /// G-code output parameters.
    pub gcode: GcodeSettings,
}

impl LassoConfig {
    /// Read a config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Parse a config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Target `printer`: plate size and nozzle follow the profile, travel
    /// speed is capped at its limit.
    pub fn use_printer(&mut self, printer: PrinterProfile) {
        self.slice.bed_x = printer.bed_x;
        self.slice.bed_y = printer.bed_y;
        self.slice.nozzle_diameter = printer.nozzle_diameter;
        self.gcode.travel_speed = self.gcode.travel_speed.min(printer.max_travel_speed);
        self.gcode.printer = printer;
    }

    /// Carry slice parameters the G-code side depends on, so flow is
    /// computed for the bead the slicer actually lays down.
    pub fn sync(&mut self) {
        self.gcode.layer_height = self.slice.layer_height;
        self.gcode.printer.nozzle_diameter = self.slice.nozzle_diameter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasso_slicer::LidPattern;
    use std::io::Write;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = LassoConfig::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("[slice]"));
        assert!(text.contains("[gcode.printer]"));
        assert_eq!(LassoConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_partial_config() {
        let config = LassoConfig::from_toml(
            r#"
            [slice]
            shells = 3
            lid_pattern = "concentric"

            [gcode]
            print_temp = 230
            "#,
        )
        .unwrap();
        assert_eq!(config.slice.shells, 3);
        assert_eq!(config.slice.lid_pattern, LidPattern::Concentric);
        assert_eq!(config.slice.lids, 2);
        assert_eq!(config.gcode.print_temp, 230);
        assert_eq!(config.gcode.printer.name, "Generic");
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[slice]\nshells = \"many\"").unwrap();
        let err = LassoConfig::load(&path).unwrap_err();
        assert!(format!("{err}").contains("bad.toml"));
    }

    #[test]
    fn test_use_printer() {
        let mut config = LassoConfig::default();
        let printer = PrinterProfile::ender3();
        config.use_printer(printer.clone());
        assert_eq!(config.slice.bed_x, printer.bed_x);
        assert_eq!(config.gcode.printer, printer);
        assert!(config.gcode.travel_speed <= printer.max_travel_speed);
    }

    #[test]
    fn test_sync_layer_height() {
        let mut config = LassoConfig::default();
        config.slice.layer_height = 0.3;
        config.sync();
        assert_eq!(config.gcode.layer_height, 0.3);
    }

    #[test]
    fn test_sync_nozzle_from_slice_table() {
        let mut config = LassoConfig::from_toml("[slice]\nnozzle_diameter = 0.6").unwrap();
        config.sync();
        assert_eq!(config.gcode.printer.nozzle_diameter, 0.6);
        let flow = config.gcode.extrusion_per_mm();
        let expected = 0.6 * config.gcode.layer_height / config.gcode.printer.filament_area();
        assert!((flow - expected).abs() < 1e-12);
    }

    #[test]
    fn test_printer_nozzle_survives_sync() {
        let mut config = LassoConfig::default();
        let printer = PrinterProfile {
            nozzle_diameter: 0.25,
            ..PrinterProfile::generic()
        };
        config.use_printer(printer);
        config.sync();
        assert_eq!(config.slice.nozzle_diameter, 0.25);
        assert_eq!(config.gcode.printer.nozzle_diameter, 0.25);
    }

    #[test]
    fn test_nan_from_toml_fails_validation() {
        let config = LassoConfig::from_toml("[slice]\nlayer_height = nan").unwrap();
        assert!(config.slice.layer_height.is_nan());
        assert!(config.slice.validate().is_err());
        let config = LassoConfig::from_toml("[gcode]\nprint_speed = nan").unwrap();
        assert!(config.gcode.validate().is_err());
    }
}
