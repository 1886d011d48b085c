//! Printer profile definitions.

use serde::{Deserialize, Serialize};

use crate::flavor::GcodeFlavor;

/// Machine description used when writing G-code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterProfile {
    /// Profile name.
    pub name: String,
    /// G-code flavor.
    pub flavor: GcodeFlavor,
    /// Build volume X (mm).
    pub bed_x: f64,
    /// Build volume Y (mm).
    pub bed_y: f64,
    /// Build volume Z (mm).
    pub bed_z: f64,
    /// Is the bed heated?
    pub heated_bed: bool,
    /// Number of extruders.
    pub extruder_count: u32,
    /// Nozzle diameter (mm).
    pub nozzle_diameter: f64,
    /// Filament diameter (mm).
    pub filament_diameter: f64,
    /// Fastest travel the machine accepts in X and Y (mm/s).
    pub max_travel_speed: f64,
    /// Default print temperature (°C).
    pub default_print_temp: u32,
    /// Default bed temperature (°C).
    pub default_bed_temp: u32,
    /// Retraction distance (mm).
    pub retraction_distance: f64,
    /// Retraction speed (mm/s).
    pub retraction_speed: f64,
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self::generic()
    }
}

impl PrinterProfile {
    /// Generic single-extruder printer with a 220 mm plate.
    pub fn generic() -> Self {
        Self {
            name: "Generic".into(),
            flavor: GcodeFlavor::Marlin,
            bed_x: 220.0,
            bed_y: 220.0,
            bed_z: 250.0,
            heated_bed: true,
            extruder_count: 1,
            nozzle_diameter: 0.4,
            filament_diameter: 1.75,
            max_travel_speed: 200.0,
            default_print_temp: 210,
            default_bed_temp: 60,
            retraction_distance: 1.0,
            retraction_speed: 30.0,
        }
    }

    /// Generic two-extruder printer, used for black and white prints.
    pub fn generic_dual() -> Self {
        Self {
            name: "Generic Dual".into(),
            extruder_count: 2,
            ..Self::generic()
        }
    }

    /// Creality Ender 3 profile.
    pub fn ender3() -> Self {
        Self {
            name: "Creality Ender 3".into(),
            flavor: GcodeFlavor::Marlin,
            bed_x: 220.0,
            bed_y: 220.0,
            bed_z: 250.0,
            heated_bed: true,
            extruder_count: 1,
            nozzle_diameter: 0.4,
            filament_diameter: 1.75,
            max_travel_speed: 150.0,
            default_print_temp: 200,
            default_bed_temp: 60,
            retraction_distance: 5.0,
            retraction_speed: 45.0,
        }
    }

    /// Prusa MK4 profile.
    pub fn prusa_mk4() -> Self {
        Self {
            name: "Prusa MK4".into(),
            flavor: GcodeFlavor::Marlin,
            bed_x: 250.0,
            bed_y: 210.0,
            bed_z: 220.0,
            heated_bed: true,
            extruder_count: 1,
            nozzle_diameter: 0.4,
            filament_diameter: 1.75,
            max_travel_speed: 200.0,
            default_print_temp: 215,
            default_bed_temp: 60,
            retraction_distance: 0.8,
            retraction_speed: 35.0,
        }
    }

    /// Bambu Lab X1 Carbon profile.
    pub fn bambu_x1c() -> Self {
        Self {
            name: "Bambu Lab X1 Carbon".into(),
            flavor: GcodeFlavor::Bambu,
            bed_x: 256.0,
            bed_y: 256.0,
            bed_z: 256.0,
            heated_bed: true,
            extruder_count: 1,
            nozzle_diameter: 0.4,
            filament_diameter: 1.75,
            max_travel_speed: 500.0,
            default_print_temp: 220,
            default_bed_temp: 55,
            retraction_distance: 0.8,
            retraction_speed: 30.0,
        }
    }

    /// Voron 2.4 profile (Klipper).
    pub fn voron_24() -> Self {
        Self {
            name: "Voron 2.4 (350mm)".into(),
            flavor: GcodeFlavor::Klipper,
            bed_x: 350.0,
            bed_y: 350.0,
            bed_z: 340.0,
            heated_bed: true,
            extruder_count: 1,
            nozzle_diameter: 0.4,
            filament_diameter: 1.75,
            max_travel_speed: 300.0,
            default_print_temp: 240,
            default_bed_temp: 110,
            retraction_distance: 0.5,
            retraction_speed: 30.0,
        }
    }

    /// Get all built-in profiles.
    pub fn all_profiles() -> Vec<Self> {
        vec![
            Self::generic(),
            Self::generic_dual(),
            Self::ender3(),
            Self::prusa_mk4(),
            Self::bambu_x1c(),
            Self::voron_24(),
        ]
    }

    /// Look up a built-in profile by name, ignoring case.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::all_profiles()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Check if a position is within build volume.
    pub fn in_bounds(&self, x: f64, y: f64, z: f64) -> bool {
        (0.0..=self.bed_x).contains(&x)
            && (0.0..=self.bed_y).contains(&y)
            && (0.0..=self.bed_z).contains(&z)
    }

    /// Cross-section area of the filament (mm²).
    pub fn filament_area(&self) -> f64 {
        std::f64::consts::PI * (self.filament_diameter / 2.0).powi(2)
    }
}
