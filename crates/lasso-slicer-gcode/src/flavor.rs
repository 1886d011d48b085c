//! G-code flavor definitions.
//!
//! A flavor supplies the init and shutdown macros that wrap the generated
//! toolpath. Templates use `{print_temp}` and `{bed_temp}` placeholders.

use serde::{Deserialize, Serialize};

/// G-code flavor (dialect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcodeFlavor {
    /// Marlin firmware (Ender, Prusa).
    #[default]
    Marlin,
    /// Klipper firmware.
    Klipper,
    /// Bambu Lab printers.
    Bambu,
    /// RepRap firmware.
    RepRap,
}

impl GcodeFlavor {
    /// Init macro template. Ends with the head homed at the origin and
    /// the extrusion axis at zero.
    pub fn start_gcode(&self) -> &'static str {
        match self {
            GcodeFlavor::Marlin => {
                "G21 ; Millimetres\n\
                 G90 ; Absolute positioning\n\
                 M82 ; Absolute extrusion\n\
                 M104 S{print_temp} ; Set nozzle temp\n\
                 M140 S{bed_temp} ; Set bed temp\n\
                 G28 ; Home all axes\n\
                 M190 S{bed_temp} ; Wait for bed temp\n\
                 M109 S{print_temp} ; Wait for nozzle temp\n\
                 G92 E0 ; Reset extruder\n"
            }
            GcodeFlavor::Klipper => {
                "G90\n\
                 M82\n\
                 M140 S{bed_temp}\n\
                 M104 S{print_temp}\n\
                 G28\n\
                 M190 S{bed_temp}\n\
                 M109 S{print_temp}\n\
                 G92 E0\n"
            }
            GcodeFlavor::Bambu => {
                "; Bambu Lab start sequence\n\
                 M400 ; Wait for moves to finish\n\
                 M140 S{bed_temp} ; Set bed temp\n\
                 M104 S{print_temp} ; Set nozzle temp\n\
                 G28 ; Home all\n\
                 M190 S{bed_temp} ; Wait for bed temp\n\
                 M109 S{print_temp} ; Wait for nozzle temp\n\
                 G90\n\
                 M82\n\
                 G92 E0\n"
            }
            GcodeFlavor::RepRap => {
                "G21\n\
                 G90\n\
                 M82\n\
                 M104 S{print_temp}\n\
                 M140 S{bed_temp}\n\
                 G28\n\
                 M116 ; Wait for all heaters\n\
                 G92 E0\n"
            }
        }
    }

    /// Shutdown macro template.
    pub fn end_gcode(&self) -> &'static str {
        match self {
            GcodeFlavor::Marlin => {
                "M104 S0 ; Turn off nozzle\n\
                 M140 S0 ; Turn off bed\n\
                 G91 ; Relative positioning\n\
                 G1 E-2 F2700 ; Retract\n\
                 G1 Z10 F3000 ; Move Z up\n\
                 G90 ; Absolute positioning\n\
                 M84 ; Disable motors\n"
            }
            GcodeFlavor::Klipper => {
                "TURN_OFF_HEATERS\n\
                 G91\n\
                 G1 E-2 F2700\n\
                 G1 Z10 F3000\n\
                 G90\n\
                 M84\n"
            }
            GcodeFlavor::Bambu => {
                "M400 ; Wait for moves\n\
                 M104 S0 ; Nozzle off\n\
                 M140 S0 ; Bed off\n\
                 G91\n\
                 G1 Z10 F3000\n\
                 G90\n\
                 M84\n"
            }
            GcodeFlavor::RepRap => {
                "M104 S0\n\
                 M140 S0\n\
                 G91\n\
                 G1 E-2 F2700\n\
                 G1 Z10 F3000\n\
                 G90\n\
                 M84\n"
            }
        }
    }
}

/// Fill the temperature placeholders of a macro template.
pub fn render_template(template: &str, print_temp: u32, bed_temp: u32) -> String {
    template
        .replace("{print_temp}", &print_temp.to_string())
        .replace("{bed_temp}", &bed_temp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [GcodeFlavor; 4] = [
        GcodeFlavor::Marlin,
        GcodeFlavor::Klipper,
        GcodeFlavor::Bambu,
        GcodeFlavor::RepRap,
    ];

    #[test]
    fn test_templates_render() {
        for flavor in ALL {
            let start = render_template(flavor.start_gcode(), 215, 60);
            assert!(start.contains("215"));
            assert!(start.contains("G28"));
            assert!(!start.contains('{'));
            assert!(start.lines().last().unwrap().starts_with("G92 E0"));
        }
    }

    #[test]
    fn test_macros_never_travel() {
        // the writer assumes the head rests at the homed origin
        for flavor in ALL {
            for line in flavor.start_gcode().lines().chain(flavor.end_gcode().lines()) {
                assert!(!line.starts_with("G0 "), "{flavor:?}: {line}");
            }
        }
    }
}
